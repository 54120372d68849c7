// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Symbols exchanged with the symbol codec.

use crate::crc::{crc5, crc5_check};

/// One quantum of exchange with the symbol codec.
///
/// `Control` carries the raw 24-bit on-wire value (CRC-5 included, not yet
/// checked): CRC-5 checking is this engine's own job, counted as a
/// diagnostic, not the codec's.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Symbol {
    Idle,
    Control(u32),
    Data(u32),
    /// The codec could not decode the incoming symbol at all.
    Error,
}

/// The ack-class value of a control symbol's `stype0` field.
///
/// A control symbol carries at most one of these at a time; symbols whose
/// purpose is purely framing (SOP/EOP/...) carry `stype0 = NONE` instead.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stype0 {
    PacketAccepted = 0,
    PacketRetry = 1,
    PacketNotAccepted = 2,
    Status = 4,
    LinkResponse = 5,
}

/// `stype0` value used when a control symbol carries no ack-class event.
pub const STYPE0_NONE: u8 = 7;

impl Stype0 {
    pub fn from_bits(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::PacketAccepted),
            1 => Some(Self::PacketRetry),
            2 => Some(Self::PacketNotAccepted),
            4 => Some(Self::Status),
            5 => Some(Self::LinkResponse),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The framing-class value of a control symbol's `stype1` field.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stype1 {
    StartOfPacket = 0,
    Stomp = 1,
    EndOfPacket = 2,
    RestartFromRetry = 3,
    LinkRequest = 4,
    MulticastEvent = 5,
    Nop = 7,
}

impl Stype1 {
    pub fn from_bits(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::StartOfPacket),
            1 => Some(Self::Stomp),
            2 => Some(Self::EndOfPacket),
            3 => Some(Self::RestartFromRetry),
            4 => Some(Self::LinkRequest),
            5 => Some(Self::MulticastEvent),
            7 => Some(Self::Nop),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// A decoded 24-bit control symbol: `stype0[3] | param0[5] | param1[5] |
/// stype1[3] | cmd[3] | crc5[5]`.
///
/// `cmd` is 3 bits in the wire layout, but packet-not-accepted causes are a
/// 5-bit quantity with values up to 31. This is resolved the way real
/// RapidIO control symbols do: the not-accepted cause is carried in
/// `param1` (the same slot `buf_status` normally occupies), not in the
/// 3-bit `cmd` field, which this engine always encodes as zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ControlSymbol {
    pub stype0: u8,
    pub param0: u8,
    pub param1: u8,
    pub stype1: u8,
    pub cmd: u8,
}

impl ControlSymbol {
    fn new(stype0: u8, param0: u8, param1: u8, stype1: u8, cmd: u8) -> Self {
        Self {
            stype0: stype0 & 0x7,
            param0: param0 & 0x1F,
            param1: param1 & 0x1F,
            stype1: stype1 & 0x7,
            cmd: cmd & 0x7,
        }
    }

    pub fn stype0(&self) -> Option<Stype0> {
        Stype0::from_bits(self.stype0)
    }

    pub fn stype1(&self) -> Option<Stype1> {
        Stype1::from_bits(self.stype1)
    }

    fn body19(&self) -> u32 {
        (self.stype0 as u32) << 16
            | (self.param0 as u32) << 11
            | (self.param1 as u32) << 6
            | (self.stype1 as u32) << 3
            | (self.cmd as u32)
    }

    /// Encodes this symbol to its 24-bit on-wire form, with CRC-5 appended.
    pub fn encode(&self) -> u32 {
        let body = self.body19();
        (body << 5) | crc5(body) as u32
    }

    /// Decodes a 24-bit wire value, checking its CRC-5.
    ///
    /// Returns `None` on CRC mismatch; the caller is responsible for
    /// counting `inbound_error_control_crc` and driving the receiver into
    /// its error-stopped state.
    pub fn decode(wire: u32) -> Option<Self> {
        let wire = wire & 0xFF_FFFF;
        let body = wire >> 5;
        let crc = (wire & 0x1F) as u8;
        if !crc5_check(body, crc) {
            return None;
        }
        Some(Self::new(
            (body >> 16) as u8,
            (body >> 11) as u8,
            (body >> 6) as u8,
            (body >> 3) as u8,
            body as u8,
        ))
    }

    // --- Convenience constructors for every symbol this engine emits ---

    pub fn packet_accepted(ackid: u8, buf_status: u8) -> Self {
        Self::new(Stype0::PacketAccepted.bits(), ackid, buf_status, Stype1::Nop.bits(), 0)
    }

    pub fn packet_retry(ackid: u8, buf_status: u8) -> Self {
        Self::new(Stype0::PacketRetry.bits(), ackid, buf_status, Stype1::Nop.bits(), 0)
    }

    pub fn packet_not_accepted(ackid: u8, cause: u8) -> Self {
        Self::new(Stype0::PacketNotAccepted.bits(), ackid, cause, Stype1::Nop.bits(), 0)
    }

    pub fn status(ackid: u8, buf_status: u8) -> Self {
        Self::new(Stype0::Status.bits(), ackid, buf_status, Stype1::Nop.bits(), 0)
    }

    pub fn link_response(ackid: u8, buf_status: u8) -> Self {
        Self::new(Stype0::LinkResponse.bits(), ackid, buf_status, Stype1::Nop.bits(), 0)
    }

    pub fn link_request(port_status: u8) -> Self {
        Self::new(STYPE0_NONE, port_status, 0, Stype1::LinkRequest.bits(), 0)
    }

    pub fn sop(ackid: u8, buf_status: u8) -> Self {
        Self::new(STYPE0_NONE, ackid, buf_status, Stype1::StartOfPacket.bits(), 0)
    }

    pub fn eop() -> Self {
        Self::new(STYPE0_NONE, 0, 0, Stype1::EndOfPacket.bits(), 0)
    }

    pub fn stomp() -> Self {
        Self::new(STYPE0_NONE, 0, 0, Stype1::Stomp.bits(), 0)
    }

    pub fn restart_from_retry(buf_status: u8) -> Self {
        Self::new(STYPE0_NONE, 0, buf_status, Stype1::RestartFromRetry.bits(), 0)
    }

    pub fn nop() -> Self {
        Self::new(STYPE0_NONE, 0, 0, Stype1::Nop.bits(), 0)
    }
}
