// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Control-symbol CRC-5 and packet CRC-16 support.
//!
//! The CRC-5 here is a direct bit-serial implementation rather than a
//! `crc`-crate `Algorithm`, because it runs over a 19-bit body that isn't
//! byte-aligned; the packet CRC-16 on the other hand runs over whole 32-bit
//! words, so it's a thin wrapper around `crc::Crc<u16>`, the same crate
//! `drv-sprot-api` and `drv-hf-api` use for their own CRCs.

use crc::{Crc, CRC_16_XMODEM};

/// Width, in bits, of the control-symbol CRC register.
const CRC5_WIDTH: u32 = 5;
/// Polynomial (low 5 bits, implicit leading term).
const CRC5_POLY: u8 = 0x15;
/// Initial register value.
const CRC5_INIT: u8 = 0x1F;
const CRC5_MASK: u8 = (1 << CRC5_WIDTH) - 1;

/// Computes the CRC-5 of a 19-bit control-symbol body.
///
/// `body` holds the 19 significant bits (`stype0..cmd`) right-justified;
/// any bits above bit 18 are ignored.
pub fn crc5(body: u32) -> u8 {
    let mut reg = CRC5_INIT & CRC5_MASK;
    for i in (0..19).rev() {
        let bit_in = ((body >> i) & 1) as u8;
        let msb = (reg >> (CRC5_WIDTH - 1)) & 1;
        reg = (reg << 1) & CRC5_MASK;
        if msb ^ bit_in != 0 {
            reg ^= CRC5_POLY;
        }
    }
    reg & CRC5_MASK
}

/// Checks a 24-bit control symbol (19-bit body + 5-bit CRC) for validity.
pub fn crc5_check(body: u32, crc: u8) -> bool {
    crc5(body) == (crc & CRC5_MASK)
}

static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// A running packet CRC-16, updated one 32-bit word at a time.
///
/// This mirrors the CRC-16 the packet layer embeds in every packet: the
/// engine doesn't parse packet fields, but it must independently recompute
/// this CRC to validate inbound packets at `EOP`.
pub struct PacketCrc(crc::Digest<'static, u16>);

impl PacketCrc {
    pub fn new() -> Self {
        Self(CRC16.digest())
    }

    /// Folds one big-endian 32-bit packet word into the running CRC.
    pub fn update_word(&mut self, word: u32) {
        self.0.update(&word.to_be_bytes());
    }

    /// Consumes the accumulator, returning the final CRC-16.
    pub fn finalize(self) -> u16 {
        self.0.finalize()
    }
}

impl Default for PacketCrc {
    fn default() -> Self {
        Self::new()
    }
}
