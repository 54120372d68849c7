// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error and cause types shared by the queue and receiver.

/// Returned when a [`crate::queue::RingQueue`] has no free slot for
/// `push_back`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueFull;

/// Returned when a [`crate::queue::RingQueue`] has nothing to dequeue or no
/// in-flight packet to advance the window over.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueEmpty;

/// The 5-bit `cmd` field of a `PACKET_NOT_ACCEPTED` control symbol.
///
/// Values match the wire encoding directly, so this type can be
/// round-tripped through `u8` without a lookup table.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NotAcceptedCause {
    Reserved = 0,
    UnexpectedAckId = 1,
    ControlCrc = 2,
    NonMaintenance = 3,
    PacketCrc = 4,
    IllegalCharacter = 5,
    NoResource = 6,
    Descrambler = 7,
    General = 31,
}

impl NotAcceptedCause {
    pub fn from_cmd(cmd: u8) -> Self {
        match cmd {
            1 => Self::UnexpectedAckId,
            2 => Self::ControlCrc,
            3 => Self::NonMaintenance,
            4 => Self::PacketCrc,
            5 => Self::IllegalCharacter,
            6 => Self::NoResource,
            31 => Self::General,
            _ => Self::Reserved,
        }
    }

    pub fn cmd(self) -> u8 {
        self as u8
    }
}
