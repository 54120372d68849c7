// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded ring queue of packet slots, carved out of a caller-owned word
//! buffer.
//!
//! This plays the same role for this crate that [`circq`](../circq) plays
//! for byte streams: borrowed backing memory, no allocation, `&mut`-only
//! access. Unlike `circq`, slots here are fixed-size (one packet each)
//! rather than a raw byte stream, and the transmit side additionally tracks
//! a transmission window between `front_index` and `back_index`.

use static_assertions::const_assert;

use crate::error::{QueueEmpty, QueueFull};

/// Maximum packet payload length, in 32-bit words, this engine will ever
/// stage in a queue slot. Matches the conventional RapidIO maximum packet
/// size (256 bytes of data plus header/trailer rounds up to 69 words).
pub const RIOPACKET_SIZE_MAX: usize = 69;

/// Words per slot: one length word plus up to `RIOPACKET_SIZE_MAX` payload
/// words.
const SLOT_WORDS: usize = RIOPACKET_SIZE_MAX + 1;

// The length prefix is stored as a `u32` at `slot[0]`; a packet's word count
// must fit there, which `usize` alone doesn't guarantee on exotic targets.
const_assert!(RIOPACKET_SIZE_MAX <= u32::MAX as usize);

/// An immutable view of one queued packet.
#[derive(Copy, Clone)]
pub struct PacketView<'a> {
    len: usize,
    words: &'a [u32],
}

impl<'a> PacketView<'a> {
    /// Packet length, in 32-bit words.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packet's payload words (length `self.len()`).
    pub fn words(&self) -> &'a [u32] {
        &self.words[..self.len]
    }
}

/// A bounded ring of packet slots carved from a caller-supplied word buffer.
///
/// Used on both the receive side (as a plain FIFO) and the transmit side
/// (which additionally tracks `window_index`, the boundary between
/// transmitted-but-unacknowledged packets and ones not yet sent).
pub struct RingQueue<'a> {
    buffer: &'a mut [u32],
    size: u8,
    available: u8,
    front_index: u8,
    window_index: u8,
    back_index: u8,
}

impl<'a> RingQueue<'a> {
    /// Carves a ring queue out of `buffer`. The usable slot count is
    /// `buffer.len() / (RIOPACKET_SIZE_MAX + 1)`, clamped to 255 — unlike
    /// the original C API this takes no separate word-count parameter,
    /// since a Rust slice already carries its own length.
    pub fn new(buffer: &'a mut [u32]) -> Self {
        let size = (buffer.len() / SLOT_WORDS).min(u8::MAX as usize) as u8;
        Self {
            buffer,
            size,
            available: size,
            front_index: 0,
            window_index: 0,
            back_index: 0,
        }
    }

    fn dist(&self, from: u8, to: u8) -> u8 {
        if to >= from {
            to - from
        } else {
            self.size - (from - to)
        }
    }

    fn advance(&self, index: u8) -> u8 {
        let next = index + 1;
        if next >= self.size {
            0
        } else {
            next
        }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn get_available(&self) -> u8 {
        self.available
    }

    pub fn get_used(&self) -> u8 {
        self.size - self.available
    }

    /// Packets transmitted but not yet acknowledged (tx only).
    pub fn get_window_used(&self) -> u8 {
        self.dist(self.front_index, self.window_index)
    }

    /// Queued packets not yet transmitted (tx only).
    pub fn get_window_available(&self) -> u8 {
        self.dist(self.window_index, self.back_index)
    }

    fn slot(&self, index: u8) -> &[u32] {
        let base = index as usize * SLOT_WORDS;
        &self.buffer[base..base + SLOT_WORDS]
    }

    fn slot_mut(&mut self, index: u8) -> &mut [u32] {
        let base = index as usize * SLOT_WORDS;
        &mut self.buffer[base..base + SLOT_WORDS]
    }

    fn view(&self, index: u8) -> PacketView<'_> {
        let slot = self.slot(index);
        PacketView {
            len: slot[0] as usize,
            words: &slot[1..],
        }
    }

    /// Copies `words` into the slot at `back_index` and advances it.
    ///
    /// `words.len()` must be at most `RIOPACKET_SIZE_MAX`; this is a
    /// precondition enforced by the packet layer, not re-validated here.
    pub fn push_back(&mut self, words: &[u32]) -> Result<(), QueueFull> {
        if self.available == 0 {
            return Err(QueueFull);
        }
        let back = self.back_index;
        let slot = self.slot_mut(back);
        slot[0] = words.len() as u32;
        slot[1..1 + words.len()].copy_from_slice(words);
        self.back_index = self.advance(back);
        self.available -= 1;
        Ok(())
    }

    pub fn front_packet(&self) -> Result<PacketView<'_>, QueueEmpty> {
        if self.get_used() == 0 {
            return Err(QueueEmpty);
        }
        Ok(self.view(self.front_index))
    }

    /// View of the next packet to (re)transmit (tx only).
    pub fn window_packet(&self) -> Result<PacketView<'_>, QueueEmpty> {
        if self.get_window_available() == 0 {
            return Err(QueueEmpty);
        }
        Ok(self.view(self.window_index))
    }

    /// Promotes the next queued slot into the transmission window (tx only).
    pub fn window_advance(&mut self) -> Result<(), QueueEmpty> {
        if self.get_window_available() == 0 {
            return Err(QueueEmpty);
        }
        self.window_index = self.advance(self.window_index);
        Ok(())
    }

    /// Rewinds the window back to `front_index`, e.g. on `PACKET_RETRY`
    /// (tx only).
    pub fn window_reset(&mut self) {
        self.window_index = self.front_index;
    }

    /// Removes the front slot, e.g. once it has been acknowledged.
    pub fn pop_front(&mut self) -> Result<(), QueueEmpty> {
        if self.get_used() == 0 {
            return Err(QueueEmpty);
        }
        self.front_index = self.advance(self.front_index);
        self.available += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_queue(slots: usize) -> Vec<u32> {
        vec![0u32; slots * SLOT_WORDS]
    }

    #[test]
    fn invariant_available_plus_used_equals_size() {
        let mut backing = make_queue(4);
        let mut q = RingQueue::new(&mut backing);
        assert_eq!(q.get_available() + q.get_used(), q.size());

        q.push_back(&[1, 2, 3]).unwrap();
        assert_eq!(q.get_available() + q.get_used(), q.size());

        q.pop_front().unwrap();
        assert_eq!(q.get_available() + q.get_used(), q.size());
    }

    #[test]
    fn push_back_fails_when_full() {
        let mut backing = make_queue(2);
        let mut q = RingQueue::new(&mut backing);
        q.push_back(&[1]).unwrap();
        q.push_back(&[2]).unwrap();
        assert_eq!(q.push_back(&[3]), Err(QueueFull));
    }

    #[test]
    fn pop_front_fails_when_empty() {
        let mut backing = make_queue(2);
        let mut q = RingQueue::new(&mut backing);
        assert_eq!(q.pop_front(), Err(QueueEmpty));
    }

    #[test]
    fn front_packet_round_trips_words() {
        let mut backing = make_queue(2);
        let mut q = RingQueue::new(&mut backing);
        q.push_back(&[0xAAAA_BBBB, 0xCCCC_DDDD]).unwrap();
        let view = q.front_packet().unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.words(), &[0xAAAA_BBBB, 0xCCCC_DDDD]);
    }

    #[test]
    fn window_advances_independently_of_front() {
        let mut backing = make_queue(4);
        let mut q = RingQueue::new(&mut backing);
        q.push_back(&[1]).unwrap();
        q.push_back(&[2]).unwrap();
        q.push_back(&[3]).unwrap();

        assert_eq!(q.get_window_used(), 0);
        assert_eq!(q.get_window_available(), 3);

        q.window_advance().unwrap();
        assert_eq!(q.get_window_used(), 1);
        assert_eq!(q.get_window_available(), 2);

        // Acking the oldest in-flight packet pops front but doesn't move
        // the window.
        q.pop_front().unwrap();
        assert_eq!(q.get_window_used(), 0);
        assert_eq!(q.get_window_available(), 2);
    }

    #[test]
    fn window_reset_rewinds_to_front() {
        let mut backing = make_queue(4);
        let mut q = RingQueue::new(&mut backing);
        q.push_back(&[1]).unwrap();
        q.push_back(&[2]).unwrap();
        q.window_advance().unwrap();
        q.window_advance().unwrap();
        assert_eq!(q.get_window_used(), 2);

        q.window_reset();
        assert_eq!(q.get_window_used(), 0);
        assert_eq!(q.get_window_available(), 2);
    }

    #[test]
    fn indices_wrap_around_the_backing_store() {
        let mut backing = make_queue(2);
        let mut q = RingQueue::new(&mut backing);
        for i in 0..10u32 {
            q.push_back(&[i]).unwrap();
            assert_eq!(q.front_packet().unwrap().words(), &[i]);
            q.pop_front().unwrap();
        }
    }
}
