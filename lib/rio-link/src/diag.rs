// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diagnostic counters exposed to the host.
//!
//! Plain saturating `u32` fields, the same shape as the stats structs in
//! `task/host-sp-comms` and `drv/transceivers-server` — not the `counters`
//! crate's per-enum-variant `Count` derive, since these are independent
//! named scalars (plus one running max) rather than classified occurrences
//! of one shared event type.

/// Monotonic counters, saturating at `u32::MAX`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub inbound_complete: u32,
    pub inbound_retry: u32,
    pub inbound_error_control_crc: u32,
    pub inbound_error_packet_ackid: u32,
    pub inbound_error_packet_crc: u32,
    pub inbound_error_illegal_character: u32,
    pub inbound_error_general: u32,
    pub inbound_error_packet_unsupported: u32,

    pub outbound_complete: u32,
    pub outbound_retry: u32,
    pub outbound_link_latency_max: u32,
    pub outbound_error_timeout: u32,
    pub outbound_error_packet_accepted: u32,
    pub outbound_error_packet_retry: u32,

    pub partner_link_request: u32,
    pub partner_error_control_crc: u32,
    pub partner_error_packet_ackid: u32,
    pub partner_error_packet_crc: u32,
    pub partner_error_illegal_character: u32,
    pub partner_error_general: u32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            inbound_complete: 0,
            inbound_retry: 0,
            inbound_error_control_crc: 0,
            inbound_error_packet_ackid: 0,
            inbound_error_packet_crc: 0,
            inbound_error_illegal_character: 0,
            inbound_error_general: 0,
            inbound_error_packet_unsupported: 0,
            outbound_complete: 0,
            outbound_retry: 0,
            outbound_link_latency_max: 0,
            outbound_error_timeout: 0,
            outbound_error_packet_accepted: 0,
            outbound_error_packet_retry: 0,
            partner_link_request: 0,
            partner_error_control_crc: 0,
            partner_error_packet_ackid: 0,
            partner_error_packet_crc: 0,
            partner_error_illegal_character: 0,
            partner_error_general: 0,
        }
    }

    pub(crate) fn note_link_latency(&mut self, latency: u32) {
        self.outbound_link_latency_max = self.outbound_link_latency_max.max(latency);
    }
}

/// Increments a single counter field by one, saturating.
macro_rules! bump {
    ($counters:expr, $field:ident) => {
        $counters.$field = $counters.$field.saturating_add(1);
    };
}
pub(crate) use bump;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_saturates_at_max() {
        let mut c = Counters::new();
        c.inbound_complete = u32::MAX;
        bump!(c, inbound_complete);
        assert_eq!(c.inbound_complete, u32::MAX);
    }

    #[test]
    fn link_latency_tracks_running_max() {
        let mut c = Counters::new();
        c.note_link_latency(10);
        c.note_link_latency(3);
        c.note_link_latency(42);
        assert_eq!(c.outbound_link_latency_max, 42);
    }
}
