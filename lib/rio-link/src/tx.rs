// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transmitter state machine.
//!
//! `get_symbol` is polled by the host once per outbound symbol slot and
//! picks exactly one thing to send, in priority order: a link-recovery
//! request if the link is broken, a mailbox-driven one-shot control symbol
//! from the receiver, a pending ack piggyback, a timeout reaction, then
//! streaming the next queued packet. Idle fills every slot nothing else
//! claims.
//!
//! The state set here is smaller than a literal reading of the classic
//! RapidIO transmitter states suggests: `SEND_PACKET_RETRY` /
//! `SEND_PACKET_NOT_ACCEPTED` /
//! `SEND_LINK_RESPONSE` are one-shot reactions to a [`Mailbox`] request that
//! complete within a single `get_symbol` call, so they don't need their own
//! persistent `TxState` variant — they fall out of draining the mailbox as
//! priority one. `OUTPUT_RETRY_STOPPED` collapses into the same immediate
//! handling inside [`Transmitter::handle_packet_retry`]. What remains,
//! `OUTPUT_ERROR_STOPPED`, is the one state that genuinely persists across
//! calls, since it must keep re-emitting `LINK_REQUEST` until a
//! `LINK_RESPONSE` arrives.

use crate::diag::{bump, Counters};
use crate::error::NotAcceptedCause;
use crate::mailbox::{Mailbox, TxRequest};
use crate::queue::RingQueue;
use crate::symbol::{ControlSymbol, Symbol};
use crate::trace::{TraceLog, TxEvent};

/// Number of consecutive `STATUS` symbols sent per bring-up burst. The
/// cadence isn't pinned down by any normative source, so this engine uses
/// 15, matching the convention of sending a full ackID-space's worth
/// before waiting for the peer to catch up.
const STATUS_BURST: u8 = 15;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxState {
    Uninitialized,
    PortInitialized,
    LinkInitialized,
    OutputErrorStopped,
}

/// Outbound half of the link engine.
pub struct Transmitter {
    state: TxState,
    /// ackID of the oldest unacknowledged in-flight packet.
    tx_ackid: u8,
    /// Peer's last-advertised free inbound slot count (`buf_status`), used
    /// to size how far this side's own window may advance. This side's
    /// *own* buf_status (what it advertises to the peer) is computed
    /// fresh from the rx queue on every `get_symbol` call instead of being
    /// cached here — see `get_symbol`'s `own_buf_status` parameter.
    tx_buffer_status: u8,
    tx_status_counter: u8,
    last_ack_emitted: Option<u8>,
    /// Per-ackID send timestamp, used to detect a stalled acknowledgement.
    tx_frame_timeout: [Option<u32>; 32],
    /// `Some(n)` while mid-stream on the packet at the head of the
    /// transmission window: `n` words already emitted, `n == len` means the
    /// next symbol is `EOP`.
    stream_index: Option<usize>,
    stream_ackid: Option<u8>,
    trace: TraceLog<TxEvent, 16>,
}

impl Transmitter {
    pub const fn new() -> Self {
        Self {
            state: TxState::Uninitialized,
            tx_ackid: 0,
            tx_buffer_status: 31,
            tx_status_counter: 0,
            last_ack_emitted: None,
            tx_frame_timeout: [None; 32],
            stream_index: None,
            stream_ackid: None,
            trace: TraceLog::new(TxEvent::None),
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn tx_ackid(&self) -> u8 {
        self.tx_ackid
    }

    pub fn tx_buffer_status(&self) -> u8 {
        self.tx_buffer_status
    }

    pub fn trace(&self) -> &TraceLog<TxEvent, 16> {
        &self.trace
    }

    pub fn port_initialize(&mut self) {
        self.state = TxState::PortInitialized;
        self.tx_ackid = 0;
        self.tx_status_counter = 0;
        self.last_ack_emitted = None;
        self.tx_frame_timeout = [None; 32];
        self.stream_index = None;
        self.stream_ackid = None;
    }

    pub fn port_uninitialize(&mut self) {
        self.state = TxState::Uninitialized;
    }

    /// Updates the peer's advertised free-slot count, carried in `param1`
    /// of every inbound control symbol regardless of its class.
    pub fn note_buf_status(&mut self, buf_status: u8) {
        self.tx_buffer_status = buf_status.min(31);
    }

    /// Reacts to an inbound `PACKET_ACCEPTED(ackid)`.
    pub fn handle_packet_accepted(
        &mut self,
        ackid: u8,
        tx_queue: &mut RingQueue<'_>,
        counters: &mut Counters,
        now: u32,
    ) {
        if ackid != self.tx_ackid {
            bump!(counters, outbound_error_packet_accepted);
            self.trace.record(TxEvent::PacketAckedOutOfOrder {
                expected: self.tx_ackid,
                got: ackid,
            });
            return;
        }
        let sent_at = self.tx_frame_timeout[ackid as usize].take();
        if let Some(sent_at) = sent_at {
            counters.note_link_latency(now.wrapping_sub(sent_at));
        }
        let _ = tx_queue.pop_front();
        self.tx_ackid = (self.tx_ackid + 1) % 32;
        bump!(counters, outbound_complete);
        self.trace.record(TxEvent::PacketAcked { ackid });
    }

    /// Reacts to an inbound `PACKET_RETRY(ackid)`.
    pub fn handle_packet_retry(
        &mut self,
        ackid: u8,
        tx_queue: &mut RingQueue<'_>,
        counters: &mut Counters,
    ) {
        if ackid != self.tx_ackid {
            bump!(counters, outbound_error_packet_retry);
            return;
        }
        tx_queue.window_reset();
        self.stream_index = None;
        self.stream_ackid = None;
        bump!(counters, outbound_retry);
        self.trace.record(TxEvent::PacketRetried { ackid });
    }

    /// Reacts to an inbound `PACKET_NOT_ACCEPTED(cause)`: the peer's
    /// receiver rejected our packet. Enters `OUTPUT_ERROR_STOPPED`, which
    /// keeps re-emitting `LINK_REQUEST` until a `LINK_RESPONSE` resyncs us.
    pub fn handle_packet_not_accepted(&mut self, cause: NotAcceptedCause, counters: &mut Counters) {
        match cause {
            NotAcceptedCause::ControlCrc => bump!(counters, partner_error_control_crc),
            NotAcceptedCause::UnexpectedAckId => bump!(counters, partner_error_packet_ackid),
            NotAcceptedCause::PacketCrc => bump!(counters, partner_error_packet_crc),
            NotAcceptedCause::IllegalCharacter => bump!(counters, partner_error_illegal_character),
            _ => bump!(counters, partner_error_general),
        }
        self.state = TxState::OutputErrorStopped;
        self.stream_index = None;
        self.stream_ackid = None;
        self.trace.record(TxEvent::PacketNotAccepted);
    }

    /// Reacts to an inbound `LINK_RESPONSE(ackid)`: resyncs `tx_ackid` to
    /// what the peer says it expects next and resumes from
    /// `LINK_INITIALIZED`.
    pub fn handle_link_response(&mut self, ackid: u8, tx_queue: &mut RingQueue<'_>) {
        self.tx_ackid = ackid;
        self.tx_frame_timeout = [None; 32];
        tx_queue.window_reset();
        self.stream_index = None;
        self.stream_ackid = None;
        self.state = TxState::LinkInitialized;
        self.trace.record(TxEvent::LinkResponseReceived { ackid });
    }

    /// Produces the next outbound symbol.
    ///
    /// `own_buf_status` is this port's own free-inbound-slot count (the rx
    /// queue's `get_available()`, clamped to 31 by the caller) — the value
    /// piggybacked into every outgoing control symbol's `buf_status` field
    /// so the peer can size its transmit window to what our receiver can
    /// actually hold. This is distinct from `self.tx_buffer_status`, which
    /// is the *peer's* last-advertised value, used to size *our own*
    /// window.
    pub fn get_symbol(
        &mut self,
        tx_queue: &mut RingQueue<'_>,
        mailbox: &mut Mailbox,
        counters: &mut Counters,
        rx_ackid_acked: Option<u8>,
        rx_status_received: bool,
        own_buf_status: u8,
        now: u32,
        timeout: u32,
    ) -> Symbol {
        match self.state {
            TxState::Uninitialized => return Symbol::Idle,
            TxState::PortInitialized => return self.bring_up(rx_status_received, own_buf_status),
            TxState::OutputErrorStopped => {
                self.trace.record(TxEvent::LinkRequestSent);
                return Symbol::Control(ControlSymbol::link_request(0).encode());
            }
            TxState::LinkInitialized => {}
        }

        if let Some(req) = mailbox.take() {
            return self.emit_mailbox_request(req, own_buf_status);
        }

        if let Some(ackid) = rx_ackid_acked {
            if self.last_ack_emitted != Some(ackid) {
                self.last_ack_emitted = Some(ackid);
                self.trace.record(TxEvent::PacketAcked { ackid });
                return Symbol::Control(
                    ControlSymbol::packet_accepted(ackid, own_buf_status).encode(),
                );
            }
        }

        if timeout > 0 {
            if let Some(sent_at) = self.tx_frame_timeout[self.tx_ackid as usize] {
                if now.wrapping_sub(sent_at) >= timeout {
                    return self.on_timeout(tx_queue, counters);
                }
            }
        }

        if let Some(sym) = self.continue_stream(tx_queue, own_buf_status, now) {
            return sym;
        }

        Symbol::Idle
    }

    fn bring_up(&mut self, rx_status_received: bool, own_buf_status: u8) -> Symbol {
        if self.tx_status_counter < STATUS_BURST {
            self.tx_status_counter += 1;
            self.trace.record(TxEvent::StatusSent {
                count: self.tx_status_counter,
            });
            return Symbol::Control(ControlSymbol::status(0, own_buf_status).encode());
        }
        if rx_status_received {
            self.state = TxState::LinkInitialized;
            self.trace.record(TxEvent::LinkInitialized);
            return Symbol::Idle;
        }
        self.tx_status_counter = 0;
        Symbol::Idle
    }

    fn emit_mailbox_request(&mut self, req: TxRequest, own_buf_status: u8) -> Symbol {
        match req {
            TxRequest::SendPacketRetry { ackid } => Symbol::Control(
                ControlSymbol::packet_retry(ackid, own_buf_status).encode(),
            ),
            TxRequest::SendPacketNotAccepted(cause) => {
                self.trace.record(TxEvent::PacketNotAccepted);
                Symbol::Control(
                    ControlSymbol::packet_not_accepted(self.tx_ackid, cause.cmd()).encode(),
                )
            }
            TxRequest::SendLinkResponse { rx_ackid } => {
                self.trace.record(TxEvent::LinkResponseSent { rx_ackid });
                Symbol::Control(
                    ControlSymbol::link_response(rx_ackid, own_buf_status).encode(),
                )
            }
            TxRequest::SendLinkRequest => {
                self.trace.record(TxEvent::LinkRequestSent);
                Symbol::Control(ControlSymbol::link_request(0).encode())
            }
            TxRequest::SendRestartFromRetry => {
                self.trace.record(TxEvent::RestartFromRetrySent);
                Symbol::Control(ControlSymbol::restart_from_retry(own_buf_status).encode())
            }
        }
    }

    fn on_timeout(&mut self, tx_queue: &mut RingQueue<'_>, counters: &mut Counters) -> Symbol {
        bump!(counters, outbound_error_timeout);
        self.trace.record(TxEvent::Timeout {
            ackid: self.tx_ackid,
        });
        tx_queue.window_reset();
        self.stream_index = None;
        self.stream_ackid = None;
        self.tx_frame_timeout = [None; 32];
        self.state = TxState::OutputErrorStopped;
        Symbol::Control(ControlSymbol::link_request(0).encode())
    }

    fn next_send_ackid(&self, tx_queue: &RingQueue<'_>) -> u8 {
        (self.tx_ackid + tx_queue.get_window_used()) % 32
    }

    fn continue_stream(
        &mut self,
        tx_queue: &mut RingQueue<'_>,
        own_buf_status: u8,
        now: u32,
    ) -> Option<Symbol> {
        if let Some(idx) = self.stream_index {
            let view = tx_queue.window_packet().ok()?;
            if idx < view.len() {
                let word = view.words()[idx];
                self.stream_index = Some(idx + 1);
                return Some(Symbol::Data(word));
            }
            self.stream_index = None;
            let ackid = self.stream_ackid.take().unwrap_or(self.tx_ackid);
            self.tx_frame_timeout[ackid as usize] = Some(now);
            let _ = tx_queue.window_advance();
            self.trace.record(TxEvent::EopSent { ackid });
            return Some(Symbol::Control(ControlSymbol::eop().encode()));
        }

        // `tx_buffer_status` is already clamped to <= 31 by
        // `note_buf_status`, so comparing directly against it enforces the
        // `window_used < min(buf_status, 31)` window bound.
        if tx_queue.get_window_available() > 0 && tx_queue.get_window_used() < self.tx_buffer_status {
            let ackid = self.next_send_ackid(tx_queue);
            self.stream_ackid = Some(ackid);
            self.stream_index = Some(0);
            self.trace.record(TxEvent::SopSent { ackid });
            return Some(Symbol::Control(
                ControlSymbol::sop(ackid, own_buf_status).encode(),
            ));
        }

        None
    }
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_backing(slots: usize) -> Vec<u32> {
        vec![0u32; slots * (crate::queue::RIOPACKET_SIZE_MAX + 1)]
    }

    fn advance_past_bring_up(tx: &mut Transmitter) {
        tx.port_initialize();
        for _ in 0..STATUS_BURST {
            tx.bring_up(false, 31);
        }
        assert_eq!(tx.bring_up(true, 31), Symbol::Idle);
        assert_eq!(tx.state(), TxState::LinkInitialized);
    }

    #[test]
    fn bring_up_emits_a_status_burst_then_converges() {
        let mut tx = Transmitter::new();
        advance_past_bring_up(&mut tx);
    }

    #[test]
    fn streams_a_queued_packet_as_sop_data_eop() {
        let mut backing = queue_backing(2);
        let mut q = RingQueue::new(&mut backing);
        let mut mailbox = Mailbox::new();
        let mut counters = Counters::new();
        let mut tx = Transmitter::new();
        advance_past_bring_up(&mut tx);

        q.push_back(&[0x1111_1111, 0x2222_2222]).unwrap();

        let sop = tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 0);
        assert_eq!(sop, Symbol::Control(ControlSymbol::sop(0, 31).encode()));

        let d0 = tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 0);
        assert_eq!(d0, Symbol::Data(0x1111_1111));
        let d1 = tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 0);
        assert_eq!(d1, Symbol::Data(0x2222_2222));

        let eop = tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 5, 0);
        assert_eq!(eop, Symbol::Control(ControlSymbol::eop().encode()));
        assert_eq!(q.get_window_used(), 1);
    }

    #[test]
    fn pending_ack_outranks_a_new_packet() {
        let mut backing = queue_backing(2);
        let mut q = RingQueue::new(&mut backing);
        let mut mailbox = Mailbox::new();
        let mut counters = Counters::new();
        let mut tx = Transmitter::new();
        advance_past_bring_up(&mut tx);
        q.push_back(&[1]).unwrap();

        let sym = tx.get_symbol(&mut q, &mut mailbox, &mut counters, Some(7), true, 31, 0, 0);
        assert_eq!(
            sym,
            Symbol::Control(ControlSymbol::packet_accepted(7, 31).encode())
        );
    }

    #[test]
    fn mailbox_request_outranks_ack_and_streaming() {
        let mut backing = queue_backing(2);
        let mut q = RingQueue::new(&mut backing);
        let mut mailbox = Mailbox::new();
        mailbox.post(TxRequest::SendPacketRetry { ackid: 0 });
        let mut counters = Counters::new();
        let mut tx = Transmitter::new();
        advance_past_bring_up(&mut tx);
        q.push_back(&[1]).unwrap();

        let sym = tx.get_symbol(&mut q, &mut mailbox, &mut counters, Some(7), true, 31, 0, 0);
        assert_eq!(
            sym,
            Symbol::Control(ControlSymbol::packet_retry(0, 31).encode())
        );
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn packet_accepted_pops_front_and_advances_ackid() {
        let mut backing = queue_backing(2);
        let mut q = RingQueue::new(&mut backing);
        let mut counters = Counters::new();
        let mut tx = Transmitter::new();
        tx.port_initialize();
        q.push_back(&[1]).unwrap();
        q.window_advance().unwrap();

        tx.handle_packet_accepted(0, &mut q, &mut counters, 10);

        assert_eq!(tx.tx_ackid(), 1);
        assert_eq!(counters.outbound_complete, 1);
        assert_eq!(q.get_used(), 0);
    }

    #[test]
    fn packet_not_accepted_stops_output_until_link_response() {
        let mut backing = queue_backing(2);
        let mut q = RingQueue::new(&mut backing);
        let mut mailbox = Mailbox::new();
        let mut counters = Counters::new();
        let mut tx = Transmitter::new();
        advance_past_bring_up(&mut tx);

        tx.handle_packet_not_accepted(NotAcceptedCause::PacketCrc, &mut counters);
        assert_eq!(tx.state(), TxState::OutputErrorStopped);
        assert_eq!(counters.partner_error_packet_crc, 1);

        let sym = tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 0);
        assert_eq!(sym, Symbol::Control(ControlSymbol::link_request(0).encode()));

        tx.handle_link_response(3, &mut q);
        assert_eq!(tx.state(), TxState::LinkInitialized);
        assert_eq!(tx.tx_ackid(), 3);
    }

    #[test]
    fn timeout_rewinds_window_and_requests_link_recovery() {
        let mut backing = queue_backing(2);
        let mut q = RingQueue::new(&mut backing);
        let mut mailbox = Mailbox::new();
        let mut counters = Counters::new();
        let mut tx = Transmitter::new();
        advance_past_bring_up(&mut tx);
        q.push_back(&[1, 2]).unwrap();

        tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 100); // SOP
        tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 100); // data
        tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 100); // data
        tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 0, 100); // EOP, stamps timeout at t=0

        let sym = tx.get_symbol(&mut q, &mut mailbox, &mut counters, None, true, 31, 150, 100);
        assert_eq!(sym, Symbol::Control(ControlSymbol::link_request(0).encode()));
        assert_eq!(tx.state(), TxState::OutputErrorStopped);
        assert_eq!(counters.outbound_error_timeout, 1);
    }
}
