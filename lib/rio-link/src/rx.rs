// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Receiver state machine.
//!
//! Reassembles inbound `Symbol`s into packets, enqueues completed packets
//! into the caller's rx [`RingQueue`], and asks [`crate::tx::Transmitter`]
//! (via the [`Mailbox`]) to emit acks, retries, link responses, or a link
//! request as framing events demand.
//!
//! Control symbols whose `stype0` names an ack-class event
//! (`PACKET_ACCEPTED`/`PACKET_RETRY`/`PACKET_NOT_ACCEPTED`/`LINK_RESPONSE`)
//! never reach [`Receiver::add_symbol`] — the facade in `lib.rs` routes those
//! straight to the transmitter, since they describe what happened to *our*
//! outbound packets, not the peer's.

use crate::crc::PacketCrc;
use crate::diag::{bump, Counters};
use crate::error::NotAcceptedCause;
use crate::mailbox::{Mailbox, TxRequest};
use crate::queue::{RingQueue, RIOPACKET_SIZE_MAX};
use crate::symbol::{ControlSymbol, Stype1, Symbol};
use crate::trace::{RxEvent, TraceLog};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RxState {
    Uninitialized,
    PortInitialized,
    LinkInitialized,
    InputRetryStopped,
    InputErrorStopped,
}

/// Inbound half of the link engine.
pub struct Receiver {
    state: RxState,
    rx_ackid: u8,
    rx_counter: usize,
    /// `Some` while a packet is being reassembled (between SOP and EOP).
    rx_crc: Option<PacketCrc>,
    /// The most recently arrived word, held back until we know whether a
    /// following word (or EOP) proves it wasn't the packet's trailing CRC
    /// word. See the module doc on CRC validation below.
    pending_word: Option<u32>,
    rx_words: [u32; RIOPACKET_SIZE_MAX],
    rx_status_received: bool,
    /// The ackID of the most recently completed inbound packet, pending
    /// piggyback onto the transmitter's next outbound control symbol.
    rx_ackid_acked: Option<u8>,
    last_error: Option<NotAcceptedCause>,
    trace: TraceLog<RxEvent, 16>,
}

impl Receiver {
    pub const fn new() -> Self {
        Self {
            state: RxState::Uninitialized,
            rx_ackid: 0,
            rx_counter: 0,
            rx_crc: None,
            pending_word: None,
            rx_words: [0; RIOPACKET_SIZE_MAX],
            rx_status_received: false,
            rx_ackid_acked: None,
            last_error: None,
            trace: TraceLog::new(RxEvent::None),
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn rx_ackid(&self) -> u8 {
        self.rx_ackid
    }

    pub fn rx_status_received(&self) -> bool {
        self.rx_status_received
    }

    pub fn rx_ackid_acked(&self) -> Option<u8> {
        self.rx_ackid_acked
    }

    pub fn last_error(&self) -> Option<NotAcceptedCause> {
        self.last_error
    }

    pub fn trace(&self) -> &TraceLog<RxEvent, 16> {
        &self.trace
    }

    /// `port_set_status(true)`: UNINITIALIZED -> PORT_INITIALIZED, or reset
    /// back into PORT_INITIALIZED from any other state.
    pub fn port_initialize(&mut self) {
        self.state = RxState::PortInitialized;
        self.rx_ackid = 0;
        self.rx_counter = 0;
        self.rx_crc = None;
        self.pending_word = None;
        self.rx_status_received = false;
        self.rx_ackid_acked = None;
        self.last_error = None;
        self.trace.record(RxEvent::PortInitialized);
    }

    /// `port_set_status(false)`: forces UNINITIALIZED.
    pub fn port_uninitialize(&mut self) {
        self.state = RxState::Uninitialized;
        self.rx_crc = None;
        self.pending_word = None;
    }

    fn enter_error_stopped(
        &mut self,
        cause: NotAcceptedCause,
        mailbox: &mut Mailbox,
        request: TxRequest,
    ) {
        self.state = RxState::InputErrorStopped;
        self.rx_crc = None;
        self.pending_word = None;
        self.last_error = Some(cause);
        mailbox.post(request);
    }

    /// Entry point for every inbound `Symbol` whose control-class routing
    /// (if any) belongs here rather than with the transmitter: idles, data
    /// words, codec errors, and control symbols with `stype0 == NONE` or
    /// `stype0 == STATUS`.
    pub fn add_symbol(
        &mut self,
        sym: Symbol,
        rx_queue: &mut RingQueue<'_>,
        mailbox: &mut Mailbox,
        counters: &mut Counters,
    ) {
        match sym {
            Symbol::Idle => {}
            Symbol::Error => {
                bump!(counters, inbound_error_illegal_character);
                self.trace.record(RxEvent::IllegalCharacter);
                self.enter_error_stopped(
                    NotAcceptedCause::IllegalCharacter,
                    mailbox,
                    TxRequest::SendLinkRequest,
                );
            }
            Symbol::Data(word) => self.on_data_word(word, rx_queue, mailbox, counters),
            Symbol::Control(wire) => match ControlSymbol::decode(wire) {
                None => {
                    bump!(counters, inbound_error_control_crc);
                    self.trace.record(RxEvent::ControlCrcError);
                    self.enter_error_stopped(
                        NotAcceptedCause::ControlCrc,
                        mailbox,
                        TxRequest::SendLinkRequest,
                    );
                }
                Some(cs) => self.on_control_symbol(cs, rx_queue, mailbox, counters),
            },
        }
    }

    fn on_control_symbol(
        &mut self,
        cs: ControlSymbol,
        rx_queue: &mut RingQueue<'_>,
        mailbox: &mut Mailbox,
        counters: &mut Counters,
    ) {
        match cs.stype1() {
            Some(Stype1::StartOfPacket) => self.on_sop(cs.param0, rx_queue, mailbox, counters),
            Some(Stype1::EndOfPacket) => self.on_eop(rx_queue, mailbox, counters),
            Some(Stype1::LinkRequest) => self.on_link_request(mailbox, counters),
            Some(Stype1::RestartFromRetry) => self.on_restart_from_retry(),
            Some(Stype1::Stomp) | Some(Stype1::MulticastEvent) | Some(Stype1::Nop) => {
                if cs.stype0().map(|s| s == crate::symbol::Stype0::Status).unwrap_or(false) {
                    self.on_status(cs.param0);
                }
            }
            None => {
                bump!(counters, inbound_error_packet_unsupported);
            }
        }
    }

    fn on_status(&mut self, ackid: u8) {
        if self.state == RxState::PortInitialized && ackid == self.rx_ackid {
            self.rx_status_received = true;
            self.state = RxState::LinkInitialized;
            self.trace.record(RxEvent::LinkInitialized);
        }
    }

    fn on_sop(
        &mut self,
        ackid: u8,
        rx_queue: &mut RingQueue<'_>,
        mailbox: &mut Mailbox,
        counters: &mut Counters,
    ) {
        if self.state != RxState::LinkInitialized {
            bump!(counters, inbound_error_packet_unsupported);
            return;
        }
        if ackid != self.rx_ackid {
            bump!(counters, inbound_error_packet_ackid);
            self.trace.record(RxEvent::UnexpectedAckId {
                expected: self.rx_ackid,
                got: ackid,
            });
            self.enter_error_stopped(
                NotAcceptedCause::UnexpectedAckId,
                mailbox,
                TxRequest::SendPacketNotAccepted(NotAcceptedCause::UnexpectedAckId),
            );
            return;
        }
        if rx_queue.get_available() == 0 {
            self.state = RxState::InputRetryStopped;
            bump!(counters, inbound_retry);
            mailbox.post(TxRequest::SendPacketRetry { ackid });
            return;
        }
        self.rx_crc = Some(PacketCrc::new());
        self.pending_word = None;
        self.rx_counter = 0;
        self.trace.record(RxEvent::ReceivingPacket { ackid });
    }

    fn on_data_word(
        &mut self,
        word: u32,
        _rx_queue: &mut RingQueue<'_>,
        mailbox: &mut Mailbox,
        counters: &mut Counters,
    ) {
        if self.rx_crc.is_none() {
            bump!(counters, inbound_error_general);
            return;
        }
        if let Some(prev) = self.pending_word.take() {
            if self.rx_counter >= RIOPACKET_SIZE_MAX {
                bump!(counters, inbound_error_general);
                self.trace.record(RxEvent::PacketTooLong);
                self.enter_error_stopped(
                    NotAcceptedCause::General,
                    mailbox,
                    TxRequest::SendPacketNotAccepted(NotAcceptedCause::General),
                );
                return;
            }
            self.rx_words[self.rx_counter] = prev;
            self.rx_counter += 1;
            self.rx_crc.as_mut().expect("checked above").update_word(prev);
        }
        self.pending_word = Some(word);
    }

    fn on_eop(
        &mut self,
        rx_queue: &mut RingQueue<'_>,
        mailbox: &mut Mailbox,
        counters: &mut Counters,
    ) {
        let Some(crc) = self.rx_crc.take() else {
            bump!(counters, inbound_error_general);
            return;
        };
        let Some(crc_word) = self.pending_word.take() else {
            bump!(counters, inbound_error_general);
            self.enter_error_stopped(
                NotAcceptedCause::General,
                mailbox,
                TxRequest::SendPacketNotAccepted(NotAcceptedCause::General),
            );
            return;
        };
        if self.rx_counter >= RIOPACKET_SIZE_MAX {
            bump!(counters, inbound_error_general);
            self.trace.record(RxEvent::PacketTooLong);
            self.enter_error_stopped(
                NotAcceptedCause::General,
                mailbox,
                TxRequest::SendPacketNotAccepted(NotAcceptedCause::General),
            );
            return;
        }
        let computed = crc.finalize() as u32;
        let expected = crc_word & 0xFFFF;
        if computed != expected {
            bump!(counters, inbound_error_packet_crc);
            self.trace.record(RxEvent::PacketCrcError);
            self.enter_error_stopped(
                NotAcceptedCause::PacketCrc,
                mailbox,
                TxRequest::SendPacketNotAccepted(NotAcceptedCause::PacketCrc),
            );
            return;
        }
        self.rx_words[self.rx_counter] = crc_word;
        self.rx_counter += 1;

        // Infallible: `on_sop` already confirmed a free slot, and nothing
        // between SOP and here can consume it.
        let _ = rx_queue.push_back(&self.rx_words[..self.rx_counter]);

        let acked = self.rx_ackid;
        self.rx_ackid = (self.rx_ackid + 1) % 32;
        self.rx_ackid_acked = Some(acked);
        self.rx_counter = 0;
        bump!(counters, inbound_complete);
        self.trace.record(RxEvent::PacketComplete { ackid: acked });
    }

    fn on_link_request(&mut self, mailbox: &mut Mailbox, counters: &mut Counters) {
        bump!(counters, partner_link_request);
        mailbox.post(TxRequest::SendLinkResponse {
            rx_ackid: self.rx_ackid,
        });
        if self.recover_if_stopped() {
            self.trace.record(RxEvent::LinkRequestHandled);
        }
    }

    /// Clears `INPUT_ERROR_STOPPED`/`INPUT_RETRY_STOPPED` back to
    /// `LINK_INITIALIZED`. Called both when we receive a peer's
    /// `LINK_REQUEST` and when our own `LINK_REQUEST` — posted
    /// by this same receiver when it gave up on a corrupted control symbol
    /// — comes back as a `LINK_RESPONSE`: either way the handshake just
    /// completed and the whole port, not only the transmitter, is back in
    /// sync. Returns whether a stopped state was actually cleared.
    pub(crate) fn recover_if_stopped(&mut self) -> bool {
        if matches!(
            self.state,
            RxState::InputErrorStopped | RxState::InputRetryStopped
        ) {
            self.rx_counter = 0;
            self.rx_crc = None;
            self.pending_word = None;
            self.state = RxState::LinkInitialized;
            true
        } else {
            false
        }
    }

    fn on_restart_from_retry(&mut self) {
        if self.state == RxState::InputRetryStopped {
            self.state = RxState::LinkInitialized;
            self.trace.record(RxEvent::RestartFromRetryHandled);
        }
    }

    /// Clears `INPUT_RETRY_STOPPED` once the host has freed an inbound
    /// slot. Unlike [`Receiver::recover_if_stopped`], this never touches
    /// `INPUT_ERROR_STOPPED` — that latch only clears via the
    /// link-request/link-response handshake, not by freeing queue space.
    /// Returns whether the latch was actually cleared.
    pub(crate) fn recover_if_retry_stopped(&mut self) -> bool {
        if self.state == RxState::InputRetryStopped {
            self.state = RxState::LinkInitialized;
            self.trace.record(RxEvent::RestartFromRetryHandled);
            true
        } else {
            false
        }
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}
