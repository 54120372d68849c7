// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cross-machine signalling between [`crate::rx::Receiver`] and
//! [`crate::tx::Transmitter`].
//!
//! Rather than have the receiver write directly into transmitter fields
//! (`tx_state := SEND_PACKET_RETRY` and friends), it deposits a request
//! into an explicit mailbox that the transmitter drains on its next
//! `get_symbol` call — same effect, no shared mutable state between the
//! two machines.

use crate::error::NotAcceptedCause;

/// A request the receiver has queued for the transmitter to act on.
///
/// At most one request is pending at a time: a new request overwrites
/// whatever was there. The transmitter is expected to drain its mailbox
/// every time it's polled, so there's no legitimate way for two requests
/// to pile up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxRequest {
    SendPacketRetry { ackid: u8 },
    SendPacketNotAccepted(NotAcceptedCause),
    SendLinkResponse { rx_ackid: u8 },
    SendLinkRequest,
    SendRestartFromRetry,
}

/// A single-slot mailbox for [`TxRequest`]s.
#[derive(Default)]
pub struct Mailbox(Option<TxRequest>);

impl Mailbox {
    pub const fn new() -> Self {
        Self(None)
    }

    pub fn post(&mut self, request: TxRequest) {
        self.0 = Some(request);
    }

    /// Takes the pending request, if any, leaving the mailbox empty.
    pub fn take(&mut self) -> Option<TxRequest> {
        self.0.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_request_wins() {
        let mut mb = Mailbox::new();
        mb.post(TxRequest::SendPacketRetry { ackid: 0 });
        mb.post(TxRequest::SendLinkResponse { rx_ackid: 3 });
        assert_eq!(mb.take(), Some(TxRequest::SendLinkResponse { rx_ackid: 3 }));
        assert_eq!(mb.take(), None);
    }
}
