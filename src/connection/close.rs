//! Close handshake bookkeeping (RFC 6455 Section 7).

use crate::event::CloseEvent;
use crate::message::{CloseCode, CloseFrame};
use crate::protocol::Frame;

/// Which endpoint sent the first close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseInitiator {
    Local,
    Remote,
}

/// Tracks the close frames exchanged on one connection.
///
/// A `None` close frame stands for an empty close payload.
#[derive(Debug, Clone, Default)]
pub struct CloseHandshake {
    sent: Option<Option<CloseFrame>>,
    received: Option<Option<CloseFrame>>,
    initiator: Option<CloseInitiator>,
}

impl CloseHandshake {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a close frame was written.
    pub fn on_send(&mut self, frame: Option<CloseFrame>) {
        if self.sent.is_some() {
            return;
        }
        self.initiator.get_or_insert(CloseInitiator::Local);
        self.sent = Some(frame);
    }

    /// Record a close frame from the peer.
    ///
    /// Returns the reply to send when the peer started the handshake: a
    /// close frame echoing the peer's status code, or an empty one when the
    /// peer sent none.
    pub fn on_receive(&mut self, frame: Option<CloseFrame>) -> Option<Frame> {
        if self.received.is_some() {
            return None;
        }
        self.initiator.get_or_insert(CloseInitiator::Remote);
        let echo = frame.as_ref().map(|f| f.code.as_u16());
        self.received = Some(frame);

        if self.sent.is_some() {
            return None;
        }
        self.sent = Some(echo.map(|code| CloseFrame::new(CloseCode::from_u16(code), "")));
        Some(Frame::close(echo, ""))
    }

    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent.is_some()
    }

    #[must_use]
    pub fn is_received(&self) -> bool {
        self.received.is_some()
    }

    /// Both close frames have been exchanged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_sent() && self.is_received()
    }

    #[must_use]
    pub fn initiator(&self) -> Option<CloseInitiator> {
        self.initiator
    }

    /// The close event for the current state of the exchange.
    ///
    /// A complete exchange is clean and reports the initiator's code and
    /// reason (1005 for an empty close payload). Anything else is 1006.
    #[must_use]
    pub fn outcome(&self) -> CloseEvent {
        if !self.is_complete() {
            return CloseEvent::abnormal();
        }
        let frame = match self.initiator {
            Some(CloseInitiator::Local) => &self.sent,
            _ => &self.received,
        };
        match frame {
            Some(Some(f)) => CloseEvent::new(f.code.as_u16(), f.reason.clone(), true),
            _ => CloseEvent::new(CloseEvent::NO_STATUS, "", true),
        }
    }
}
