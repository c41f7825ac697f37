//! Events delivered to the owner of a connection.
//!
//! Every connection has exactly one ordered event stream. `Open` comes first
//! (unless the handshake fails), then messages and control payloads in the
//! order the peer sent them, then at most one `Error`, and finally exactly
//! one `Close`, after which the stream ends.

use crate::binary::BinaryData;
use crate::error::Error;

/// Payload of a received data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    /// A TEXT message, decoded from UTF-8.
    Text(String),
    /// A BINARY message, materialized per the connection's binary type.
    Binary(BinaryData),
}

impl MessageData {
    /// Returns `true` for text messages.
    #[must_use]
    pub const fn is_text(&self) -> bool {
        matches!(self, MessageData::Text(_))
    }

    /// The text, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageData::Text(s) => Some(s),
            MessageData::Binary(_) => None,
        }
    }

    /// The binary payload, if this is a binary message.
    #[must_use]
    pub fn as_binary(&self) -> Option<&BinaryData> {
        match self {
            MessageData::Binary(b) => Some(b),
            MessageData::Text(_) => None,
        }
    }

    /// Raw payload bytes as they appeared on the wire.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MessageData::Text(s) => s.as_bytes(),
            MessageData::Binary(b) => b.as_slice(),
        }
    }
}

/// Final outcome of a connection, reported once on entering `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close status code; 1006 when no close frame was exchanged.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
    /// Whether both close frames were exchanged.
    pub was_clean: bool,
}

impl CloseEvent {
    /// Code reported when the connection ended without a close exchange.
    pub const ABNORMAL: u16 = 1006;
    /// Code reported when the peer's close frame had no status code.
    pub const NO_STATUS: u16 = 1005;

    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }

    /// `{1006, "", false}`: transport severed, terminated, or timed out.
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(Self::ABNORMAL, "", false)
    }
}

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// The opening handshake completed.
    Open,
    /// A complete data message arrived.
    Message(MessageData),
    /// The peer sent a ping; a pong with the same payload was already sent.
    Ping(BinaryData),
    /// The peer sent a pong.
    Pong(BinaryData),
    /// The connection is failing; a `Close` event follows.
    Error(Error),
    /// The connection is closed. Always the last event.
    Close(CloseEvent),
}

#[cfg(feature = "async-tokio")]
pub use stream::EventStream;

#[cfg(feature = "async-tokio")]
mod stream {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures_core::Stream;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::Event;

    /// Ordered stream of a connection's events.
    ///
    /// Ends after the `Close` event.
    #[derive(Debug)]
    pub struct EventStream {
        rx: UnboundedReceiver<Event>,
    }

    impl EventStream {
        pub(crate) fn new(rx: UnboundedReceiver<Event>) -> Self {
            Self { rx }
        }

        /// Wait for the next event; `None` once the stream has ended.
        pub async fn next_event(&mut self) -> Option<Event> {
            self.rx.recv().await
        }

        /// Take an already queued event without waiting.
        pub fn try_next_event(&mut self) -> Option<Event> {
            self.rx.try_recv().ok()
        }
    }

    impl Stream for EventStream {
        type Item = Event;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
            self.rx.poll_recv(cx)
        }
    }
}
