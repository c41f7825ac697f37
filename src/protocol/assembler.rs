//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::utf8::Utf8Validator;
use crate::protocol::{Frame, OpCode};

/// A complete data message rebuilt from one or more frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembledMessage {
    /// Text message, already validated as UTF-8.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
}

impl AssembledMessage {
    /// Opcode of the frame that started this message.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            AssembledMessage::Text(_) => OpCode::Text,
            AssembledMessage::Binary(_) => OpCode::Binary,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            AssembledMessage::Text(s) => s.len(),
            AssembledMessage::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-progress message state.
#[derive(Debug)]
struct Partial {
    opcode: OpCode,
    fragments: usize,
    utf8: Option<Utf8Validator>,
}

/// Collects data frames until FIN and enforces size and fragment limits.
///
/// Text payloads are validated incrementally as each fragment arrives, so
/// an invalid byte fails the message without waiting for the final frame.
/// Control frames are not handled here; the connection answers them
/// between fragments.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    partial: Option<Partial>,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an assembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            partial: None,
            limits,
        }
    }

    /// Feed the next data frame.
    ///
    /// Returns the finished message when `frame.fin` is set.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with no message in
    ///   progress, a new message before the previous one finished, or a
    ///   control frame
    /// - `Error::MessageTooLarge` / `Error::TooManyFragments` on limits
    /// - `Error::InvalidUtf8` for malformed text
    ///
    /// After an error the assembler is reset.
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        let result = self.accept(&frame);
        if result.is_err() {
            self.reset();
        }
        result?;

        if !frame.fin {
            return Ok(None);
        }

        let Some(partial) = self.partial.take() else {
            return Err(Error::ProtocolViolation("no message in progress".into()));
        };
        let payload = self.buffer.split().to_vec();
        let message = match partial.opcode {
            // the validator already saw every byte
            OpCode::Text => AssembledMessage::Text(String::from_utf8(payload)?),
            _ => AssembledMessage::Binary(payload),
        };
        Ok(Some(message))
    }

    fn accept(&mut self, frame: &Frame) -> Result<()> {
        match (frame.opcode, self.partial.as_mut()) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(partial)) => partial.fragments += 1,
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (OpCode::Text | OpCode::Binary, None) => {}
            (opcode, _) => {
                return Err(Error::ProtocolViolation(format!(
                    "{opcode} frame passed to message assembler"
                )));
            }
        }
        if self.partial.is_none() {
            self.partial = Some(Partial {
                opcode: frame.opcode,
                fragments: 1,
                utf8: (frame.opcode == OpCode::Text).then(Utf8Validator::new),
            });
        }

        let Some(partial) = self.partial.as_mut() else {
            return Ok(());
        };
        self.limits.check_fragment_count(partial.fragments)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;
        if let Some(utf8) = partial.utf8.as_mut() {
            utf8.feed(frame.payload(), frame.fin)?;
        }

        self.buffer.extend_from_slice(frame.payload());
        Ok(())
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.partial.is_some()
    }

    /// Drop any partially assembled message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.partial = None;
    }
}
