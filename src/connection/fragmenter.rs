//! Splitting outgoing data messages into frames (RFC 6455 Section 5.4).

use std::iter::Peekable;
use std::slice::Chunks;

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one outgoing data message.
///
/// The first frame carries the message opcode, later frames are
/// `Continuation`, and only the last has FIN set. An empty payload still
/// produces a single empty final frame.
pub struct MessageFragmenter<'a> {
    chunks: Peekable<Chunks<'a, u8>>,
    opcode: OpCode,
    started: bool,
}

impl<'a> MessageFragmenter<'a> {
    /// Fragment `payload` into frames of at most `fragment_size` bytes.
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            chunks: payload.chunks(fragment_size.max(1)).peekable(),
            opcode,
            started: false,
        }
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let opcode = if self.started {
            OpCode::Continuation
        } else {
            self.opcode
        };

        match self.chunks.next() {
            Some(chunk) => {
                self.started = true;
                let fin = self.chunks.peek().is_none();
                Some(Frame::new(fin, opcode, chunk.to_vec()))
            }
            None if !self.started => {
                self.started = true;
                Some(Frame::new(true, opcode, Vec::new()))
            }
            None => None,
        }
    }
}
