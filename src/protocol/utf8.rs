//! Streaming UTF-8 validation for text messages.
//!
//! A text message may be split across several frames, and a frame boundary
//! may fall inside a multi-byte character. [`Utf8Validator`] carries the
//! trailing partial character from one fragment to the next so every byte is
//! checked exactly once, and invalid input is rejected as soon as it arrives
//! rather than when the message completes.

use crate::error::{Error, Result};

/// Incremental UTF-8 validator for fragmented text messages.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    pending: [u8; 4],
    pending_len: usize,
}

/// Encoded length of a character given its leading byte.
const fn char_width(lead: u8) -> usize {
    match lead {
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 1,
    }
}

impl Utf8Validator {
    /// Create a validator with no pending bytes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: [0; 4],
            pending_len: 0,
        }
    }

    /// Validate the next fragment of a text message.
    ///
    /// With `fin = false` a truncated character at the end of `data` is kept
    /// for the next call. With `fin = true` the message must end on a
    /// character boundary.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` on the first byte that cannot be part of
    /// a valid encoding, or when the final fragment ends mid-character.
    pub fn feed(&mut self, mut data: &[u8], fin: bool) -> Result<()> {
        if self.pending_len > 0 {
            let width = char_width(self.pending[0]);
            let take = (width - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take]
                .copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];

            let partial = &self.pending[..self.pending_len];
            match std::str::from_utf8(partial) {
                Ok(_) => self.pending_len = 0,
                Err(e) if e.error_len().is_none() && !fin => return Ok(()),
                Err(_) => {
                    self.reset();
                    return Err(Error::InvalidUtf8);
                }
            }
        }

        match std::str::from_utf8(data) {
            Ok(_) => Ok(()),
            Err(e) if e.error_len().is_none() && !fin => {
                let tail = &data[e.valid_up_to()..];
                self.pending[..tail.len()].copy_from_slice(tail);
                self.pending_len = tail.len();
                Ok(())
            }
            Err(_) => {
                self.reset();
                Err(Error::InvalidUtf8)
            }
        }
    }

    /// Discard any pending partial character.
    pub fn reset(&mut self) {
        self.pending_len = 0;
    }

    /// Whether a partial character is waiting for its continuation bytes.
    #[must_use]
    pub const fn has_incomplete(&self) -> bool {
        self.pending_len > 0
    }
}

/// Validate a complete, unfragmented payload.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` if the data is not valid UTF-8.
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data)?;
    Ok(())
}
