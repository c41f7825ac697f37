//! Inbound frame header validation (RFC 6455 Sections 5.1, 5.2 and 5.5).
//!
//! Checks run on the header alone, before the payload is buffered, so an
//! oversized or malformed frame is rejected without reading its body.

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};

/// Validates headers of frames received by one endpoint.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
}

impl FrameValidator {
    /// Create a validator for frames received by `role`.
    #[must_use]
    pub const fn new(role: Role, limits: Limits) -> Self {
        Self { role, limits }
    }

    /// Validate a decoded frame header.
    ///
    /// Checks, in order: masking direction, reserved bits, control frame
    /// constraints and the frame size limit.
    ///
    /// # Errors
    ///
    /// - `Error::MaskedServerFrame` - client received a masked frame
    /// - `Error::UnmaskedClientFrame` - server received an unmasked frame
    /// - `Error::ReservedBitsSet` - RSV bits set, no extension negotiated
    /// - `Error::FragmentedControlFrame` / `Error::ControlFrameTooLarge`
    /// - `Error::FrameTooLarge` - payload exceeds `max_frame_size`
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        match (self.role, header.is_masked()) {
            (Role::Client, true) => return Err(Error::MaskedServerFrame),
            (Role::Server, false) => return Err(Error::UnmaskedClientFrame),
            _ => {}
        }

        if header.rsv.iter().any(|&bit| bit) {
            return Err(Error::ReservedBitsSet);
        }

        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if header.payload_len > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(header.payload_len));
            }
        }

        self.limits.check_frame_size(header.payload_len)
    }
}
