//! Which end of the connection we are.

use std::fmt;

/// Endpoint role; decides the masking direction (RFC 6455 Section 5.3).
///
/// The engine always runs as a `Client`. `Server` exists so test peers and
/// tools can speak the other half of the protocol with the same codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Masks every outgoing frame, rejects masked incoming frames.
    Client,
    /// Never masks, requires masked incoming frames.
    Server,
}

impl Role {
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether frames from the peer must carry a masking key.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Client => "client",
            Role::Server => "server",
        })
    }
}
