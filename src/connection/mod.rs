//! Connection lifecycle: state, close handshake and the message engine.
//!
//! [`Connection`] runs RFC 6455 over a stream whose opening handshake is
//! already done. Its state starts at `Open`, moves to `Closing` once a close
//! frame is sent and to `Closed` once the peer's close frame arrives. The
//! caller-facing `Connecting` state lives in [`WebSocket`](crate::WebSocket).

pub mod close;
mod role;
mod state;

pub use close::{CloseHandshake, CloseInitiator};
pub use role::Role;
pub use state::ConnectionState;

#[cfg(feature = "async-tokio")]
mod fragmenter;

#[cfg(feature = "async-tokio")]
pub use fragmenter::MessageFragmenter;

#[cfg(feature = "async-tokio")]
#[allow(clippy::module_inception)]
mod connection;

#[cfg(feature = "async-tokio")]
pub use connection::{Connection, Incoming};
