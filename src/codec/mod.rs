//! Frame codec over tokio byte streams.

#[cfg(feature = "async-tokio")]
mod framed;

#[cfg(feature = "async-tokio")]
pub use framed::WebSocketCodec;
