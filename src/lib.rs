//! # wsengine - client-side WebSocket protocol engine
//!
//! `wsengine` speaks RFC 6455 from the client side: the opening handshake,
//! frame encoding and decoding with masking, fragmentation, ping/pong and
//! the close handshake. Everything the peer does is reported on one ordered
//! event stream.
//!
//! ## Features
//!
//! - **Strict framing**: masking direction, reserved bits and opcodes,
//!   control frame limits, incremental UTF-8 validation
//! - **Size limits** on frames, messages, fragment counts and handshakes
//! - **Selectable binary representation** (`nodebuffer` / `arraybuffer`)
//! - **Bounded waits** for the opening and the close handshake
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsengine::{Config, Event, WebSocket};
//!
//! let (ws, mut events) = WebSocket::connect("ws://127.0.0.1:9001/", Config::new())?;
//! while let Some(event) = events.next_event().await {
//!     match event {
//!         Event::Open => ws.send("hello")?,
//!         Event::Message(data) => println!("{:?}", data.as_text()),
//!         Event::Close(close) => println!("closed: {} clean={}", close.code, close.was_clean),
//!         _ => {}
//!     }
//! }
//! ```

pub mod binary;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod message;
pub mod protocol;

#[cfg(feature = "async-tokio")]
pub mod codec;

#[cfg(feature = "async-tokio")]
mod client;

pub use binary::{BinaryData, BinaryType};
pub use config::{Config, Limits, Timeouts};
pub use connection::{ConnectionState, Role};
pub use error::{Error, Result};
pub use event::{CloseEvent, Event, MessageData};
pub use message::{CloseCode, CloseFrame, Data, Message};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};

#[cfg(feature = "async-tokio")]
pub use client::WebSocket;
#[cfg(feature = "async-tokio")]
pub use codec::WebSocketCodec;
#[cfg(feature = "async-tokio")]
pub use connection::Connection;
#[cfg(feature = "async-tokio")]
pub use event::EventStream;
