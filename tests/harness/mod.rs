//! Shared test peers and helpers for the integration tests.
//!
//! The peer side is built from the crate's own server-role codec, so the
//! tests need nothing beyond tokio.

#![allow(dead_code)]

mod client;
mod server;

pub use client::{next_event, open_pair, open_pair_raw, ws_url};
pub use server::{TestServer, accept, accept_raw, accept_with, echo};

/// Route `tracing` output to the test writer; `RUST_LOG=wsengine=trace`
/// shows every frame.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
