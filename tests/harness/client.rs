//! Client-side helpers.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::DuplexStream;
use wsengine::connection::Connection;
use wsengine::{Config, Event, EventStream, WebSocket};

use super::init_tracing;
use super::server::{accept, accept_raw};

const EVENT_WAIT: Duration = Duration::from_secs(5);

pub fn ws_url(addr: SocketAddr) -> String {
    format!("ws://{addr}/echo")
}

/// Next event, failing the test if none arrives in time.
pub async fn next_event(events: &mut EventStream) -> Option<Event> {
    tokio::time::timeout(EVENT_WAIT, events.next_event())
        .await
        .expect("timed out waiting for an event")
}

/// A client over an in-memory pipe plus the server-role peer, already open.
pub async fn open_pair(config: Config) -> (WebSocket, EventStream, Connection<DuplexStream>) {
    init_tracing();
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (ws, mut events) = WebSocket::with_stream("ws://localhost/test", client_io, config).unwrap();
    let peer = accept(server_io).await.unwrap();
    assert_eq!(next_event(&mut events).await, Some(Event::Open));
    (ws, events, peer)
}

/// Like [`open_pair`], but the peer is the bare stream.
pub async fn open_pair_raw(config: Config) -> (WebSocket, EventStream, DuplexStream) {
    init_tracing();
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (ws, mut events) = WebSocket::with_stream("ws://localhost/test", client_io, config).unwrap();
    let peer = accept_raw(server_io).await;
    assert_eq!(next_event(&mut events).await, Some(Event::Open));
    (ws, events, peer)
}
