//! Server-role peers: a TCP echo server and handshake helpers.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use wsengine::connection::{Connection, Incoming};
use wsengine::protocol::AssembledMessage;
use wsengine::protocol::handshake::server_handshake;
use wsengine::{Config, Message, Role, WebSocketCodec};

const MAX_HANDSHAKE: usize = 8192;

/// Answer the opening handshake and wrap `io` in a server-role connection.
pub async fn accept<S>(io: S) -> wsengine::Result<Connection<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    accept_with(io, &Config::new()).await
}

pub async fn accept_with<S>(mut io: S, config: &Config) -> wsengine::Result<Connection<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (_request, leftover) = server_handshake(&mut io, MAX_HANDSHAKE).await?;
    let mut codec = WebSocketCodec::new(io, Role::Server, config);
    codec.prepend_read(&leftover);
    Ok(Connection::from_codec(codec, config))
}

/// Answer the opening handshake and hand back the bare stream, for tests
/// that write hand-made frames.
pub async fn accept_raw<S>(mut io: S) -> S
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (_request, leftover) = server_handshake(&mut io, MAX_HANDSHAKE).await.unwrap();
    assert!(leftover.is_empty());
    io
}

/// Echo data messages back until the peer closes. Returns everything the
/// peer received, in order.
pub async fn echo<S>(mut conn: Connection<S>) -> Vec<Incoming>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut seen = Vec::new();
    loop {
        let Ok(incoming) = conn.recv().await else {
            break;
        };
        seen.push(incoming.clone());
        let result = match incoming {
            Incoming::Message(AssembledMessage::Text(text)) => conn.send(Message::Text(text)).await,
            Incoming::Message(AssembledMessage::Binary(data)) => {
                conn.send(Message::Binary(data)).await
            }
            Incoming::Ping(_) | Incoming::Pong(_) => conn.flush_replies().await,
            Incoming::Close(_) => {
                let _ = conn.flush_replies().await;
                break;
            }
        };
        if result.is_err() {
            break;
        }
    }
    seen
}

/// Echo server on an ephemeral localhost port.
pub struct TestServer {
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> (Self, SocketAddr) {
        super::init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    if let Ok(conn) = accept(stream).await {
                        echo(conn).await;
                    }
                });
            }
        });

        (Self { handle }, addr)
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}
