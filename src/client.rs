//! The caller-facing WebSocket handle and its driver task.
//!
//! [`WebSocket::connect`] and [`WebSocket::with_stream`] return at once in
//! the `Connecting` state, together with the connection's [`EventStream`].
//! A spawned driver task owns the transport. It runs the opening handshake,
//! then multiplexes caller commands, inbound frames, termination and the
//! close timeout.
//!
//! `readyState`, `binaryType`, the selected subprotocol and the close event
//! sit behind one mutex shared by the handle and the driver. Every state
//! transition and every event emission happens while it is held, so events
//! come out in order and `Close` is always last.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::binary::BinaryType;
use crate::codec::WebSocketCodec;
use crate::config::Config;
use crate::connection::{Connection, ConnectionState, Incoming, Role};
use crate::error::{Error, Result};
use crate::event::{CloseEvent, Event, EventStream, MessageData};
use crate::message::{CloseCode, CloseFrame, Data, Message};
use crate::protocol::handshake::{HandshakeRequest, HandshakeResponse, client_handshake};
use crate::protocol::{AssembledMessage, MAX_CONTROL_FRAME_PAYLOAD};

/// State shared by the handle and the driver.
struct Shared {
    state: ConnectionState,
    binary_type: BinaryType,
    protocol: String,
    close_event: Option<CloseEvent>,
    close_deadline: Option<Instant>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl Shared {
    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            // a dropped EventStream only means nobody is listening
            let _ = tx.send(event);
        }
    }

    fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        true
    }

    /// Enter `Closed`, emitting the optional error and then the close event.
    ///
    /// Returns `false` if the connection was already closed.
    fn finish(&mut self, error: Option<Error>, close: CloseEvent) -> bool {
        if !self.transition(ConnectionState::Closed) {
            return false;
        }
        if let Some(err) = error {
            self.emit(Event::Error(err));
        }
        debug!(code = close.code, was_clean = close.was_clean, "connection closed");
        self.close_event = Some(close.clone());
        self.emit(Event::Close(close));
        self.events = None;
        true
    }
}

struct Inner {
    url: Url,
    shared: Mutex<Shared>,
    commands: mpsc::UnboundedSender<Message>,
    close_timeout: Duration,
    terminate: Notify,
    closing: Notify,
}

/// Handle to a client WebSocket connection.
///
/// Cloning the handle is cheap; all clones control the same connection.
/// Operations never block: they validate their input, queue the work for
/// the driver task and return. Outcomes are reported on the
/// [`EventStream`].
///
/// Dropping every handle does not close the connection. Call
/// [`close`](Self::close) or [`terminate`](Self::terminate).
///
/// ```rust,ignore
/// use wsengine::{Config, Event, WebSocket};
///
/// let (ws, mut events) = WebSocket::connect("ws://127.0.0.1:9001/chat", Config::new())?;
/// while let Some(event) = events.next_event().await {
///     match event {
///         Event::Open => ws.send("hello")?,
///         Event::Message(data) => {
///             println!("{data:?}");
///             ws.close()?;
///         }
///         Event::Close(close) => println!("closed with {}", close.code),
///         _ => {}
///     }
/// }
/// ```
#[derive(Clone)]
pub struct WebSocket {
    inner: Arc<Inner>,
}

impl WebSocket {
    /// Open a `ws://` connection over TCP.
    ///
    /// Must be called from within a tokio runtime. `wss://` URLs are
    /// rejected; establish the TLS stream yourself and use
    /// [`with_stream`](Self::with_stream).
    ///
    /// # Errors
    ///
    /// `Error::InvalidUrl` for malformed URLs, `Error::InvalidHeaderValue`
    /// for unusable handshake settings, `Error::NoRuntime` outside tokio.
    /// Connection failures are reported as events.
    pub fn connect(url: &str, config: Config) -> Result<(Self, EventStream)> {
        let url = parse_url(url)?;
        if url.scheme() == "wss" {
            return Err(Error::InvalidUrl(
                "wss:// needs a TLS stream; use WebSocket::with_stream".into(),
            ));
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_owned(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(Error::InvalidUrl("URL has no host".into())),
        };
        let port = url.port_or_known_default().unwrap_or(80);

        Self::spawn(url, config, async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }

    /// Run the connection over an already established byte stream.
    ///
    /// `url` is still required: it supplies the handshake's `Host` and
    /// request path. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Same synchronous errors as [`connect`](Self::connect), except that
    /// `wss://` URLs are accepted.
    pub fn with_stream<S>(url: &str, io: S, config: Config) -> Result<(Self, EventStream)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let url = parse_url(url)?;
        Self::spawn(url, config, async move { Ok(io) })
    }

    fn spawn<S, F>(url: Url, config: Config, connect: F) -> Result<(Self, EventStream)>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = Result<S>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let request = HandshakeRequest::for_url(&url, &config)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            url,
            shared: Mutex::new(Shared {
                state: ConnectionState::Connecting,
                binary_type: config.binary_type,
                protocol: String::new(),
                close_event: None,
                close_deadline: None,
                events: Some(events_tx),
            }),
            commands: commands_tx,
            close_timeout: config.timeouts.close,
            terminate: Notify::new(),
            closing: Notify::new(),
        });

        debug!(url = %inner.url, "connecting");
        runtime.spawn(drive(inner.clone(), connect, request, config, commands_rx));
        Ok((Self { inner }, EventStream::new(events_rx)))
    }

    /// Send a data message.
    ///
    /// Strings go out as TEXT, byte inputs as BINARY with the exact bytes.
    ///
    /// # Errors
    ///
    /// `Error::NotOpen` while `Connecting`. Calls made while `Closing` or
    /// `Closed` are dropped and return `Ok(())`.
    pub fn send(&self, data: impl Into<Data>) -> Result<()> {
        self.enqueue("send", data.into().into_message())
    }

    /// Send a ping. Pass [`Data::default()`] for an empty one.
    ///
    /// # Errors
    ///
    /// `Error::ControlFrameTooLarge` above 125 bytes, otherwise as
    /// [`send`](Self::send).
    pub fn ping(&self, data: impl Into<Data>) -> Result<()> {
        let payload = control_payload(data.into())?;
        self.enqueue("ping", Message::Ping(payload))
    }

    /// Send an unsolicited pong. Pings are answered automatically.
    ///
    /// # Errors
    ///
    /// As [`ping`](Self::ping).
    pub fn pong(&self, data: impl Into<Data>) -> Result<()> {
        let payload = control_payload(data.into())?;
        self.enqueue("pong", Message::Pong(payload))
    }

    fn enqueue(&self, op: &'static str, message: Message) -> Result<()> {
        let shared = self.inner.shared.lock();
        match shared.state {
            ConnectionState::Connecting => Err(Error::NotOpen(ConnectionState::Connecting)),
            ConnectionState::Open => {
                if self.inner.commands.send(message).is_err() {
                    debug!(op, "driver gone, dropping call");
                }
                Ok(())
            }
            state => {
                debug!(op, %state, "connection closing, dropping call");
                Ok(())
            }
        }
    }

    /// Start the close handshake with code 1000 and no reason.
    ///
    /// # Errors
    ///
    /// Never fails for this code; the signature matches
    /// [`close_with`](Self::close_with).
    pub fn close(&self) -> Result<()> {
        self.close_with(CloseCode::Normal.as_u16(), "")
    }

    /// Start the close handshake with an explicit code and reason.
    ///
    /// In `Connecting` the handshake is aborted and the connection closes
    /// with 1006. In `Closing` and `Closed` this does nothing.
    ///
    /// # Errors
    ///
    /// `Error::InvalidCloseCode` for codes that may not be sent,
    /// `Error::CloseReasonTooLong` for reasons over 123 UTF-8 bytes.
    pub fn close_with(&self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame::new(CloseCode::from_u16(code), reason);
        frame.validate()?;
        self.start_close(Some(frame));
        Ok(())
    }

    /// Start the close handshake; `None` sends an empty close payload.
    ///
    /// # Errors
    ///
    /// `Error::InvalidCloseCode` for codes that may not be sent.
    pub fn close_with_code(&self, code: Option<u16>) -> Result<()> {
        match code {
            Some(code) => self.close_with(code, ""),
            None => {
                self.start_close(None);
                Ok(())
            }
        }
    }

    fn start_close(&self, frame: Option<CloseFrame>) {
        let mut shared = self.inner.shared.lock();
        match shared.state {
            ConnectionState::Connecting => {
                shared.finish(Some(Error::HandshakeAborted), CloseEvent::abnormal());
                drop(shared);
                self.inner.terminate.notify_one();
            }
            ConnectionState::Open => {
                shared.transition(ConnectionState::Closing);
                // the deadline runs from here, even while earlier sends are stuck
                shared.close_deadline = Some(Instant::now() + self.inner.close_timeout);
                if self.inner.commands.send(Message::Close(frame)).is_err() {
                    debug!("driver gone, dropping close");
                }
                drop(shared);
                self.inner.closing.notify_one();
            }
            state => debug!(%state, "close ignored"),
        }
    }

    /// Sever the transport immediately; the connection closes with 1006.
    ///
    /// Does nothing once `Closed`.
    pub fn terminate(&self) {
        let mut shared = self.inner.shared.lock();
        let error = match shared.state {
            ConnectionState::Closed => return,
            ConnectionState::Connecting => Some(Error::HandshakeAborted),
            _ => None,
        };
        shared.finish(error, CloseEvent::abnormal());
        drop(shared);
        self.inner.terminate.notify_one();
    }

    #[must_use]
    pub fn ready_state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    #[must_use]
    pub fn binary_type(&self) -> BinaryType {
        self.inner.shared.lock().binary_type
    }

    /// Choose how later binary messages, pings and pongs are materialized.
    pub fn set_binary_type(&self, binary_type: BinaryType) {
        self.inner.shared.lock().binary_type = binary_type;
    }

    /// Set the binary type by name (`"nodebuffer"` or `"arraybuffer"`).
    ///
    /// # Errors
    ///
    /// `Error::InvalidBinaryType` for any other name; the current setting
    /// is kept.
    pub fn try_set_binary_type(&self, name: &str) -> Result<()> {
        let binary_type = name.parse()?;
        self.set_binary_type(binary_type);
        Ok(())
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Subprotocol selected by the server; empty before `Open` or when none
    /// was negotiated.
    #[must_use]
    pub fn protocol(&self) -> String {
        self.inner.shared.lock().protocol.clone()
    }

    /// The close event, once the connection is `Closed`.
    #[must_use]
    pub fn close_event(&self) -> Option<CloseEvent> {
        self.inner.shared.lock().close_event.clone()
    }
}

impl fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocket")
            .field("url", &self.inner.url.as_str())
            .field("ready_state", &self.ready_state())
            .finish_non_exhaustive()
    }
}

fn parse_url(input: &str) -> Result<Url> {
    let url = Url::parse(input)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme {other:?}, expected \"ws\" or \"wss\""
            )));
        }
    }
    if url.fragment().is_some() {
        return Err(Error::InvalidUrl("URL must not contain a fragment".into()));
    }
    if url.host().is_none() {
        return Err(Error::InvalidUrl("URL has no host".into()));
    }
    Ok(url)
}

fn control_payload(data: Data) -> Result<Vec<u8>> {
    let payload = data.into_vec();
    if payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
        return Err(Error::ControlFrameTooLarge(payload.len()));
    }
    Ok(payload)
}

async fn drive<S, F>(
    inner: Arc<Inner>,
    connect: F,
    request: HandshakeRequest,
    config: Config,
    commands: mpsc::UnboundedReceiver<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: Future<Output = Result<S>> + Send + 'static,
{
    let Some((io, response, leftover)) = open(&inner, connect, &request, &config).await else {
        return;
    };

    {
        let mut shared = inner.shared.lock();
        if !shared.transition(ConnectionState::Open) {
            return;
        }
        shared.protocol = response.protocol.unwrap_or_default();
        debug!(url = %inner.url, protocol = %shared.protocol, "connection open");
        shared.emit(Event::Open);
    }

    let mut codec = WebSocketCodec::new(io, Role::Client, &config);
    codec.prepend_read(&leftover);
    let driver = Driver {
        conn: Connection::from_codec(codec, &config),
        inner,
        commands,
        close_timeout: config.timeouts.close,
    };
    driver.run().await;
}

/// Connect and run the opening handshake within the handshake timeout.
///
/// Returns `None` when the connection ended before `Open`; the close event
/// has then already been emitted.
async fn open<S, F>(
    inner: &Inner,
    connect: F,
    request: &HandshakeRequest,
    config: &Config,
) -> Option<(S, HandshakeResponse, BytesMut)>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Future<Output = Result<S>>,
{
    let max_size = config.limits.max_handshake_size;
    let handshake = async {
        let mut io = connect.await?;
        let (response, leftover) = client_handshake(&mut io, request, max_size).await?;
        Ok::<_, Error>((io, response, leftover))
    };

    let result = tokio::select! {
        biased;
        () = inner.terminate.notified() => return None,
        result = tokio::time::timeout(config.timeouts.handshake, handshake) => result,
    };

    let error = match result {
        Ok(Ok(opened)) => return Some(opened),
        Ok(Err(err)) => err,
        Err(_) => Error::HandshakeTimeout,
    };
    warn!(url = %inner.url, error = %error, "opening handshake failed");
    inner.shared.lock().finish(Some(error), CloseEvent::abnormal());
    None
}

enum Step {
    Continue,
    Done,
}

/// Why a pending write was abandoned.
enum Interrupt {
    Terminated,
    CloseTimeout,
}

async fn close_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

/// Run `write` until it completes, the connection is terminated or the
/// close deadline passes.
///
/// A peer that stops reading can stall a write forever; dropping it here
/// lets the driver release the transport.
async fn interruptible<F>(inner: &Inner, write: F) -> std::result::Result<F::Output, Interrupt>
where
    F: Future,
{
    tokio::pin!(write);
    loop {
        let deadline = inner.shared.lock().close_deadline;
        tokio::select! {
            biased;
            () = inner.terminate.notified() => return Err(Interrupt::Terminated),
            () = close_timer(deadline) => return Err(Interrupt::CloseTimeout),
            () = inner.closing.notified() => {}
            output = &mut write => return Ok(output),
        }
    }
}

struct Driver<S> {
    conn: Connection<S>,
    inner: Arc<Inner>,
    commands: mpsc::UnboundedReceiver<Message>,
    close_timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Driver<S> {
    async fn run(mut self) {
        loop {
            let close_deadline = self.inner.shared.lock().close_deadline;

            let step = tokio::select! {
                biased;
                () = self.inner.terminate.notified() => self.interrupted(Interrupt::Terminated),
                Some(message) = self.commands.recv() => self.on_command(message).await,
                incoming = self.conn.recv() => self.on_incoming(incoming).await,
                () = close_timer(close_deadline) => self.interrupted(Interrupt::CloseTimeout),
            };

            if let Step::Done = step {
                return;
            }
        }
    }

    fn interrupted(&self, interrupt: Interrupt) -> Step {
        match interrupt {
            Interrupt::Terminated => debug!("transport severed"),
            Interrupt::CloseTimeout => {
                warn!("peer did not answer the close frame in time");
                self.inner
                    .shared
                    .lock()
                    .finish(Some(Error::CloseTimeout), CloseEvent::abnormal());
            }
        }
        Step::Done
    }

    async fn on_command(&mut self, message: Message) -> Step {
        if !self.conn.is_open() {
            debug!("close frame already exchanged, dropping command");
            return Step::Continue;
        }
        let sent = interruptible(&self.inner, self.conn.send(message)).await;
        match sent {
            Ok(Ok(())) => Step::Continue,
            Ok(Err(err)) => self.fail(err).await,
            Err(interrupt) => self.interrupted(interrupt),
        }
    }

    async fn on_incoming(&mut self, incoming: Result<Incoming>) -> Step {
        let incoming = match incoming {
            Ok(incoming) => incoming,
            Err(Error::ConnectionClosed(_)) => {
                debug!("transport closed without a close frame");
                self.inner.shared.lock().finish(None, CloseEvent::abnormal());
                return Step::Done;
            }
            Err(err) => return self.fail(err).await,
        };

        match incoming {
            Incoming::Message(message) => {
                let shared = self.inner.shared.lock();
                let data = match message {
                    AssembledMessage::Text(text) => MessageData::Text(text),
                    AssembledMessage::Binary(payload) => {
                        MessageData::Binary(shared.binary_type.materialize(payload))
                    }
                };
                shared.emit(Event::Message(data));
            }
            Incoming::Ping(payload) => {
                let flushed = interruptible(&self.inner, self.conn.flush_replies()).await;
                match flushed {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => return self.fail(err).await,
                    Err(interrupt) => return self.interrupted(interrupt),
                }
                let shared = self.inner.shared.lock();
                shared.emit(Event::Ping(shared.binary_type.materialize(payload)));
            }
            Incoming::Pong(payload) => {
                let shared = self.inner.shared.lock();
                shared.emit(Event::Pong(shared.binary_type.materialize(payload)));
            }
            Incoming::Close(_) => {
                let conn = &mut self.conn;
                let echo = tokio::time::timeout(self.close_timeout, async {
                    if let Err(err) = conn.flush_replies().await {
                        debug!(error = %err, "failed to echo close frame");
                    }
                    conn.shutdown().await;
                });
                if let Err(Interrupt::Terminated) = interruptible(&self.inner, echo).await {
                    return self.interrupted(Interrupt::Terminated);
                }
                let outcome = self.conn.close_handshake().outcome();
                self.inner.shared.lock().finish(None, outcome);
                return Step::Done;
            }
        }
        Step::Continue
    }

    /// End the connection because of `err`.
    ///
    /// Protocol violations get a best-effort close frame with the matching
    /// code; transport failures close with 1006.
    async fn fail(&mut self, err: Error) -> Step {
        let close = match err.close_code() {
            Some(code) => {
                warn!(error = %err, code, "protocol violation");
                let conn = &mut self.conn;
                let notify = tokio::time::timeout(self.close_timeout, async {
                    conn.fail(&err).await;
                    conn.shutdown().await;
                });
                if let Err(Interrupt::Terminated) = interruptible(&self.inner, notify).await {
                    return self.interrupted(Interrupt::Terminated);
                }
                CloseEvent::new(code, "", false)
            }
            None => {
                warn!(error = %err, "transport failure");
                CloseEvent::abnormal()
            }
        };
        self.inner.shared.lock().finish(Some(err), close);
        Step::Done
    }
}
