use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::codec::WebSocketCodec;
use crate::config::{Config, Limits};
use crate::connection::close::CloseHandshake;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::assembler::{AssembledMessage, MessageAssembler};
use crate::protocol::{Frame, OpCode};

/// What [`Connection::recv`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete data message.
    Message(AssembledMessage),
    /// A ping; the matching pong is queued.
    Ping(Vec<u8>),
    /// A pong.
    Pong(Vec<u8>),
    /// The peer's close frame (`None` for an empty payload).
    Close(Option<CloseFrame>),
}

/// Message-level WebSocket engine over an established byte stream.
///
/// `Connection` turns frames into messages and back: it fragments outgoing
/// data, reassembles incoming fragments, answers pings and runs the close
/// handshake. It knows nothing about events or the caller-facing state; the
/// client driver builds those on top.
///
/// [`recv`](Self::recv) never writes. Replies it decides on (pongs, the
/// close echo) are queued and go out with
/// [`flush_replies`](Self::flush_replies), which keeps `recv` cancel safe
/// inside `tokio::select!`.
///
/// ## Example
///
/// ```rust,ignore
/// use wsengine::{Config, Message, Role};
/// use wsengine::connection::{Connection, Incoming};
///
/// let mut conn = Connection::new(stream, Role::Client, &Config::new());
/// conn.send(Message::text("Hello")).await?;
/// while let Incoming::Message(msg) = conn.recv().await? {
///     conn.flush_replies().await?;
///     println!("Received: {msg:?}");
/// }
/// ```
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    state: ConnectionState,
    assembler: MessageAssembler,
    close: CloseHandshake,
    replies: VecDeque<Frame>,
    fragment_size: usize,
    limits: Limits,
}

impl<T> Connection<T> {
    /// Wrap a stream on which the opening handshake already completed.
    pub fn new(io: T, role: Role, config: &Config) -> Self {
        Self::from_codec(WebSocketCodec::new(io, role, config), config)
    }

    /// Wrap an existing codec, keeping whatever it has buffered.
    pub fn from_codec(codec: WebSocketCodec<T>, config: &Config) -> Self {
        Self {
            codec,
            state: ConnectionState::Open,
            assembler: MessageAssembler::new(config.limits.clone()),
            close: CloseHandshake::new(),
            replies: VecDeque::new(),
            fragment_size: config.fragment_size,
            limits: config.limits.clone(),
        }
    }

    /// Frame-level state: `Open`, `Closing` after our close frame, `Closed`
    /// once the peer's close frame arrived.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn role(&self) -> Role {
        self.codec.role()
    }

    pub fn close_handshake(&self) -> &CloseHandshake {
        &self.close
    }

    /// Whether pongs or a close echo are waiting for `flush_replies`.
    pub fn has_pending_replies(&self) -> bool {
        !self.replies.is_empty()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Send a message.
    ///
    /// Text and binary payloads longer than the configured fragment size go
    /// out as a first frame plus continuation frames. `Message::Close`
    /// behaves like [`close`](Self::close).
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` once a close frame has been sent
    /// - `Error::ControlFrameTooLarge` for ping/pong payloads over 125 bytes
    /// - `Error::MessageTooLarge` if the message exceeds `limits.max_message_size`
    /// - I/O errors from the underlying stream
    pub async fn send(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Text(text) => self.send_data(OpCode::Text, text.as_bytes()).await,
            Message::Binary(data) => self.send_data(OpCode::Binary, &data).await,
            Message::Ping(data) => self.send_control(Frame::ping(data)).await,
            Message::Pong(data) => self.send_control(Frame::pong(data)).await,
            Message::Close(frame) => self.close(frame).await,
        }
    }

    async fn send_data(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        self.limits.check_message_size(payload.len())?;

        for frame in MessageFragmenter::new(payload, opcode, self.fragment_size) {
            self.codec.write_frame(&frame).await?;
        }
        self.codec.flush().await
    }

    async fn send_control(&mut self, frame: Frame) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(None));
        }
        frame.validate()?;
        self.codec.write_frame(&frame).await?;
        self.codec.flush().await
    }

    /// Start (or answer) the close handshake.
    ///
    /// `None` sends an empty close payload. Does nothing if a close frame
    /// was already sent.
    ///
    /// ## Errors
    ///
    /// - `Error::InvalidCloseCode` / `Error::CloseReasonTooLong` for an
    ///   unsendable close frame
    /// - I/O errors from the underlying stream
    pub async fn close(&mut self, frame: Option<CloseFrame>) -> Result<()> {
        if self.close.is_sent() {
            return Ok(());
        }
        if let Some(f) = &frame {
            f.validate()?;
        }

        let wire = match &frame {
            Some(f) => Frame::close(Some(f.code.as_u16()), &f.reason),
            None => Frame::close(None, ""),
        };
        self.close.on_send(frame);
        self.state = if self.close.is_received() {
            ConnectionState::Closed
        } else {
            ConnectionState::Closing
        };
        self.codec.write_frame(&wire).await?;
        self.codec.flush().await
    }

    /// Best-effort close after a protocol violation.
    ///
    /// Sends a close frame carrying the error's close code, if it has one.
    pub async fn fail(&mut self, err: &Error) {
        if let Some(code) = err.close_code() {
            let frame = CloseFrame::new(CloseCode::from_u16(code), "");
            if let Err(e) = self.close(Some(frame)).await {
                debug!(error = %e, "failed to send close frame");
            }
        }
    }

    /// Receive the next message, control payload or close frame.
    ///
    /// Cancel safe: dropping the future before it completes loses no data.
    ///
    /// ## Errors
    ///
    /// - `Error::ConnectionClosed` at EOF or after the close exchange
    /// - protocol errors (masking, opcodes, fragmentation, UTF-8, limits,
    ///   malformed close payloads)
    /// - I/O errors from the underlying stream
    pub async fn recv(&mut self) -> Result<Incoming> {
        if self.close.is_received() {
            return Err(Error::ConnectionClosed(None));
        }

        loop {
            let frame = self.codec.read_frame().await?;

            match frame.opcode {
                OpCode::Ping => {
                    if !self.close.is_sent() {
                        self.replies.push_back(Frame::pong(frame.payload().to_vec()));
                    }
                    return Ok(Incoming::Ping(frame.into_payload()));
                }
                OpCode::Pong => return Ok(Incoming::Pong(frame.into_payload())),
                OpCode::Close => {
                    let parsed = CloseFrame::parse(frame.payload())?;
                    debug!(
                        code = parsed.as_ref().map(|f| f.code.as_u16()),
                        "close frame received"
                    );
                    if let Some(echo) = self.close.on_receive(parsed.clone()) {
                        self.replies.push_back(echo);
                    }
                    self.assembler.reset();
                    self.state = ConnectionState::Closed;
                    return Ok(Incoming::Close(parsed));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(message) = self.assembler.push(frame)? {
                        return Ok(Incoming::Message(message));
                    }
                }
            }
        }
    }

    /// Write queued pongs and the close echo.
    ///
    /// ## Errors
    ///
    /// I/O errors from the underlying stream.
    pub async fn flush_replies(&mut self) -> Result<()> {
        if self.replies.is_empty() {
            return Ok(());
        }
        while let Some(frame) = self.replies.pop_front() {
            self.codec.write_frame(&frame).await?;
        }
        self.codec.flush().await
    }

    /// Shut down the underlying stream, ignoring errors.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.codec.shutdown().await {
            debug!(error = %e, "shutdown failed");
        }
    }
}
