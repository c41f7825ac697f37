use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::config::Config;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::mask::generate_mask;
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader};

/// Frame-level reader/writer over an async byte stream.
///
/// Outgoing frames are masked with a fresh key when the role requires it.
/// Incoming headers are validated before their payload is buffered.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    role: Role,
    validator: FrameValidator,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, role: Role, config: &Config) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            role,
            validator: FrameValidator::new(role, config.limits.clone()),
        }
    }

    /// Queue bytes that were read from the stream before the codec took
    /// over, such as frames that arrived with the handshake response.
    pub fn prepend_read(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut buf = BytesMut::with_capacity(bytes.len() + self.read_buf.len());
        buf.extend_from_slice(bytes);
        buf.extend_from_slice(&self.read_buf);
        self.read_buf = buf;
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Bytes received but not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    fn try_decode(&mut self) -> Result<Option<Frame>> {
        let header = match FrameHeader::parse(&self.read_buf) {
            Ok(header) => header,
            Err(Error::IncompleteFrame { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.validator.validate(&header)?;

        match Frame::parse_with_header(&self.read_buf, &header) {
            Ok((frame, consumed)) => {
                self.read_buf.advance(consumed);
                Ok(Some(frame))
            }
            Err(Error::IncompleteFrame { needed }) => {
                self.read_buf.reserve(needed);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next frame.
    ///
    /// Cancel safe: partial input stays buffered, so dropping the future
    /// before it completes loses no data.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed(None)` when the stream reaches EOF
    /// - validation and parse errors for malformed frames
    /// - I/O errors from the underlying stream
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.try_decode()? {
                trace!(
                    role = %self.role,
                    opcode = %frame.opcode,
                    fin = frame.fin,
                    len = frame.payload().len(),
                    "frame received"
                );
                return Ok(frame);
            }

            if self.io.read_buf(&mut self.read_buf).await? == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    /// Encode and write one frame, masking it if this side is a client.
    ///
    /// # Errors
    ///
    /// I/O errors from the underlying stream.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mask = self.role.must_mask().then(generate_mask);

        self.write_buf.clear();
        frame.encode(&mut self.write_buf, mask);
        trace!(
            role = %self.role,
            opcode = %frame.opcode,
            fin = frame.fin,
            len = frame.payload().len(),
            "frame sent"
        );
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
