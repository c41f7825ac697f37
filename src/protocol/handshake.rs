//! Opening handshake (RFC 6455 Section 4).
//!
//! The client side builds the upgrade request and verifies the server's
//! `101 Switching Protocols` answer. The server side (request parsing and
//! response writing) is kept for in-process peers.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Only protocol version this crate speaks.
pub const WS_VERSION: u8 = 13;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Parse header lines into a map keyed by lowercase name.
///
/// Headers listed in `unique` may appear at most once.
fn parse_headers<'a, I>(lines: I, unique: &[&str]) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::InvalidHandshake(format!("Malformed header line: {line}")));
        };
        let name = name.trim().to_ascii_lowercase();
        if unique.contains(&name.as_str()) && headers.contains_key(&name) {
            return Err(Error::InvalidHandshake(format!("Duplicate header: {name}")));
        }
        headers
            .entry(name)
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(value.trim());
            })
            .or_insert_with(|| value.trim().to_string());
    }

    Ok(headers)
}

/// Reject header values that could split the request.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

fn header_has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsengine::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns `Error::Io` if the operating system's random source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Offset just past the blank line ending an HTTP head, if present.
#[must_use]
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// An opening handshake request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request target: path plus query (e.g. `/chat?room=1`).
    pub path: String,
    /// The Host header value.
    pub host: String,
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    /// The Sec-WebSocket-Version (should be 13).
    pub version: u8,
    /// The Origin header value.
    pub origin: Option<String>,
    /// Requested subprotocols, in preference order.
    pub protocols: Vec<String>,
    /// Requested extensions.
    pub extensions: Vec<String>,
    /// Additional headers sent verbatim.
    pub headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    /// Build the request a client sends to open `url`.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` if the URL has no host
    /// - `Error::InvalidHeaderValue` if the origin, a protocol or an extra
    ///   header contains CR/LF, or a protocol is empty or duplicated
    /// - `Error::Io` if no random key could be generated
    pub fn for_url(url: &Url, config: &Config) -> Result<Self> {
        Self::with_key(url, config, generate_key()?)
    }

    /// Same as [`for_url`](Self::for_url) with a caller-chosen key.
    ///
    /// # Errors
    ///
    /// See [`for_url`](Self::for_url).
    pub fn with_key(url: &Url, config: &Config, key: String) -> Result<Self> {
        let host_name = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{url}: missing host")))?;
        let host = match url.port() {
            Some(port) => format!("{host_name}:{port}"),
            None => host_name.to_string(),
        };

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        if let Some(origin) = &config.origin {
            validate_header_value("Origin", origin)?;
        }
        for (i, protocol) in config.protocols.iter().enumerate() {
            validate_header_value("Sec-WebSocket-Protocol", protocol)?;
            if protocol.is_empty()
                || protocol.contains(',')
                || config.protocols[..i].contains(protocol)
            {
                return Err(Error::InvalidHeaderValue {
                    header: "Sec-WebSocket-Protocol".into(),
                    reason: format!("invalid or duplicated subprotocol {protocol:?}"),
                });
            }
        }
        for (name, value) in &config.headers {
            validate_header_value(name, name)?;
            validate_header_value(name, value)?;
        }

        Ok(Self {
            path,
            host,
            key,
            version: WS_VERSION,
            origin: config.origin.clone(),
            protocols: config.protocols.clone(),
            extensions: Vec::new(),
            headers: config.headers.clone(),
        })
    }

    /// Append the HTTP request to `buf`.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(format!("Sec-WebSocket-Version: {}\r\n", self.version).as_bytes());
        if let Some(origin) = &self.origin {
            buf.extend_from_slice(format!("Origin: {origin}\r\n").as_bytes());
        }
        if !self.protocols.is_empty() {
            buf.extend_from_slice(
                format!("Sec-WebSocket-Protocol: {}\r\n", self.protocols.join(", ")).as_bytes(),
            );
        }
        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.extend_from_slice(b"\r\n");
    }

    /// Parse a handshake request from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8 or the request line is malformed.
    /// - The method is not `GET` or the version is not `HTTP/1.1`.
    /// - `Upgrade`, `Connection`, `Host`, `Sec-WebSocket-Key` or
    ///   `Sec-WebSocket-Version` is missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty request".into()))?;
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        let [method, target, version] = parts[..] else {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        };
        if method != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {method}"
            )));
        }
        if version != "HTTP/1.1" {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.1, got {version}"
            )));
        }

        let mut headers = parse_headers(
            lines,
            &[
                "host",
                "upgrade",
                "connection",
                "sec-websocket-key",
                "sec-websocket-version",
            ],
        )?;
        let mut take = |name: &str| {
            headers
                .remove(name)
                .ok_or_else(|| Error::InvalidHandshake(format!("Missing {name} header")))
        };

        let upgrade = take("upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid upgrade header: {upgrade}"
            )));
        }
        let connection = take("connection")?;
        if !header_has_token(&connection, "upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid connection header: {connection}"
            )));
        }
        let host = take("host")?;
        let key = take("sec-websocket-key")?;
        let version_str = take("sec-websocket-version")?;
        let version = version_str
            .parse()
            .map_err(|_| Error::InvalidHandshake(format!("Invalid version: {version_str}")))?;

        let origin = headers.remove("origin");
        let protocols = headers
            .remove("sec-websocket-protocol")
            .map(|p| split_list(&p))
            .unwrap_or_default();
        let extensions = headers
            .remove("sec-websocket-extensions")
            .map(|e| split_list(&e))
            .unwrap_or_default();

        let mut rest: Vec<(String, String)> = headers.into_iter().collect();
        rest.sort();

        Ok(Self {
            path: target.to_string(),
            host,
            key,
            version,
            origin,
            protocols,
            extensions,
            headers: rest,
        })
    }

    /// Validate a parsed request according to RFC 6455.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] for a version other than 13, a
    /// key that is not 16 base64-encoded bytes, or an empty host.
    pub fn validate(&self) -> Result<()> {
        if self.version != WS_VERSION {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {} (expected 13)",
                self.version
            )));
        }
        match BASE64.decode(&self.key) {
            Ok(decoded) if decoded.len() == 16 => {}
            Ok(decoded) => {
                return Err(Error::InvalidHandshake(format!(
                    "Sec-WebSocket-Key must be 16 bytes, got {}",
                    decoded.len()
                )));
            }
            Err(_) => {
                return Err(Error::InvalidHandshake(
                    "Invalid Sec-WebSocket-Key: not valid Base64".into(),
                ));
            }
        }
        if self.host.is_empty() {
            return Err(Error::InvalidHandshake("Host header cannot be empty".into()));
        }
        Ok(())
    }

    /// Parse a request head after checking it against `max_size`.
    ///
    /// # Errors
    ///
    /// - `Error::HandshakeTooLarge` if data exceeds `max_size`
    /// - Other handshake errors as per [`parse`](Self::parse)
    pub fn parse_with_limit(data: &[u8], max_size: usize) -> Result<Self> {
        if data.len() > max_size {
            return Err(Error::HandshakeTooLarge {
                size: data.len(),
                max: max_size,
            });
        }
        Self::parse(data)
    }
}

/// A `101 Switching Protocols` handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
    /// The selected Sec-WebSocket-Protocol.
    pub protocol: Option<String>,
    /// The negotiated Sec-WebSocket-Extensions.
    pub extensions: Vec<String>,
}

impl HandshakeResponse {
    /// Accept `req`, selecting its first requested subprotocol.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
            protocol: req.protocols.first().cloned(),
            extensions: Vec::new(),
        }
    }

    /// Write the HTTP response to a buffer.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if protocol or extensions contain CR/LF.
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());

        if let Some(proto) = &self.protocol {
            validate_header_value("Sec-WebSocket-Protocol", proto)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {proto}\r\n").as_bytes());
        }
        for ext in &self.extensions {
            validate_header_value("Sec-WebSocket-Extensions", ext)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Extensions: {ext}\r\n").as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Parse a handshake response from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - The data is not valid UTF-8 or the status line is missing.
    /// - The status is not `101`.
    /// - `Upgrade`, `Connection` or `Sec-WebSocket-Accept` is missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;
        let mut parts = status_line.splitn(3, ' ');
        let (Some(version), Some(status)) = (parts.next(), parts.next()) else {
            return Err(Error::InvalidHandshake(format!(
                "Invalid status line: {status_line}"
            )));
        };
        if !version.starts_with("HTTP/1.") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid status line: {status_line}"
            )));
        }
        if status != "101" {
            return Err(Error::InvalidHandshake(format!(
                "Unexpected server response: {status}"
            )));
        }

        let headers = parse_headers(
            lines,
            &["upgrade", "sec-websocket-accept", "sec-websocket-protocol"],
        )?;

        let upgrade = headers
            .get("upgrade")
            .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {upgrade}"
            )));
        }

        let connection = headers.get("connection").ok_or_else(|| {
            Error::InvalidHandshake("Missing Connection header in response".into())
        })?;
        if !header_has_token(connection, "upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {connection}"
            )));
        }

        let accept = headers
            .get("sec-websocket-accept")
            .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?
            .clone();
        let protocol = headers.get("sec-websocket-protocol").cloned();
        let extensions = headers
            .get("sec-websocket-extensions")
            .map(|e| split_list(e))
            .unwrap_or_default();

        Ok(Self {
            accept,
            protocol,
            extensions,
        })
    }

    /// Check this response answers `req`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the accept key does not match,
    /// the server picked a subprotocol that was not offered (or one when
    /// none was offered), or negotiated any extension.
    pub fn verify(&self, req: &HandshakeRequest) -> Result<()> {
        if self.accept != compute_accept_key(&req.key) {
            return Err(Error::InvalidHandshake(
                "Invalid Sec-WebSocket-Accept header".into(),
            ));
        }
        match &self.protocol {
            Some(protocol) if req.protocols.is_empty() => {
                return Err(Error::InvalidHandshake(format!(
                    "Server sent a subprotocol but none was requested: {protocol}"
                )));
            }
            Some(protocol) if !req.protocols.contains(protocol) => {
                return Err(Error::InvalidHandshake(format!(
                    "Server sent an invalid subprotocol: {protocol}"
                )));
            }
            None if !req.protocols.is_empty() => {
                return Err(Error::InvalidHandshake(
                    "Server sent no subprotocol".into(),
                ));
            }
            _ => {}
        }
        if !self.extensions.is_empty() {
            return Err(Error::InvalidHandshake(format!(
                "Server indicated an extension that was not requested: {}",
                self.extensions.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(feature = "async-tokio")]
mod io {
    use bytes::BytesMut;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    use super::{HandshakeRequest, HandshakeResponse, find_head_end};
    use crate::error::{Error, Result};

    /// Read an HTTP head of at most `max_size` bytes.
    ///
    /// Returns the head and any bytes that arrived after it.
    async fn read_head<S>(io: &mut S, max_size: usize) -> Result<(Vec<u8>, BytesMut)>
    where
        S: AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(1024);
        loop {
            if let Some(end) = find_head_end(&buf) {
                if end > max_size {
                    return Err(Error::HandshakeTooLarge {
                        size: end,
                        max: max_size,
                    });
                }
                let head = buf.split_to(end).to_vec();
                return Ok((head, buf));
            }
            if buf.len() > max_size {
                return Err(Error::HandshakeTooLarge {
                    size: buf.len(),
                    max: max_size,
                });
            }
            if io.read_buf(&mut buf).await? == 0 {
                return Err(Error::InvalidHandshake(
                    "Connection closed during handshake".into(),
                ));
            }
        }
    }

    /// Run the client half of the opening handshake over `io`.
    ///
    /// Returns the verified response and any frame bytes the server sent
    /// right after it.
    ///
    /// # Errors
    ///
    /// Transport failures, oversized or malformed responses, and responses
    /// that fail [`HandshakeResponse::verify`].
    pub async fn client_handshake<S>(
        io: &mut S,
        request: &HandshakeRequest,
        max_size: usize,
    ) -> Result<(HandshakeResponse, BytesMut)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut out = Vec::with_capacity(256);
        request.write(&mut out);
        io.write_all(&out).await?;
        io.flush().await?;

        let (head, leftover) = read_head(io, max_size).await?;
        let response = HandshakeResponse::parse(&head)?;
        response.verify(request)?;
        Ok((response, leftover))
    }

    /// Run the server half of the opening handshake over `io`.
    ///
    /// Accepts the first requested subprotocol and no extensions.
    ///
    /// # Errors
    ///
    /// Transport failures and invalid or oversized requests.
    pub async fn server_handshake<S>(
        io: &mut S,
        max_size: usize,
    ) -> Result<(HandshakeRequest, BytesMut)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (head, leftover) = read_head(io, max_size).await?;
        let request = HandshakeRequest::parse(&head)?;
        request.validate()?;

        let mut out = Vec::with_capacity(256);
        HandshakeResponse::from_request(&request).write(&mut out)?;
        io.write_all(&out).await?;
        io.flush().await?;
        Ok((request, leftover))
    }
}

#[cfg(feature = "async-tokio")]
pub use io::{client_handshake, server_handshake};
