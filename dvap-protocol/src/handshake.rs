//! WebSocket opening handshake (server side)
//!
//! Turns the raw bytes of an HTTP upgrade request into the response the
//! server must send back. The transform is stateless: nothing about the
//! connection is remembered between calls.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

/// Fixed GUID appended to the client key (RFC 6455 section 1.3)
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Header carrying the client nonce, lowercased for matching
const KEY_HEADER: &str = "sec-websocket-key:";

const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";
const INTERNAL_ERROR: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\n\r\n";

/// Reasons a request cannot be upgraded
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("request has no usable Sec-WebSocket-Key header")]
    MissingKey,

    #[error("request is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Response to a handshake request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeResponse {
    /// 101: the connection is upgraded
    SwitchingProtocols { accept: String },
    /// 400: no key was present
    BadRequest,
    /// 500: the request could not be decoded
    InternalError,
}

impl HandshakeResponse {
    /// Whether the connection should be promoted to an active WebSocket
    pub fn is_upgrade(&self) -> bool {
        matches!(self, Self::SwitchingProtocols { .. })
    }

    /// Raw HTTP response bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::SwitchingProtocols { accept } => format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {}\r\n\r\n",
                accept
            )
            .into_bytes(),
            Self::BadRequest => BAD_REQUEST.to_vec(),
            Self::InternalError => INTERNAL_ERROR.to_vec(),
        }
    }
}

impl From<HandshakeError> for HandshakeResponse {
    fn from(err: HandshakeError) -> Self {
        match err {
            HandshakeError::MissingKey => Self::BadRequest,
            HandshakeError::InvalidUtf8(_) => Self::InternalError,
        }
    }
}

/// Extract the `Sec-WebSocket-Key` value from a raw request
///
/// Header names match case-insensitively; the first matching line wins.
/// Only complete requests are understood: a key split across two reads is
/// not found.
pub fn parse_key(request: &[u8]) -> Result<&str, HandshakeError> {
    let text = std::str::from_utf8(request)?;

    let line = text
        .split("\r\n")
        .find(|line| {
            line.get(..KEY_HEADER.len())
                .map(|prefix| prefix.eq_ignore_ascii_case(KEY_HEADER))
                .unwrap_or(false)
        })
        .ok_or(HandshakeError::MissingKey)?;

    let key = line
        .split_once(':')
        .map(|(_, value)| value.trim())
        .unwrap_or_default();

    if key.is_empty() {
        return Err(HandshakeError::MissingKey);
    }
    Ok(key)
}

/// Compute `base64(SHA1(key + GUID))`
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Build the response for a raw handshake request
pub fn respond(request: &[u8]) -> HandshakeResponse {
    match parse_key(request) {
        Ok(key) => HandshakeResponse::SwitchingProtocols {
            accept: accept_key(key),
        },
        Err(err) => err.into(),
    }
}
