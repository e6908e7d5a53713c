use serde::{Serialize, Serializer};
use std::fmt;

/// Leading tokens of HTTP/1.x requests and responses.
pub const HTTP_TOKENS: [&[u8]; 11] = [
    b"GET",
    b"HEAD",
    b"POST",
    b"PUT",
    b"PATCH",
    b"DELETE",
    b"CONNECT",
    b"OPTIONS",
    b"TRACE",
    b"HTTP/1.0",
    b"HTTP/1.1",
];

/// Outcome of the first-token heuristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Http,
    /// The leading token, lossily decoded, of a payload that is not HTTP.
    NonHttpToken(String),
    NoSeparator,
    Empty,
}

impl Classification {
    pub fn is_http(&self) -> bool {
        matches!(self, Classification::Http)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Http => write!(f, "HTTP"),
            Classification::NonHttpToken(token) => write!(f, "non-HTTP token: {}", token),
            Classification::NoSeparator => write!(f, "no separator"),
            Classification::Empty => write!(f, "empty"),
        }
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decides whether `payload` looks like an HTTP message.
///
/// Only the bytes before the first ASCII whitespace are looked at, compared byte for byte
/// against [`HTTP_TOKENS`].
pub fn classify(payload: &[u8]) -> Classification {
    if payload.is_empty() {
        return Classification::Empty;
    }
    let Some(end) = payload.iter().position(|b| b.is_ascii_whitespace()) else {
        return Classification::NoSeparator;
    };
    let token = &payload[..end];
    if HTTP_TOKENS.contains(&token) {
        Classification::Http
    } else {
        Classification::NonHttpToken(String::from_utf8_lossy(token).into_owned())
    }
}
