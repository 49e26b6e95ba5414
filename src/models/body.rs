//! Request body variants.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde_json::Value as JsonValue;
use std::fmt;

/// Boxed byte stream usable as a non-replayable request body.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A request body.
///
/// The variant decides serialisation and header handling: only `Json`
/// sets a `Content-Type`, and `Stream` bodies clamp the retry budget to
/// zero because their content cannot be replayed.
pub enum Body {
    /// Raw bytes sent as-is.
    Bytes(Bytes),
    /// UTF-8 text sent as-is.
    Text(String),
    /// Serialised to JSON; sets `Content-Type: application/json`.
    Json(JsonValue),
    /// Streamed; not replayable, disables retries.
    Stream(ByteStream),
}

impl Body {
    /// Wrap a byte stream.
    pub fn stream(s: ByteStream) -> Self {
        Self::Stream(s)
    }

    /// True for the non-replayable variant.
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Text(t) => f.debug_tuple("Text").field(&t.len()).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Stream(_) => f.debug_tuple("Stream").field(&"<stream>").finish(),
        }
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Self::Bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(b))
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<JsonValue> for Body {
    fn from(v: JsonValue) -> Self {
        Self::Json(v)
    }
}
