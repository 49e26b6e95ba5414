//! Response envelope and cache validator extraction.

use bytes::Bytes;
use reqwest::header::HeaderMap;
use serde_json::Value as JsonValue;

/// Cache validator headers copied verbatim from the response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheHeaders {
    /// `Last-Modified`
    pub last_modified: Option<String>,
    /// `ETag`
    pub etag: Option<String>,
    /// `Expires`
    pub expires: Option<String>,
    /// `Cache-Control`
    pub cache_control: Option<String>,
    /// `Content-Type`
    pub content_type: Option<String>,
}

/// Conditional-request outcome plus the validator headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheInfo {
    /// True when the server answered 304 Not Modified.
    pub not_modified: bool,
    /// Validator headers for the caller's own conditional requests.
    pub headers: CacheHeaders,
}

impl CacheInfo {
    /// Extract cache validators from a response head.
    pub(crate) fn extract(status: u16, headers: &HeaderMap) -> Self {
        let pick = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        Self {
            not_modified: status == 304,
            headers: CacheHeaders {
                last_modified: pick("last-modified"),
                etag: pick("etag"),
                expires: pick("expires"),
                cache_control: pick("cache-control"),
                content_type: pick("content-type"),
            },
        }
    }
}

/// The response head, delivered as a streaming event before any body
/// bytes are consumed.
#[derive(Debug, Clone, Default)]
pub struct ResponseHead {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Conditional-request outcome and validator headers.
    pub cache_info: CacheInfo,
}

/// The HTTP response augmented with cache info and a parsed JSON body.
///
/// `json` is populated when the content-type is JSON-shaped
/// (`application/json` or any `+json` suffix). `body` always carries
/// the raw bytes in buffered mode; it is empty for 304 responses and
/// for streamed requests (rows were delivered as events instead).
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Conditional-request outcome and validator headers.
    pub cache_info: CacheInfo,
    /// Raw body bytes.
    pub body: Bytes,
    /// Parsed body for JSON-shaped content-types.
    pub json: Option<JsonValue>,
}

/// True when a content-type announces JSON (`application/json` or any
/// `+json` media type).
pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
