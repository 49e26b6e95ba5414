//! Error types for couch-link client operations.
//!
//! Provides a single error enum covering all failure scenarios: typed
//! HTTP errors keyed by status code, classified transport failures,
//! and the two synthesised kinds (`BadGateway` for unparseable JSON
//! responses, `InternalServerError` for unparseable streamed rows).

use std::fmt;

/// Result type alias using [`CouchLinkError`]
pub type Result<T> = std::result::Result<T, CouchLinkError>;

/// Errors that can occur during couch-link operations.
///
/// # Examples
///
/// ```rust,no_run
/// use couch_link::{CouchLinkClient, RequestOptions};
///
/// # async fn example() -> couch_link::Result<()> {
/// let client = CouchLinkClient::builder()
///     .url("http://localhost:5984/contacts")
///     .build()?;
///
/// match client.request(RequestOptions::get("missing")).into_response().await {
///     Ok(response) => println!("Success: {:?}", response.status),
///     Err(e) if e.is_not_found() => eprintln!("No such document"),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub enum CouchLinkError {
    /// Server answered with an HTTP status >= 400
    HttpError {
        /// HTTP status code
        status: u16,
        /// Canonical reason or error body excerpt
        message: String,
    },

    /// Network-level failures (connection refused, reset, DNS, ...)
    NetworkError(String),

    /// Connection or request timeout
    TimeoutError(String),

    /// The server announced a JSON content-type but the body did not parse
    BadGateway(String),

    /// Synthesised for unparseable streamed rows and unclassifiable
    /// transport failures; carries the offending input
    InternalServerError(String),

    /// Invalid configuration (missing URL, reserved placeholder name,
    /// unreadable TLS material, malformed URL template)
    ConfigurationError(String),

    /// JSON serialization/deserialization errors outside the response path
    SerializationError(String),

    /// The request was aborted via [`RequestHandle::abort`](crate::RequestHandle::abort)
    Aborted,
}

impl CouchLinkError {
    /// Construct a typed HTTP error from a status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            message: message.into(),
        }
    }

    /// The HTTP status code, for `HttpError` (502 for `BadGateway`).
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError { status, .. } => Some(*status),
            Self::BadGateway(_) => Some(502),
            _ => None,
        }
    }

    /// True for HTTP 404 Not Found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpError { status: 404, .. })
    }

    /// True for HTTP 409 Conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::HttpError { status: 409, .. })
    }

    /// True for HTTP 412 Precondition Failed.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::HttpError { status: 412, .. })
    }

    /// True for failures that happened before a response arrived and
    /// are therefore safe to retry (when the body is replayable).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::TimeoutError(_))
    }
}

impl fmt::Display for CouchLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpError { status, message } => {
                write!(f, "HTTP error ({}): {}", status, message)
            },
            Self::NetworkError(msg) => write!(f, "Network error: {}", msg),
            Self::TimeoutError(msg) => write!(f, "Timeout: {}", msg),
            Self::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
            Self::InternalServerError(msg) => write!(f, "Internal error: {}", msg),
            Self::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::Aborted => write!(f, "Request aborted"),
        }
    }
}

impl std::error::Error for CouchLinkError {}

impl From<reqwest::Error> for CouchLinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TimeoutError(err.to_string())
        } else if err.is_connect() {
            Self::NetworkError(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            Self::HttpError {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_request() || err.is_body() {
            Self::NetworkError(err.to_string())
        } else {
            Self::InternalServerError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CouchLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CouchLinkError::NetworkError("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = CouchLinkError::http(404, "Object Not Found");
        assert_eq!(err.to_string(), "HTTP error (404): Object Not Found");

        let err = CouchLinkError::Aborted;
        assert_eq!(err.to_string(), "Request aborted");
    }

    #[test]
    fn test_status_predicates() {
        assert!(CouchLinkError::http(404, "missing").is_not_found());
        assert!(CouchLinkError::http(409, "conflict").is_conflict());
        assert!(CouchLinkError::http(412, "exists").is_precondition_failed());
        assert!(!CouchLinkError::http(500, "boom").is_not_found());
        assert_eq!(CouchLinkError::http(500, "boom").status(), Some(500));
        assert_eq!(CouchLinkError::BadGateway("bad json".into()).status(), Some(502));
        assert_eq!(CouchLinkError::Aborted.status(), None);
    }

    #[test]
    fn test_transport_classification() {
        assert!(CouchLinkError::NetworkError("reset".into()).is_transport());
        assert!(CouchLinkError::TimeoutError("deadline".into()).is_transport());
        assert!(!CouchLinkError::http(503, "unavailable").is_transport());
    }
}
