//! Request lifecycle event handlers.
//!
//! Provides callback-based hooks for monitoring the request pipeline:
//!
//! - [`on_request`](EventHandlers::on_request): fired when a request is dispatched
//! - [`on_successful_request`](EventHandlers::on_successful_request): fired once per
//!   request invocation that produced a response
//! - [`on_failed_request`](EventHandlers::on_failed_request): fired once per request
//!   invocation that ended in an error
//!
//! Exactly one of the latter two fires per logical request. Useful for
//! logging and metrics.
//!
//! # Example
//!
//! ```rust,no_run
//! use couch_link::{CouchLinkClient, EventHandlers};
//!
//! # fn example() -> couch_link::Result<()> {
//! let handlers = EventHandlers::new()
//!     .on_request(|req| {
//!         println!("{} {}", req.method, req.url);
//!     })
//!     .on_failed_request(|failure| {
//!         eprintln!("{} failed: {}", failure.url, failure.error);
//!     });
//!
//! let client = CouchLinkClient::builder()
//!     .url("http://localhost:5984/contacts")
//!     .event_handlers(handlers)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::error::CouchLinkError;
use reqwest::Method;
use std::fmt;
use std::sync::Arc;

/// The dispatched request, as seen by `on_request`.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// HTTP method.
    pub method: Method,
    /// Fully expanded target URL.
    pub url: String,
}

/// Payload of `on_successful_request`.
#[derive(Debug, Clone)]
pub struct SuccessfulRequest {
    /// Fully expanded target URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Response status code.
    pub status: u16,
}

/// Payload of `on_failed_request`.
#[derive(Debug, Clone)]
pub struct FailedRequest {
    /// Fully expanded target URL.
    pub url: String,
    /// HTTP method.
    pub method: Method,
    /// Response status, when the failure came from an HTTP error.
    pub status: Option<u16>,
    /// The terminal error.
    pub error: CouchLinkError,
    /// Retry budget remaining when the request gave up.
    pub num_retries_left: u32,
}

/// Type alias for the on_request callback.
pub type OnRequestCallback = Arc<dyn Fn(RequestInfo) + Send + Sync>;

/// Type alias for the on_successful_request callback.
pub type OnSuccessCallback = Arc<dyn Fn(SuccessfulRequest) + Send + Sync>;

/// Type alias for the on_failed_request callback.
pub type OnFailureCallback = Arc<dyn Fn(FailedRequest) + Send + Sync>;

/// Request lifecycle event handlers.
///
/// All handlers are optional. The builder pattern makes it easy to
/// register only the handlers you need. Handlers are `Send + Sync` so
/// they work with the async tokio runtime.
#[derive(Clone, Default)]
pub struct EventHandlers {
    /// Called when a request is dispatched (including retries' first dispatch only).
    pub(crate) on_request: Option<OnRequestCallback>,

    /// Called once per request invocation that produced a response.
    pub(crate) on_successful_request: Option<OnSuccessCallback>,

    /// Called once per request invocation that ended in an error.
    pub(crate) on_failed_request: Option<OnFailureCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_request", &self.on_request.is_some())
            .field("on_successful_request", &self.on_successful_request.is_some())
            .field("on_failed_request", &self.on_failed_request.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when a request is dispatched.
    pub fn on_request(mut self, f: impl Fn(RequestInfo) + Send + Sync + 'static) -> Self {
        self.on_request = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked once per successful request invocation.
    pub fn on_successful_request(
        mut self,
        f: impl Fn(SuccessfulRequest) + Send + Sync + 'static,
    ) -> Self {
        self.on_successful_request = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked once per failed request invocation.
    pub fn on_failed_request(
        mut self,
        f: impl Fn(FailedRequest) + Send + Sync + 'static,
    ) -> Self {
        self.on_failed_request = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_request.is_some()
            || self.on_successful_request.is_some()
            || self.on_failed_request.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_request(&self, info: RequestInfo) {
        if let Some(cb) = &self.on_request {
            cb(info);
        }
    }

    pub(crate) fn emit_success(&self, info: SuccessfulRequest) {
        if let Some(cb) = &self.on_successful_request {
            cb(info);
        }
    }

    pub(crate) fn emit_failure(&self, info: FailedRequest) {
        if let Some(cb) = &self.on_failed_request {
            cb(info);
        }
    }
}
