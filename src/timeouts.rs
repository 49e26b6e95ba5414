//! Timeout configuration for couch-link client operations.

use std::time::Duration;

/// Timeouts applied to the pooled HTTP transport.
///
/// # Examples
///
/// ```rust
/// use couch_link::CouchLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = CouchLinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = CouchLinkTimeouts::builder()
///     .connection_timeout(Duration::from_secs(60))
///     .request_timeout(Duration::from_secs(120))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = CouchLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct CouchLinkTimeouts {
    /// Timeout for establishing connections (TCP + TLS handshake).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// End-to-end timeout for one buffered request.
    /// Streaming requests are exempt; a slow view can legitimately
    /// trickle rows for longer than any fixed deadline.
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl Default for CouchLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl CouchLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> CouchLinkTimeoutsBuilder {
        CouchLinkTimeoutsBuilder::new()
    }

    /// Timeouts optimized for fast local development.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Timeouts optimized for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Builder for creating custom [`CouchLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct CouchLinkTimeoutsBuilder {
    timeouts: CouchLinkTimeouts,
}

impl CouchLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: CouchLinkTimeouts::default(),
        }
    }

    /// Set the connection timeout (TCP + TLS handshake).
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the end-to-end request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.request_timeout = timeout;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> CouchLinkTimeouts {
        self.timeouts
    }
}
