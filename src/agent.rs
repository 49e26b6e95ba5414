//! Pooled connection agent.
//!
//! One transport per client instance, created lazily on first request
//! and carrying the resolved TLS material. `quit()` drops the pool;
//! a later request would transparently build a fresh one.

use crate::error::{CouchLinkError, Result};
use crate::timeouts::CouchLinkTimeouts;
use crate::tls::TlsMaterial;
use std::sync::Mutex;

#[derive(Debug)]
pub(crate) struct ConnectionAgent {
    inner: Mutex<Option<reqwest::Client>>,
    material: TlsMaterial,
    max_sockets: Option<usize>,
    reject_unauthorized: bool,
    timeouts: CouchLinkTimeouts,
}

impl ConnectionAgent {
    pub(crate) fn new(
        material: TlsMaterial,
        max_sockets: Option<usize>,
        reject_unauthorized: bool,
        timeouts: CouchLinkTimeouts,
    ) -> Self {
        Self {
            inner: Mutex::new(None),
            material,
            max_sockets,
            reject_unauthorized,
            timeouts,
        }
    }

    /// The pooled transport, built on first use.
    ///
    /// `reqwest::Client` is a cheap handle around a shared pool, so the
    /// clone handed out here keeps using the same connections.
    pub(crate) fn client(&self) -> Result<reqwest::Client> {
        let mut guard = self.inner.lock().expect("agent lock poisoned");
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = self.build()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Release the pool. Idempotent.
    pub(crate) fn shutdown(&self) {
        let mut guard = self.inner.lock().expect("agent lock poisoned");
        if guard.take().is_some() {
            log::debug!("[COUCH_AGENT] Connection pool released");
        }
    }

    fn build(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(self.timeouts.connection_timeout);

        if let Some(max) = self.max_sockets {
            builder = builder.pool_max_idle_per_host(max);
        }
        if !self.reject_unauthorized {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(identity) = self.material.identity()? {
            builder = builder.identity(identity);
        }
        for ca in self.material.root_certificates()? {
            builder = builder.add_root_certificate(ca);
        }

        builder
            .build()
            .map_err(|e| CouchLinkError::ConfigurationError(e.to_string()))
    }
}
