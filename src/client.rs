//! Main couch-link client with builder pattern.
//!
//! Provides the primary interface for talking to CouchDB-style
//! servers: the general request pipe, the view-query helpers, and
//! database initialisation.

use crate::agent::ConnectionAgent;
use crate::design::spawn_view_query;
use crate::error::{CouchLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::models::{
    Body, DesignDocument, PlaceholderValue, RequestOptions, TemporaryView,
    ViewQuery,
};
use crate::request::{spawn_request, PrepareRequestHook, RequestDescriptor};
use crate::streaming::RequestHandle;
use crate::template::TemplateEngine;
use crate::timeouts::CouchLinkTimeouts;
use crate::tls::{TlsItem, TlsMaterial, TlsOptions};
use reqwest::Method;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

/// Placeholder names that collide with client configuration and
/// operations; binding one fails construction.
const RESERVED_PLACEHOLDER_NAMES: &[&str] = &[
    "request",
    "query_design_document",
    "query_temporary_view",
    "init",
    "quit",
    "url",
    "urls",
    "design_document",
    "fingerprint",
    "num_retries",
    "trust_view_etags",
    "max_sockets",
    "cert",
    "key",
    "ca",
    "reject_unauthorized",
    "timeouts",
    "event_handlers",
    "hostname",
];

/// Shared state behind one logical database binding.
pub(crate) struct ClientInner {
    /// Base URLs, trailing slashes stripped; immutable after build.
    pub(crate) urls: Vec<String>,
    /// Monotone round-robin cursor over `urls`.
    pub(crate) cursor: AtomicUsize,
    pub(crate) num_retries: u32,
    pub(crate) trust_view_etags: bool,
    pub(crate) placeholders: HashMap<String, PlaceholderValue>,
    pub(crate) template: TemplateEngine,
    pub(crate) agent: ConnectionAgent,
    pub(crate) timeouts: CouchLinkTimeouts,
    pub(crate) event_handlers: EventHandlers,
    pub(crate) prepare_hook: Option<PrepareRequestHook>,
    pub(crate) design_document: Option<DesignDocument>,
    /// Lowercase hex MD5 of the design document, derived at build.
    pub(crate) fingerprint: Option<String>,
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner")
            .field("urls", &self.urls)
            .field("cursor", &self.cursor)
            .field("num_retries", &self.num_retries)
            .field("trust_view_etags", &self.trust_view_etags)
            .field("placeholders", &self.placeholders.keys().collect::<Vec<_>>())
            .field("template", &self.template)
            .field("agent", &self.agent)
            .field("timeouts", &self.timeouts)
            .field("event_handlers", &self.event_handlers)
            .field("prepare_hook", &self.prepare_hook.is_some())
            .field("design_document", &self.design_document)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Main couch-link client.
///
/// One instance per logical database binding. Cloning is cheap and
/// clones share the connection pool and the round-robin cursor. Use
/// [`CouchLinkClientBuilder`] to construct instances.
///
/// # Examples
///
/// ```rust,no_run
/// use couch_link::{CouchLinkClient, RequestOptions};
///
/// # async fn example() -> couch_link::Result<()> {
/// let client = CouchLinkClient::builder()
///     .url("http://localhost:5984/contacts")
///     .num_retries(2)
///     .build()?;
///
/// client.init().await?;
/// let response = client
///     .request(RequestOptions::get("_all_docs"))
///     .into_response()
///     .await?;
/// println!("{:?}", response.json);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CouchLinkClient {
    inner: Arc<ClientInner>,
}

impl CouchLinkClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> CouchLinkClientBuilder {
        CouchLinkClientBuilder::new()
    }

    /// Dispatch one logical request through the pipeline.
    ///
    /// Returns immediately with the streaming handle; consume it with
    /// [`next`](RequestHandle::next) or drive it to completion with
    /// [`into_response`](RequestHandle::into_response). Errors during
    /// preparation arrive as the handle's terminal `Error` event.
    pub fn request(&self, options: RequestOptions) -> RequestHandle {
        spawn_request(self.inner.clone(), options)
    }

    /// Query a view from the configured design document.
    ///
    /// A first-response NotFound installs the document and retries the
    /// query once; see the crate docs for the recovery contract.
    pub fn query_design_document(&self, query: ViewQuery) -> RequestHandle {
        spawn_view_query(self.inner.clone(), query)
    }

    /// POST an ad-hoc map/reduce to `_temp_view`.
    pub fn query_temporary_view(&self, view: TemporaryView) -> RequestHandle {
        let mut body = Map::new();
        body.insert(
            "language".to_string(),
            JsonValue::String("javascript".to_string()),
        );
        body.insert("map".to_string(), JsonValue::String(view.map.clone()));
        if let Some(reduce) = &view.reduce {
            body.insert("reduce".to_string(), JsonValue::String(reduce.clone()));
        }

        let options = RequestOptions {
            method: Some(Method::POST),
            path: Some("_temp_view".to_string()),
            headers: view.headers,
            query: view.query,
            body: Some(Body::Json(JsonValue::Object(body))),
            stream: view.stream,
            ..RequestOptions::default()
        };
        spawn_request(self.inner.clone(), options)
    }

    /// Create the database by PUTting the base URL. A 412 means the
    /// database already exists and is not an error.
    pub async fn init(&self) -> Result<()> {
        let options = RequestOptions::new(Method::PUT);
        match self.request(options).into_response().await {
            Ok(_) => Ok(()),
            Err(err) if err.is_precondition_failed() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Release the connection pool. Idempotent; a later request would
    /// build a fresh pool.
    pub fn quit(&self) {
        self.inner.agent.shutdown();
    }

    /// The configured base URLs.
    pub fn urls(&self) -> &[String] {
        &self.inner.urls
    }

    /// The design-document fingerprint, when one is configured.
    pub fn fingerprint(&self) -> Option<&str> {
        self.inner.fingerprint.as_deref()
    }
}

/// Builder for configuring [`CouchLinkClient`] instances.
pub struct CouchLinkClientBuilder {
    urls: Vec<String>,
    num_retries: u32,
    trust_view_etags: bool,
    max_sockets: Option<usize>,
    reject_unauthorized: bool,
    tls: TlsOptions,
    design_document: Option<DesignDocument>,
    placeholders: HashMap<String, PlaceholderValue>,
    timeouts: CouchLinkTimeouts,
    event_handlers: EventHandlers,
    prepare_hook: Option<PrepareRequestHook>,
}

impl CouchLinkClientBuilder {
    fn new() -> Self {
        Self {
            urls: Vec::new(),
            num_retries: 0,
            trust_view_etags: true,
            max_sockets: None,
            reject_unauthorized: true,
            tls: TlsOptions::default(),
            design_document: None,
            placeholders: HashMap::new(),
            timeouts: CouchLinkTimeouts::default(),
            event_handlers: EventHandlers::new(),
            prepare_hook: None,
        }
    }

    /// Add a base URL (server + database). May be called repeatedly;
    /// multiple URLs are round-robined across requests.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    /// Add several base URLs at once.
    pub fn urls(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.urls.extend(urls.into_iter().map(Into::into));
        self
    }

    /// Configure the design document served by
    /// [`query_design_document`](CouchLinkClient::query_design_document).
    pub fn design_document(mut self, document: DesignDocument) -> Self {
        self.design_document = Some(document);
        self
    }

    /// Trust ETags on view responses (default true). When false, ETags
    /// are stripped both from outgoing conditional view requests and
    /// from view response cache info.
    pub fn trust_view_etags(mut self, trust: bool) -> Self {
        self.trust_view_etags = trust;
        self
    }

    /// Retry budget for transport errors (default 0).
    pub fn num_retries(mut self, retries: u32) -> Self {
        self.num_retries = retries;
        self
    }

    /// Cap the connection pool per host.
    pub fn max_sockets(mut self, max: usize) -> Self {
        self.max_sockets = Some(max);
        self
    }

    /// Client certificate: PEM bytes or a filename (which may contain
    /// `{hostname}`).
    pub fn cert(mut self, item: impl Into<TlsItem>) -> Self {
        self.tls.cert = Some(item.into());
        self
    }

    /// Client private key: PEM bytes or a filename.
    pub fn key(mut self, item: impl Into<TlsItem>) -> Self {
        self.tls.key = Some(item.into());
        self
    }

    /// Add a trust anchor: PEM bytes or a filename. May be called
    /// repeatedly.
    pub fn ca(mut self, item: impl Into<TlsItem>) -> Self {
        self.tls.ca.push(item.into());
        self
    }

    /// Verify server certificates (default true).
    pub fn reject_unauthorized(mut self, reject: bool) -> Self {
        self.reject_unauthorized = reject;
        self
    }

    /// Bind a placeholder available to every request's URL template.
    /// Reserved client property names are rejected at build.
    pub fn placeholder(
        mut self,
        name: impl Into<String>,
        value: impl Into<PlaceholderValue>,
    ) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// Set timeout configuration for the transport.
    pub fn timeouts(mut self, timeouts: CouchLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Register request lifecycle event handlers.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Register a hook that can mutate the low-level request
    /// descriptor just before dispatch.
    pub fn on_prepare_request(
        mut self,
        f: impl Fn(&mut RequestDescriptor) + Send + Sync + 'static,
    ) -> Self {
        self.prepare_hook = Some(Arc::new(f));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<CouchLinkClient> {
        if self.urls.is_empty() {
            return Err(CouchLinkError::ConfigurationError(
                "`url` is required".to_string(),
            ));
        }

        for name in self.placeholders.keys() {
            if RESERVED_PLACEHOLDER_NAMES.contains(&name.as_str()) {
                return Err(CouchLinkError::ConfigurationError(format!(
                    "Placeholder `{}` collides with a reserved client property",
                    name
                )));
            }
        }

        let urls: Vec<String> = self
            .urls
            .iter()
            .map(|url| url.trim_end_matches('/').to_string())
            .collect();

        // Expression placeholders in base URLs must parse now, not at
        // the first request that happens to hit them.
        let template = TemplateEngine::new();
        for url in &urls {
            template.validate(url)?;
        }

        let material = TlsMaterial::load(&self.tls)?;
        let agent = ConnectionAgent::new(
            material,
            self.max_sockets,
            self.reject_unauthorized,
            self.timeouts.clone(),
        );

        let fingerprint = self
            .design_document
            .as_ref()
            .map(|document| document.fingerprint());

        Ok(CouchLinkClient {
            inner: Arc::new(ClientInner {
                urls,
                cursor: AtomicUsize::new(0),
                num_retries: self.num_retries,
                trust_view_etags: self.trust_view_etags,
                placeholders: self.placeholders,
                template,
                agent,
                timeouts: self.timeouts,
                event_handlers: self.event_handlers,
                prepare_hook: self.prepare_hook,
                design_document: self.design_document,
                fingerprint,
            }),
        })
    }
}
