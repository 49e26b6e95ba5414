//! Per-call request options.

use crate::models::{Body, PlaceholderValue, Query};
use reqwest::Method;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// Options for a single logical request.
///
/// Mutated only within one request invocation. Extra placeholder
/// bindings override the client's placeholder scope for this call.
///
/// # Examples
///
/// ```rust
/// use couch_link::{Query, RequestOptions};
/// use serde_json::json;
///
/// let options = RequestOptions::post("docs")
///     .json(json!({"name": "Ada"}))
///     .query(Query::new().pair("batch", "ok"))
///     .placeholder("partition", json!(3));
/// ```
#[derive(Default)]
pub struct RequestOptions {
    /// HTTP method; `None` means GET.
    pub method: Option<Method>,
    /// Absolute-from-base (leading `/` or `.`) or relative path.
    pub path: Option<String>,
    /// Extra request headers, applied after the computed set.
    pub headers: Vec<(String, String)>,
    /// Query string or structured parameters.
    pub query: Option<Query>,
    /// Request body.
    pub body: Option<Body>,
    /// Per-call retry budget overriding the client's.
    pub num_retries: Option<u32>,
    /// Deliver rows incrementally instead of buffering the body.
    /// Forces the retry budget to zero.
    pub stream: bool,
    /// Per-call placeholder bindings, consulted before the client scope.
    pub placeholders: HashMap<String, PlaceholderValue>,
    /// Remove the ETag from the response cache info (view queries on
    /// clients that distrust view ETags).
    pub(crate) strip_cache_etag: bool,
}

impl RequestOptions {
    /// Options with the given method and no path.
    pub fn new(method: Method) -> Self {
        Self {
            method: Some(method),
            ..Self::default()
        }
    }

    /// GET with a path.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET).path(path)
    }

    /// PUT with a path.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT).path(path)
    }

    /// POST with a path.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST).path(path)
    }

    /// DELETE with a path.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE).path(path)
    }

    /// Set the path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the query.
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body.
    pub fn json(self, value: JsonValue) -> Self {
        self.body(Body::Json(value))
    }

    /// Override the client's retry budget for this call.
    pub fn retries(mut self, n: u32) -> Self {
        self.num_retries = Some(n);
        self
    }

    /// Request incremental row delivery.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Bind a placeholder for this call only.
    pub fn placeholder(
        mut self,
        name: impl Into<String>,
        value: impl Into<PlaceholderValue>,
    ) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// The effective method (GET when unset).
    pub fn effective_method(&self) -> Method {
        self.method.clone().unwrap_or(Method::GET)
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.effective_method())
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("num_retries", &self.num_retries)
            .field("stream", &self.stream)
            .field("placeholders", &self.placeholders.keys())
            .finish()
    }
}
