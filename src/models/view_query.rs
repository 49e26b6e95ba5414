//! Options for view queries.

use crate::models::Query;

/// Options for querying a view from the client's design document.
///
/// # Examples
///
/// ```rust
/// use couch_link::{Query, ViewQuery};
/// use serde_json::json;
///
/// let q = ViewQuery::new("by_name")
///     .query(Query::new().pair("key", json!("Ada")))
///     .streaming();
///
/// let listed = ViewQuery::new("by_name").list("as_html");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ViewQuery {
    /// View name; must exist in the client's design document.
    pub view: String,
    /// Optional list function applied server-side.
    pub list: Option<String>,
    /// View query parameters.
    pub query: Option<Query>,
    /// Extra headers (conditional headers welcome).
    pub headers: Vec<(String, String)>,
    /// Deliver rows incrementally.
    pub stream: bool,
    /// Per-call retry budget for the view GET.
    pub num_retries: Option<u32>,
}

impl ViewQuery {
    /// Query the named view.
    pub fn new(view: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            ..Self::default()
        }
    }

    /// Route the view output through a list function.
    pub fn list(mut self, name: impl Into<String>) -> Self {
        self.list = Some(name.into());
        self
    }

    /// Set the view query parameters.
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request incremental row delivery.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Override the client's retry budget for this query.
    pub fn retries(mut self, n: u32) -> Self {
        self.num_retries = Some(n);
        self
    }
}

/// An ad-hoc map/reduce POSTed to `_temp_view`, never stored.
#[derive(Debug, Clone, Default)]
pub struct TemporaryView {
    /// Map function source.
    pub map: String,
    /// Reduce function source.
    pub reduce: Option<String>,
    /// View query parameters.
    pub query: Option<Query>,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// Deliver rows incrementally.
    pub stream: bool,
}

impl TemporaryView {
    /// A map-only temporary view.
    pub fn map(source: impl Into<String>) -> Self {
        Self {
            map: source.into(),
            ..Self::default()
        }
    }

    /// Add a reduce function.
    pub fn reduce(mut self, source: impl Into<String>) -> Self {
        self.reduce = Some(source.into());
        self
    }

    /// Set the view query parameters.
    pub fn query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Append a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Request incremental row delivery.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}
