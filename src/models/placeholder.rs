//! Placeholder bindings for URL templates.

use crate::models::RequestOptions;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Signature of a dynamic placeholder resolver.
///
/// Invoked with the request options of the call being dispatched and
/// the placeholder name being resolved.
pub type PlaceholderFn = Arc<dyn Fn(&RequestOptions, &str) -> JsonValue + Send + Sync>;

/// A value bound to a URL-template placeholder.
///
/// Either a constant, or a function invoked per request with
/// `(&RequestOptions, placeholder_name)`. Functions let one client
/// target different partitions or hosts depending on the call.
///
/// # Examples
///
/// ```rust
/// use couch_link::PlaceholderValue;
///
/// let constant = PlaceholderValue::from("example.com");
/// let dynamic = PlaceholderValue::dynamic(|options, _name| {
///     serde_json::json!(options.path.as_deref().map_or(0, |p| p.len() % 2))
/// });
/// ```
#[derive(Clone)]
pub enum PlaceholderValue {
    /// A fixed value substituted as-is.
    Constant(JsonValue),
    /// A resolver invoked per request.
    Dynamic(PlaceholderFn),
}

impl PlaceholderValue {
    /// Bind a resolver function.
    pub fn dynamic(
        f: impl Fn(&RequestOptions, &str) -> JsonValue + Send + Sync + 'static,
    ) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    /// Resolve to a concrete JSON value for one request.
    pub(crate) fn resolve(&self, options: &RequestOptions, name: &str) -> JsonValue {
        match self {
            Self::Constant(v) => v.clone(),
            Self::Dynamic(f) => f(options, name),
        }
    }
}

impl fmt::Debug for PlaceholderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => f.debug_tuple("Constant").field(v).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<fn>").finish(),
        }
    }
}

impl From<JsonValue> for PlaceholderValue {
    fn from(v: JsonValue) -> Self {
        Self::Constant(v)
    }
}

impl From<&str> for PlaceholderValue {
    fn from(v: &str) -> Self {
        Self::Constant(JsonValue::String(v.to_string()))
    }
}

impl From<String> for PlaceholderValue {
    fn from(v: String) -> Self {
        Self::Constant(JsonValue::String(v))
    }
}

impl From<i64> for PlaceholderValue {
    fn from(v: i64) -> Self {
        Self::Constant(JsonValue::from(v))
    }
}

impl From<bool> for PlaceholderValue {
    fn from(v: bool) -> Self {
        Self::Constant(JsonValue::Bool(v))
    }
}
