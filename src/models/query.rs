//! Structured query parameters.

use serde_json::Value as JsonValue;

/// A query value attached to one key.
///
/// `Absent` keys are skipped entirely during encoding, which is how a
/// caller expresses "this parameter is not set" without losing the
/// distinction from an explicit JSON `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    /// Key is skipped during encoding.
    Absent,
    /// One `key=json(value)` pair.
    Single(JsonValue),
    /// One `key=json(item)` pair per item.
    Many(Vec<JsonValue>),
}

impl From<JsonValue> for QueryValue {
    fn from(v: JsonValue) -> Self {
        Self::Single(v)
    }
}

impl From<&str> for QueryValue {
    fn from(v: &str) -> Self {
        Self::Single(JsonValue::String(v.to_string()))
    }
}

impl From<String> for QueryValue {
    fn from(v: String) -> Self {
        Self::Single(JsonValue::String(v))
    }
}

impl From<i64> for QueryValue {
    fn from(v: i64) -> Self {
        Self::Single(JsonValue::from(v))
    }
}

impl From<bool> for QueryValue {
    fn from(v: bool) -> Self {
        Self::Single(JsonValue::Bool(v))
    }
}

impl From<Vec<JsonValue>> for QueryValue {
    fn from(v: Vec<JsonValue>) -> Self {
        Self::Many(v)
    }
}

/// Query parameters for one request.
///
/// Either a raw string appended verbatim after the separator, or an
/// ordered key/value list. Pairs keep insertion order in the encoded
/// output.
///
/// # Examples
///
/// ```rust
/// use couch_link::Query;
/// use serde_json::json;
///
/// let query = Query::new()
///     .pair("startkey", json!("_design/"))
///     .pair("endkey", json!("_design/~"))
///     .pair("limit", json!(10));
///
/// let raw = Query::raw("group=true&stale=ok");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Appended verbatim after `?` or `&`.
    Raw(String),
    /// Ordered pairs, each encoded as `percent(key)=percent(json(value))`.
    Pairs(Vec<(String, QueryValue)>),
}

impl Query {
    /// Create an empty pair list.
    pub fn new() -> Self {
        Self::Pairs(Vec::new())
    }

    /// Create a verbatim query string.
    pub fn raw(s: impl Into<String>) -> Self {
        Self::Raw(s.into())
    }

    /// Append one key/value pair (or a `Many`/`Absent` value).
    ///
    /// On a `Raw` query this is a no-op; raw strings are opaque.
    pub fn pair(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        if let Self::Pairs(pairs) = &mut self {
            pairs.push((key.into(), value.into()));
        }
        self
    }

    /// True when encoding would produce no output.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Raw(s) => s.is_empty(),
            Self::Pairs(pairs) => pairs.iter().all(|(_, v)| matches!(v, QueryValue::Absent)),
        }
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}
