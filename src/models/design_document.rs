//! Design documents and their fingerprints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One view: a map function and an optional reduce, both JavaScript
/// source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDef {
    /// Map function source.
    pub map: String,
    /// Reduce function source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

impl ViewDef {
    /// A map-only view.
    pub fn map(source: impl Into<String>) -> Self {
        Self {
            map: source.into(),
            reduce: None,
        }
    }

    /// A map/reduce view.
    pub fn map_reduce(map: impl Into<String>, reduce: impl Into<String>) -> Self {
        Self {
            map: map.into(),
            reduce: Some(reduce.into()),
        }
    }

    fn to_json(&self) -> JsonValue {
        let mut obj = Map::new();
        obj.insert("map".to_string(), JsonValue::String(self.map.clone()));
        if let Some(reduce) = &self.reduce {
            obj.insert("reduce".to_string(), JsonValue::String(reduce.clone()));
        }
        JsonValue::Object(obj)
    }
}

/// A CouchDB design document holding named views.
///
/// The document is immutable after client construction. Its identity
/// on the server is `_design/<fingerprint>` where the fingerprint is
/// the lowercase hex MD5 of the canonical JSON encoding, so any change
/// to a view's source produces a fresh document id.
///
/// # Examples
///
/// ```rust
/// use couch_link::{DesignDocument, ViewDef};
///
/// let ddoc = DesignDocument::new()
///     .view("by_name", ViewDef::map("function (doc) { emit(doc.name, doc); }"));
///
/// assert_eq!(ddoc.fingerprint().len(), 32);
/// assert!(ddoc.get("by_name").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesignDocument {
    views: Vec<(String, ViewDef)>,
    lists: Vec<(String, String)>,
}

impl DesignDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a view. Insertion order is part of the fingerprint.
    pub fn view(mut self, name: impl Into<String>, def: ViewDef) -> Self {
        self.views.push((name.into(), def));
        self
    }

    /// Add a list function (source text).
    pub fn list(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.lists.push((name.into(), source.into()));
        self
    }

    /// Look up a view by name.
    pub fn get(&self, name: &str) -> Option<&ViewDef> {
        self.views
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def)
    }

    /// Look up a list function by name.
    pub fn get_list(&self, name: &str) -> Option<&str> {
        self.lists
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, src)| src.as_str())
    }

    /// True when no views are defined.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Canonical JSON encoding, function values as source text.
    pub fn to_json(&self) -> JsonValue {
        let mut views = Map::new();
        for (name, def) in &self.views {
            views.insert(name.clone(), def.to_json());
        }
        let mut doc = Map::new();
        doc.insert("views".to_string(), JsonValue::Object(views));
        if !self.lists.is_empty() {
            let mut lists = Map::new();
            for (name, src) in &self.lists {
                lists.insert(name.clone(), JsonValue::String(src.clone()));
            }
            doc.insert("lists".to_string(), JsonValue::Object(lists));
        }
        JsonValue::Object(doc)
    }

    /// Lowercase hex MD5 of the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        let canonical = self.to_json().to_string();
        format!("{:x}", md5::compute(canonical.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DesignDocument {
        DesignDocument::new()
            .view(
                "by_name",
                ViewDef::map("function (doc) { emit(doc.name, doc); }"),
            )
            .view(
                "count",
                ViewDef::map_reduce(
                    "function (doc) { emit(null, 1); }",
                    "function (keys, values) { return sum(values); }",
                ),
            )
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(sample().fingerprint(), sample().fingerprint());
        assert_eq!(sample().fingerprint().len(), 32);
        assert!(sample()
            .fingerprint()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_tracks_source_changes() {
        let base = sample().fingerprint();
        let changed = DesignDocument::new()
            .view(
                "by_name",
                ViewDef::map("function (doc) { emit(doc.name, null); }"),
            )
            .view(
                "count",
                ViewDef::map_reduce(
                    "function (doc) { emit(null, 1); }",
                    "function (keys, values) { return sum(values); }",
                ),
            )
            .fingerprint();
        assert_ne!(base, changed);
    }

    #[test]
    fn test_canonical_json_shape() {
        let json = sample().to_json();
        assert_eq!(
            json["views"]["by_name"]["map"],
            "function (doc) { emit(doc.name, doc); }"
        );
        assert!(json["views"]["by_name"].get("reduce").is_none());
        assert!(json["views"]["count"].get("reduce").is_some());
    }

    #[test]
    fn test_view_lookup() {
        let doc = sample();
        assert!(doc.get("by_name").is_some());
        assert!(doc.get("missing").is_none());
    }
}
