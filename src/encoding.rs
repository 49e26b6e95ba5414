//! Query-string encoding.
//!
//! Structured query parameters render as `percent(key)=percent(json(value))`
//! pairs in insertion order; a string value `bar` therefore encodes as
//! `%22bar%22`, never as bare `bar`, so the server-side JSON key parsing
//! round-trips. List values emit one pair per item. The leading
//! separator is `?` unless the URL already carries one.

use crate::models::{Query, QueryValue};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value as JsonValue;

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )` is escaped, the
/// same component set the original URLs were built with.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

fn json_component(value: &JsonValue) -> String {
    component(&value.to_string())
}

/// Append `query` to `url`, choosing the separator from the URL's
/// current shape.
pub(crate) fn append_query(url: &mut String, query: &Query) {
    if query.is_empty() {
        return;
    }
    let mut separator = if url.contains('?') { '&' } else { '?' };
    match query {
        Query::Raw(raw) => {
            url.push(separator);
            url.push_str(raw);
        },
        Query::Pairs(pairs) => {
            for (key, value) in pairs {
                match value {
                    QueryValue::Absent => continue,
                    QueryValue::Single(v) => {
                        url.push(separator);
                        url.push_str(&component(key));
                        url.push('=');
                        url.push_str(&json_component(v));
                        separator = '&';
                    },
                    QueryValue::Many(items) => {
                        for item in items {
                            url.push(separator);
                            url.push_str(&component(key));
                            url.push('=');
                            url.push_str(&json_component(item));
                            separator = '&';
                        }
                    },
                }
            }
        },
    }
}
