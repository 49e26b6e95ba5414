//! Data models for the couch-link client library.
//!
//! Defines per-call request options, body and query variants, the
//! response envelope with cache validators, design documents, and
//! placeholder bindings for URL templates.

pub mod body;
pub mod design_document;
pub mod placeholder;
pub mod query;
pub mod request_options;
pub mod response;
pub mod view_query;

pub use body::{Body, ByteStream};
pub use design_document::{DesignDocument, ViewDef};
pub use placeholder::{PlaceholderFn, PlaceholderValue};
pub use query::{Query, QueryValue};
pub use request_options::RequestOptions;
pub use response::{CacheHeaders, CacheInfo, Response, ResponseHead};
pub use view_query::{TemporaryView, ViewQuery};

pub(crate) use response::is_json_content_type;
