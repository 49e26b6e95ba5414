//! couch-link: a client library for CouchDB-style document databases.
//!
//! Wraps a pooled HTTP(S) transport with URL templating, a retrying
//! request pipeline, streaming view-row delivery, and lazy installation
//! of fingerprinted design documents.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use couch_link::{CouchLinkClient, DesignDocument, RequestOptions, ViewDef, ViewQuery};
//!
//! #[tokio::main]
//! async fn main() -> couch_link::Result<()> {
//!     let client = CouchLinkClient::builder()
//!         .url("http://localhost:5984/contacts")
//!         .num_retries(2)
//!         .design_document(DesignDocument::new().view(
//!             "by_name",
//!             ViewDef::map("function (doc) { emit(doc.name, doc); }"),
//!         ))
//!         .build()?;
//!
//!     client.init().await?;
//!
//!     // General request pipe.
//!     let all = client
//!         .request(RequestOptions::get("_all_docs"))
//!         .into_response()
//!         .await?;
//!     println!("{:?}", all.json);
//!
//!     // View query; the design document installs itself on demand.
//!     let view = client
//!         .query_design_document(ViewQuery::new("by_name"))
//!         .into_response()
//!         .await?;
//!     println!("{:?}", view.json);
//!
//!     client.quit();
//!     Ok(())
//! }
//! ```
//!
//! # URL templates
//!
//! Base URLs may contain `{name}` placeholders and `{...expr...}`
//! expressions resolved per request from the call's and the client's
//! placeholder bindings:
//!
//! ```rust
//! use couch_link::{CouchLinkClient, PlaceholderValue};
//! use serde_json::json;
//!
//! # fn example() -> couch_link::Result<()> {
//! let client = CouchLinkClient::builder()
//!     .url("http://couchdb{{partition} === 0 ? 3 : 4}.example.com/contacts{partition}")
//!     .placeholder(
//!         "partition",
//!         PlaceholderValue::dynamic(|options, _| {
//!             json!(options.path.as_deref().map_or(0, |p| p.len() % 2))
//!         }),
//!     )
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod agent;
mod design;
mod encoding;
mod request;
mod template;

pub mod client;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod streaming;
pub mod timeouts;
pub mod tls;

pub use client::{CouchLinkClient, CouchLinkClientBuilder};
pub use error::{CouchLinkError, Result};
pub use event_handlers::{EventHandlers, FailedRequest, RequestInfo, SuccessfulRequest};
pub use models::{
    Body, ByteStream, CacheHeaders, CacheInfo, DesignDocument, PlaceholderFn, PlaceholderValue,
    Query, QueryValue, RequestOptions, Response, ResponseHead, TemporaryView, ViewDef, ViewQuery,
};
pub use request::{PrepareRequestHook, RequestDescriptor};
pub use streaming::{RequestEvent, RequestHandle};
pub use timeouts::{CouchLinkTimeouts, CouchLinkTimeoutsBuilder};
pub use tls::{TlsItem, TlsOptions};

/// HTTP method type, re-exported for request options.
pub use reqwest::Method;
