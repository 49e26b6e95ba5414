//! Design-document installation and recovery.
//!
//! View queries target `_design/<fingerprint>/...`, so a freshly
//! configured client usually points at a document the server has never
//! seen. The manager treats the first NotFound of a view query as a
//! cold cache: it PUTs the full design document (a 409 means a
//! concurrent installer won), retries the view GET exactly once, and
//! asynchronously deletes design documents carrying stale
//! fingerprints. The retry's error, if any, surfaces as-is.
//!
//! The caller-facing handle exists before any dispatch. A small
//! adapter forwards events from the inner request, consuming only a
//! first-event NotFound into the recovery path; once any other event
//! has been seen the adapter is a plain pass-through.

use crate::client::ClientInner;
use crate::error::{CouchLinkError, Result};
use crate::models::{Body, Query, RequestOptions, ViewQuery};
use crate::request::spawn_request;
use crate::streaming::{EventSink, RequestEvent, RequestHandle};
use log::debug;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Dispatch a view query with NotFound recovery.
pub(crate) fn spawn_view_query(inner: Arc<ClientInner>, query: ViewQuery) -> RequestHandle {
    let (sink, abort_rx, handle) = RequestHandle::channel();
    tokio::spawn(run_view_query(inner, query, sink, abort_rx));
    handle
}

#[derive(Clone, Copy)]
enum AdapterState {
    /// No meaningful event seen yet; a NotFound here triggers recovery.
    WaitingFirst,
    /// Forward everything, including errors.
    PassThrough,
}

async fn run_view_query(
    inner: Arc<ClientInner>,
    query: ViewQuery,
    mut sink: EventSink,
    mut abort_rx: oneshot::Receiver<()>,
) {
    let (fingerprint, prepared) = match validate(&inner, &query) {
        Ok(prepared) => prepared,
        Err(err) => {
            sink.emit(RequestEvent::Error(err)).await;
            return;
        },
    };

    let mut attempt = spawn_request(inner.clone(), build_options(&inner, &query, &prepared));
    let mut state = AdapterState::WaitingFirst;

    loop {
        let event = tokio::select! {
            _ = &mut abort_rx => {
                attempt.abort();
                return;
            },
            event = attempt.next() => event,
        };
        let Some(event) = event else {
            // Inner stream closed without a terminal event; nothing
            // more will arrive.
            return;
        };

        match state {
            AdapterState::WaitingFirst => match event {
                // Dispatch notifications pass through without deciding
                // the recovery question.
                RequestEvent::Request(_) => {
                    if !sink.emit(event).await {
                        attempt.abort();
                        return;
                    }
                },
                RequestEvent::Error(err) if err.is_not_found() => {
                    debug!(
                        "[COUCH_DESIGN] View `{}` missing for _design/{}, installing",
                        query.view, fingerprint
                    );
                    if let Err(install_err) = install(&inner, &fingerprint).await {
                        sink.emit(RequestEvent::Error(install_err)).await;
                        return;
                    }
                    attempt =
                        spawn_request(inner.clone(), build_options(&inner, &query, &prepared));
                    state = AdapterState::PassThrough;
                },
                other => {
                    state = AdapterState::PassThrough;
                    let terminal = other.is_terminal();
                    if !sink.emit(other).await || terminal {
                        return;
                    }
                },
            },
            AdapterState::PassThrough => {
                let terminal = event.is_terminal();
                if !sink.emit(event).await || terminal {
                    return;
                }
            },
        }
    }
}

struct PreparedView {
    path: String,
    headers: Vec<(String, String)>,
}

fn validate(inner: &ClientInner, query: &ViewQuery) -> Result<(String, PreparedView)> {
    let ddoc = inner.design_document.as_ref().ok_or_else(|| {
        CouchLinkError::ConfigurationError("No design document configured".to_string())
    })?;
    let fingerprint = inner
        .fingerprint
        .clone()
        .expect("fingerprint derived with design document");

    if ddoc.get(&query.view).is_none() {
        return Err(CouchLinkError::ConfigurationError(format!(
            "Unknown view `{}` in design document",
            query.view
        )));
    }
    if let Some(list) = &query.list {
        if ddoc.get_list(list).is_none() {
            return Err(CouchLinkError::ConfigurationError(format!(
                "Unknown list function `{}` in design document",
                list
            )));
        }
    }

    let path = match &query.list {
        Some(list) => format!("_design/{}/_list/{}/{}", fingerprint, list, query.view),
        None => format!("_design/{}/_view/{}", fingerprint, query.view),
    };

    let mut headers = query.headers.clone();
    if !inner.trust_view_etags {
        // Conditional ETags are dropped wholesale; a buggy cache layer
        // could answer 304 for a view it never computed.
        headers.retain(|(name, _)| !name.eq_ignore_ascii_case("if-none-match"));
    }

    Ok((fingerprint, PreparedView { path, headers }))
}

fn build_options(inner: &ClientInner, query: &ViewQuery, prepared: &PreparedView) -> RequestOptions {
    RequestOptions {
        method: Some(Method::GET),
        path: Some(prepared.path.clone()),
        headers: prepared.headers.clone(),
        query: query.query.clone(),
        num_retries: query.num_retries,
        stream: query.stream,
        strip_cache_etag: !inner.trust_view_etags,
        ..RequestOptions::default()
    }
}

/// PUT the design document; a 409 means a concurrent installer won.
/// Stale fingerprints are reaped in the background after success.
async fn install(inner: &Arc<ClientInner>, fingerprint: &str) -> Result<()> {
    let ddoc = inner
        .design_document
        .as_ref()
        .expect("install requires a design document");

    let options = RequestOptions {
        method: Some(Method::PUT),
        path: Some(format!("_design/{}", fingerprint)),
        body: Some(Body::Json(ddoc.to_json())),
        ..RequestOptions::default()
    };

    match spawn_request(inner.clone(), options).into_response().await {
        Ok(_) => {
            debug!("[COUCH_DESIGN] Installed _design/{}", fingerprint);
        },
        Err(err) if err.is_conflict() => {
            debug!(
                "[COUCH_DESIGN] _design/{} already being installed elsewhere",
                fingerprint
            );
        },
        Err(err) => return Err(err),
    }

    let reaper_inner = inner.clone();
    let current = fingerprint.to_string();
    tokio::spawn(async move {
        reap_stale_documents(reaper_inner, current).await;
    });

    Ok(())
}

/// Delete every `_design/*` whose id differs from the current
/// fingerprint. Failures are logged and swallowed.
async fn reap_stale_documents(inner: Arc<ClientInner>, fingerprint: String) {
    let listing = RequestOptions::get("_all_docs").query(
        Query::new()
            .pair("startkey", json!("_design/"))
            .pair("endkey", json!("_design/~")),
    );
    let listing = match spawn_request(inner.clone(), listing).into_response().await {
        Ok(response) => response,
        Err(err) => {
            debug!("[COUCH_DESIGN] Stale design-document listing failed: {}", err);
            return;
        },
    };

    let current_id = format!("_design/{}", fingerprint);
    let rows = listing
        .json
        .as_ref()
        .and_then(|body| body.get("rows"))
        .and_then(|rows| rows.as_array())
        .cloned()
        .unwrap_or_default();

    for row in rows {
        let Some(id) = row.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        if id == current_id || !id.starts_with("_design/") {
            continue;
        }
        let Some(rev) = row
            .get("value")
            .and_then(|v| v.get("rev"))
            .and_then(|v| v.as_str())
        else {
            continue;
        };

        let delete = RequestOptions::delete(id.to_string())
            .query(Query::raw(format!("rev={}", rev)));
        match spawn_request(inner.clone(), delete).into_response().await {
            Ok(_) => debug!("[COUCH_DESIGN] Deleted stale {}", id),
            Err(err) => debug!("[COUCH_DESIGN] Failed to delete stale {}: {}", id, err),
        }
    }
}
