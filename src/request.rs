//! The request pipeline.
//!
//! Drives one logical request end to end: base-URL rotation, template
//! expansion, path and query assembly, body serialisation, header
//! composition, the transport-error retry loop, and response
//! classification into the typed error taxonomy. Every dispatch runs
//! in a background task that forwards events through the caller's
//! [`RequestHandle`](crate::RequestHandle).

use crate::client::ClientInner;
use crate::encoding::append_query;
use crate::error::CouchLinkError;
use crate::event_handlers::{FailedRequest, RequestInfo, SuccessfulRequest};
use crate::models::{
    is_json_content_type, Body, ByteStream, CacheInfo, RequestOptions, Response, ResponseHead,
};
use crate::streaming::{EventSink, RequestEvent, RequestHandle, ViewEvent};
use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::Method;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Pause between redispatches of a retried request.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Low-level request descriptor handed to the
/// [`on_prepare_request`](crate::CouchLinkClientBuilder::on_prepare_request)
/// hook just before dispatch.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Fully expanded target URL, query string included.
    pub url: String,
    /// The complete outgoing header set.
    pub headers: Vec<(String, String)>,
}

/// Hook that can mutate the request descriptor before dispatch.
pub type PrepareRequestHook = Arc<dyn Fn(&mut RequestDescriptor) + Send + Sync>;

impl From<ViewEvent> for RequestEvent {
    fn from(event: ViewEvent) -> Self {
        match event {
            ViewEvent::Metadata(value) => Self::Metadata(value),
            ViewEvent::Row(value) => Self::Row(value),
        }
    }
}

enum PreparedBody {
    None,
    Replayable(Bytes),
    Streamed(ByteStream),
}

/// Spawn the driver task for one request and hand back its handle.
pub(crate) fn spawn_request(inner: Arc<ClientInner>, options: RequestOptions) -> RequestHandle {
    let (sink, abort_rx, handle) = RequestHandle::channel();
    tokio::spawn(run_request(inner, options, sink, abort_rx));
    handle
}

async fn run_request(
    inner: Arc<ClientInner>,
    mut options: RequestOptions,
    mut sink: EventSink,
    mut abort_rx: oneshot::Receiver<()>,
) {
    let method = options.effective_method();
    let overall_started = Instant::now();

    let (mut descriptor, mut body, mut retries_left) = match prepare(&inner, &mut options) {
        Ok(prepared) => prepared,
        Err(err) => {
            warn!("[COUCH_HTTP] Request preparation failed: {}", err);
            inner.event_handlers.emit_failure(FailedRequest {
                url: String::new(),
                method,
                status: None,
                error: err.clone(),
                num_retries_left: 0,
            });
            sink.emit(RequestEvent::Error(err)).await;
            return;
        },
    };

    if let Some(hook) = &inner.prepare_hook {
        hook(&mut descriptor);
    }

    let client = match inner.agent.client() {
        Ok(client) => client,
        Err(err) => {
            finish_failure(&inner, &mut sink, &descriptor, None, err, retries_left).await;
            return;
        },
    };

    let info = RequestInfo {
        method: descriptor.method.clone(),
        url: descriptor.url.clone(),
    };
    inner.event_handlers.emit_request(info.clone());
    if !sink.emit(RequestEvent::Request(info)).await {
        return;
    }

    // Transport-error retry loop. HTTP responses of any status leave
    // the loop; the budget only covers failures before a response.
    let response = loop {
        let mut builder = client.request(descriptor.method.clone(), &descriptor.url);
        for (name, value) in &descriptor.headers {
            builder = builder.header(name, value);
        }
        if matches!(body, PreparedBody::Streamed(_)) {
            // Consumed at most once; stream bodies carry a zero budget.
            if let PreparedBody::Streamed(stream) =
                std::mem::replace(&mut body, PreparedBody::None)
            {
                builder = builder.body(reqwest::Body::wrap_stream(stream));
            }
        } else if let PreparedBody::Replayable(bytes) = &body {
            builder = builder.body(bytes.clone());
        }
        if !options.stream {
            builder = builder.timeout(inner.timeouts.request_timeout);
        }

        let attempt_started = Instant::now();
        let outcome = tokio::select! {
            _ = &mut abort_rx => {
                debug!("[COUCH_HTTP] {} {} aborted", descriptor.method, descriptor.url);
                return;
            },
            outcome = builder.send() => outcome,
        };

        match outcome {
            Ok(response) => break response,
            Err(e) => {
                let err = CouchLinkError::from(e);
                if retries_left > 0 && err.is_transport() {
                    warn!(
                        "[COUCH_HTTP] Retriable error ({} retries left): {} duration_ms={}",
                        retries_left,
                        err,
                        attempt_started.elapsed().as_millis()
                    );
                    retries_left -= 1;
                    tokio::select! {
                        _ = &mut abort_rx => return,
                        _ = tokio::time::sleep(RETRY_BACKOFF) => {},
                    }
                    continue;
                }
                finish_failure(&inner, &mut sink, &descriptor, None, err, retries_left).await;
                return;
            },
        }
    };

    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let mut cache_info = CacheInfo::extract(status, &headers);
    if options.strip_cache_etag {
        cache_info.headers.etag = None;
    }
    debug!(
        "[COUCH_HTTP] {} {} -> {} duration_ms={}",
        descriptor.method,
        descriptor.url,
        status,
        overall_started.elapsed().as_millis()
    );

    if status >= 400 {
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or("HTTP error")
            .to_string();
        // The error body is drained but never surfaced.
        let _ = response.bytes().await;
        let err = CouchLinkError::http(status, reason);
        finish_failure(&inner, &mut sink, &descriptor, Some(status), err, 0).await;
        return;
    }

    let head = ResponseHead {
        status,
        headers: headers.clone(),
        cache_info: cache_info.clone(),
    };
    if !sink.emit(RequestEvent::Response(head)).await {
        return;
    }

    if status == 304 {
        let envelope = Response {
            status,
            headers,
            cache_info,
            body: Bytes::new(),
            json: None,
        };
        finish_success(&inner, &mut sink, &descriptor, envelope).await;
        return;
    }

    if options.stream {
        let mut parser = crate::streaming::ViewRowParser::new();
        let mut chunks = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = &mut abort_rx => return,
                chunk = chunks.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => match parser.feed(&bytes) {
                    Ok(events) => {
                        for event in events {
                            if !sink.emit(event.into()).await {
                                return;
                            }
                        }
                    },
                    Err(err) => {
                        finish_failure(&inner, &mut sink, &descriptor, Some(status), err, 0).await;
                        return;
                    },
                },
                Some(Err(e)) => {
                    let err = CouchLinkError::from(e);
                    finish_failure(&inner, &mut sink, &descriptor, Some(status), err, 0).await;
                    return;
                },
                None => break,
            }
        }
        match parser.finish() {
            Ok(events) => {
                for event in events {
                    if !sink.emit(event.into()).await {
                        return;
                    }
                }
            },
            Err(err) => {
                finish_failure(&inner, &mut sink, &descriptor, Some(status), err, 0).await;
                return;
            },
        }
        let envelope = Response {
            status,
            headers,
            cache_info,
            body: Bytes::new(),
            json: None,
        };
        finish_success(&inner, &mut sink, &descriptor, envelope).await;
        return;
    }

    let bytes = tokio::select! {
        _ = &mut abort_rx => return,
        bytes = response.bytes() => bytes,
    };
    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = CouchLinkError::from(e);
            finish_failure(&inner, &mut sink, &descriptor, Some(status), err, 0).await;
            return;
        },
    };

    let content_type = cache_info.headers.content_type.clone().unwrap_or_default();
    let json = if is_json_content_type(&content_type) && !bytes.is_empty() {
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                let err = CouchLinkError::BadGateway(format!(
                    "Response announced as JSON could not be parsed: {}",
                    e
                ));
                finish_failure(&inner, &mut sink, &descriptor, Some(status), err, 0).await;
                return;
            },
        }
    } else {
        None
    };

    let envelope = Response {
        status,
        headers,
        cache_info,
        body: bytes,
        json,
    };
    finish_success(&inner, &mut sink, &descriptor, envelope).await;
}

/// Steps 1-7 of the pipeline: everything before the first byte hits
/// the wire. Pure except for the round-robin cursor.
fn prepare(
    inner: &ClientInner,
    options: &mut RequestOptions,
) -> crate::error::Result<(RequestDescriptor, PreparedBody, u32)> {
    // Round-robin base selection; retries reuse the element chosen here.
    let index = inner.cursor.fetch_add(1, Ordering::Relaxed) % inner.urls.len();
    let base = &inner.urls[index];

    let mut url = inner.template.expand(base, options, &inner.placeholders)?;

    if let Some(path) = options.path.as_deref() {
        if path.starts_with('/') || path.starts_with('.') {
            let resolved = url::Url::parse(&format!("{}/", url))
                .and_then(|base| base.join(path))
                .map_err(|e| {
                    CouchLinkError::ConfigurationError(format!("Invalid request URL: {}", e))
                })?;
            url = resolved.to_string();
        } else if !path.is_empty() {
            url.push('/');
            url.push_str(path);
        }
    }

    if let Some(query) = &options.query {
        append_query(&mut url, query);
    }

    let mut json_body = false;
    let body = match options.body.take() {
        None => PreparedBody::None,
        Some(Body::Bytes(bytes)) => PreparedBody::Replayable(bytes),
        Some(Body::Text(text)) => PreparedBody::Replayable(Bytes::from(text)),
        Some(Body::Json(value)) => {
            json_body = true;
            PreparedBody::Replayable(Bytes::from(serde_json::to_vec(&value)?))
        },
        Some(Body::Stream(stream)) => PreparedBody::Streamed(stream),
    };

    let mut retries = options.num_retries.unwrap_or(inner.num_retries);
    if options.stream || matches!(body, PreparedBody::Streamed(_)) {
        retries = 0;
    }

    let mut headers: Vec<(String, String)> = Vec::new();
    if !has_header(&options.headers, "accept") {
        headers.push(("Accept".to_string(), "application/json".to_string()));
    }
    if json_body && !has_header(&options.headers, "content-type") {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }
    headers.extend(options.headers.iter().cloned());

    Ok((
        RequestDescriptor {
            method: options.effective_method(),
            url,
            headers,
        },
        body,
        retries,
    ))
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
}

async fn finish_success(
    inner: &ClientInner,
    sink: &mut EventSink,
    descriptor: &RequestDescriptor,
    envelope: Response,
) {
    inner.event_handlers.emit_success(SuccessfulRequest {
        url: descriptor.url.clone(),
        method: descriptor.method.clone(),
        status: envelope.status,
    });
    sink.emit(RequestEvent::End(envelope)).await;
}

async fn finish_failure(
    inner: &ClientInner,
    sink: &mut EventSink,
    descriptor: &RequestDescriptor,
    status: Option<u16>,
    error: CouchLinkError,
    num_retries_left: u32,
) {
    warn!(
        "[COUCH_HTTP] {} {} failed: {} retries_left={}",
        descriptor.method, descriptor.url, error, num_retries_left
    );
    inner.event_handlers.emit_failure(FailedRequest {
        url: descriptor.url.clone(),
        method: descriptor.method.clone(),
        status,
        error: error.clone(),
        num_retries_left,
    });
    sink.emit(RequestEvent::Error(error)).await;
}
