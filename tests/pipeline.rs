//! Request pipeline integration tests against the in-process server.

mod common;

use common::{CannedResponse, TestServer};
use couch_link::{
    Body, CouchLinkClient, EventHandlers, Query, QueryValue, RequestOptions,
};
use futures_util::StreamExt;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn ok_json() -> CannedResponse {
    CannedResponse::json(200, json!({"ok": true}))
}

#[tokio::test]
async fn test_get_parses_json_body() {
    let server = TestServer::start(|_| CannedResponse::json(200, json!({"db_name": "contacts"}))).await;
    let client = CouchLinkClient::builder()
        .url(server.url("contacts"))
        .build()
        .unwrap();

    let response = client
        .request(RequestOptions::get("meta"))
        .into_response()
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.json, Some(json!({"db_name": "contacts"})));

    let recorded = server.requests();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, "GET");
    assert_eq!(recorded[0].path, "/contacts/meta");
    assert_eq!(recorded[0].header("accept"), Some("application/json"));
}

#[tokio::test]
async fn test_caller_accept_header_wins() {
    let server = TestServer::start(|_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    client
        .request(RequestOptions::get("doc").header("Accept", "text/plain"))
        .into_response()
        .await
        .unwrap();

    assert_eq!(server.requests()[0].header("accept"), Some("text/plain"));
}

#[tokio::test]
async fn test_json_body_sets_content_type() {
    let server = TestServer::start(|_| CannedResponse::json(201, json!({"ok": true}))).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    client
        .request(RequestOptions::post("docs").json(json!({"name": "Ada"})))
        .into_response()
        .await
        .unwrap();

    let recorded = &server.requests()[0];
    assert_eq!(recorded.method, "POST");
    assert_eq!(recorded.header("content-type"), Some("application/json"));
    assert_eq!(recorded.body, "{\"name\":\"Ada\"}");
}

#[tokio::test]
async fn test_text_body_sets_no_content_type() {
    let server = TestServer::start(|_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    client
        .request(RequestOptions::put("attachment").body("raw text"))
        .into_response()
        .await
        .unwrap();

    let recorded = &server.requests()[0];
    assert_eq!(recorded.header("content-type"), None);
    assert_eq!(recorded.body, "raw text");
}

#[tokio::test]
async fn test_round_robin_rotates_bases() {
    let first = TestServer::start(|_| ok_json()).await;
    let second = TestServer::start(|_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(first.url("db"))
        .url(second.url("db"))
        .build()
        .unwrap();

    for _ in 0..2 {
        client
            .request(RequestOptions::get("doc"))
            .into_response()
            .await
            .unwrap();
    }

    assert_eq!(first.requests().len(), 1);
    assert_eq!(second.requests().len(), 1);

    client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap();
    assert_eq!(first.requests().len(), 2);
}

#[tokio::test]
async fn test_transport_errors_exhaust_retry_budget() {
    let server = TestServer::start_with_failures(3, |_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .num_retries(2)
        .build()
        .unwrap();

    let err = client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap_err();

    assert!(err.is_transport(), "expected transport error, got {}", err);
    assert_eq!(server.connection_count(), 3);
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_transport_errors_then_success() {
    let server = TestServer::start_with_failures(2, |_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .num_retries(2)
        .build()
        .unwrap();

    let response = client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(server.connection_count(), 3);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_stream_body_disables_retries() {
    let server = TestServer::start_with_failures(1, |_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .num_retries(2)
        .build()
        .unwrap();

    let stream = futures_util::stream::iter(vec![Ok(bytes::Bytes::from_static(b"chunk"))]).boxed();
    let err = client
        .request(RequestOptions::put("doc").body(Body::stream(stream)))
        .into_response()
        .await
        .unwrap_err();

    assert!(err.is_transport());
    // One connection, no redispatch: the body is not replayable.
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_http_error_maps_to_typed_error() {
    let server =
        TestServer::start(|_| CannedResponse::json(404, json!({"error": "not_found"}))).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    let err = client
        .request(RequestOptions::get("missing"))
        .into_response()
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn test_bad_gateway_on_unparseable_json() {
    let server =
        TestServer::start(|_| CannedResponse::raw(200, "application/json", "not json at all")).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    let err = client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(502));
}

#[tokio::test]
async fn test_non_json_body_kept_raw() {
    let server = TestServer::start(|_| CannedResponse::raw(200, "text/plain", "hello")).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    let response = client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap();

    assert_eq!(response.json, None);
    assert_eq!(&response.body[..], b"hello");
    assert_eq!(
        response.cache_info.headers.content_type.as_deref(),
        Some("text/plain")
    );
}

#[tokio::test]
async fn test_not_modified_sets_cache_info() {
    let server =
        TestServer::start(|_| CannedResponse::status(304).header("ETag", "\"3-xyz\"")).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    let response = client
        .request(RequestOptions::get("doc").header("If-None-Match", "\"3-xyz\""))
        .into_response()
        .await
        .unwrap();

    assert_eq!(response.status, 304);
    assert!(response.cache_info.not_modified);
    assert_eq!(response.cache_info.headers.etag.as_deref(), Some("\"3-xyz\""));
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_placeholder_template_resolves_per_call() {
    let server = TestServer::start(|_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url("http://{host}/contacts")
        .build()
        .unwrap();

    client
        .request(
            RequestOptions::get("hey").placeholder("host", server.addr.to_string()),
        )
        .into_response()
        .await
        .unwrap();

    assert_eq!(server.requests()[0].path, "/contacts/hey");
}

#[tokio::test]
async fn test_query_encoding_end_to_end() {
    let server = TestServer::start(|_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    client
        .request(
            RequestOptions::get("docs").query(
                Query::new()
                    .pair("ascii", json!("blabla"))
                    .pair("multiple", vec![json!("foo"), json!("bar")])
                    .pair("skipped", QueryValue::Absent),
            ),
        )
        .into_response()
        .await
        .unwrap();

    assert_eq!(
        server.requests()[0].path,
        "/db/docs?ascii=%22blabla%22&multiple=%22foo%22&multiple=%22bar%22"
    );
}

#[tokio::test]
async fn test_absolute_path_resolves_against_host() {
    let server = TestServer::start(|_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    client
        .request(RequestOptions::get("/_up"))
        .into_response()
        .await
        .unwrap();

    assert_eq!(server.requests()[0].path, "/_up");
}

#[tokio::test]
async fn test_event_handlers_fire_exactly_once() {
    let requests = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));

    let handlers = {
        let requests = requests.clone();
        let successes = successes.clone();
        let failures = failures.clone();
        EventHandlers::new()
            .on_request(move |_| {
                requests.fetch_add(1, Ordering::SeqCst);
            })
            .on_successful_request(move |_| {
                successes.fetch_add(1, Ordering::SeqCst);
            })
            .on_failed_request(move |_| {
                failures.fetch_add(1, Ordering::SeqCst);
            })
    };

    // One transport failure, then success: still one logical request.
    let server = TestServer::start_with_failures(1, |_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .num_retries(1)
        .event_handlers(handlers)
        .build()
        .unwrap();

    client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap();

    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_request_reports_retries_left() {
    let captured = Arc::new(std::sync::Mutex::new(None));
    let handlers = {
        let captured = captured.clone();
        EventHandlers::new().on_failed_request(move |failure| {
            *captured.lock().unwrap() = Some(failure);
        })
    };

    let server = TestServer::start(|_| CannedResponse::status(500)).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .num_retries(2)
        .event_handlers(handlers)
        .build()
        .unwrap();

    let err = client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(500));

    let failure = captured.lock().unwrap().clone().unwrap();
    assert_eq!(failure.status, Some(500));
    // HTTP responses freeze the budget; nothing was retried.
    assert_eq!(failure.num_retries_left, 0);
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_prepare_hook_mutates_descriptor() {
    let server = TestServer::start(|_| ok_json()).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .on_prepare_request(|descriptor| {
            descriptor
                .headers
                .push(("X-Trace".to_string(), "abc123".to_string()));
        })
        .build()
        .unwrap();

    client
        .request(RequestOptions::get("doc"))
        .into_response()
        .await
        .unwrap();

    assert_eq!(server.requests()[0].header("x-trace"), Some("abc123"));
}

#[tokio::test]
async fn test_init_ignores_precondition_failed() {
    let server =
        TestServer::start(|_| CannedResponse::json(412, json!({"error": "file_exists"}))).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    client.init().await.unwrap();

    let recorded = &server.requests()[0];
    assert_eq!(recorded.method, "PUT");
    assert_eq!(recorded.path, "/db");
}

#[tokio::test]
async fn test_init_surfaces_other_errors() {
    let server = TestServer::start(|_| CannedResponse::status(500)).await;
    let client = CouchLinkClient::builder()
        .url(server.url("db"))
        .build()
        .unwrap();

    let err = client.init().await.unwrap_err();
    assert_eq!(err.status(), Some(500));
}
