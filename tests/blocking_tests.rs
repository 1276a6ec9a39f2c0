//! Integration tests for the blocking client.
//!
//! The mock server runs on a dedicated runtime; the client itself is driven from
//! the plain test thread, outside any async context.

use http::Method;
use sdk_dispatch::{
    AuthKey, BlockingClient, Error, KeyLocation, Payload, RequestMetadata, RequestOptions,
    RetryConfig,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct TestData {
    id: u32,
    name: String,
}

fn start() -> (Runtime, MockServer) {
    let runtime = Runtime::new().unwrap();
    let server = runtime.block_on(MockServer::start());
    (runtime, server)
}

fn client(server: &MockServer, retries: RetryConfig) -> BlockingClient {
    BlockingClient::builder()
        .base_url(server.uri())
        .unwrap()
        .retries(retries)
        .build_blocking()
        .unwrap()
}

fn get(path: &str) -> RequestMetadata {
    RequestMetadata::new(Method::GET, path)
}

#[test]
fn test_successful_request() {
    let (runtime, server) = start();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "Test"})),
            )
            .expect(1)
            .mount(&server),
    );

    let response = client(&server, RetryConfig::new())
        .request::<TestData>(get("/test"))
        .unwrap();

    assert_eq!(
        response.data,
        Payload::Data(TestData {
            id: 1,
            name: "Test".into()
        })
    );
    assert_eq!(response.attempts, 1);
}

#[test]
fn test_retry_sequence_matches_async_policy() {
    let (runtime, server) = start();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(move |_req: &Request| {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({"id": 3, "name": "ok"}))
                }
            })
            .mount(&server),
    );

    let retries = RetryConfig::new()
        .status_codes([5])
        .initial_delay(20)
        .backoff_factor(2.0)
        .max_delay(1000)
        .max_retries(3);
    let response = client(&server, retries)
        .request::<TestData>(get("/test"))
        .unwrap();

    assert_eq!(response.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(response.latency >= Duration::from_millis(60));
}

#[test]
fn test_retries_exhausted() {
    let (runtime, server) = start();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
            .expect(3)
            .mount(&server),
    );

    let retries = RetryConfig::new().status_codes([5]).initial_delay(10).max_retries(2);
    let err = client(&server, retries)
        .request::<TestData>(get("/test"))
        .unwrap_err();

    match err {
        Error::Api { status, body, .. } => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(body, Some(json!({"error": "boom"})));
        }
        other => panic!("Expected Api error, got {:?}", other),
    }
}

#[test]
fn test_auth_and_query() {
    let (runtime, server) = start();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "rust"))
            .and(query_param("limit", "10"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .expect(1)
            .mount(&server),
    );

    let client = BlockingClient::builder()
        .base_url(server.uri())
        .unwrap()
        .auth("key", AuthKey::new("x-api-key", KeyLocation::Header).with_value("secret"))
        .build_blocking()
        .unwrap();

    let metadata = get("/search")
        .with_query_param("q", "rust")
        .with_options(RequestOptions::new().additional_param("limit", "10"))
        .with_auth("key");
    let response = client.request::<Vec<u32>>(metadata).unwrap();

    assert_eq!(response.data, Payload::Data(vec![1, 2]));
}

#[test]
fn test_raw_and_binary_responses() {
    let (runtime, server) = start();
    runtime.block_on(async {
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "application/pdf"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/raw"))
            .respond_with(ResponseTemplate::new(200).set_body_string("as-is"))
            .mount(&server)
            .await;
    });

    let client = client(&server, RetryConfig::new());

    let response = client.request::<Value>(get("/file")).unwrap();
    assert_eq!(
        response.data.binary().map(|b| b.content.to_vec()),
        Some(vec![1, 2, 3])
    );

    let raw = client.request_raw(get("/raw")).unwrap();
    assert_eq!(raw.data.text().unwrap(), "as-is");
}

#[test]
fn test_server_sent_events() {
    let (runtime, server) = start();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"key\":\"value\"}\r\n\r\nevent: ping\r\n\r\ndata: plain text\r\n\r\n",
                "text/event-stream",
            ))
            .mount(&server),
    );

    let stream = client(&server, RetryConfig::new())
        .stream::<Value>(get("/events"))
        .unwrap();

    let events: Vec<Value> = stream.map(|e| e.unwrap()).collect();
    assert_eq!(events, vec![json!({"key": "value"}), json!("plain text")]);
}

#[test]
fn test_stream_closed_early() {
    let (runtime, server) = start();
    runtime.block_on(
        Mock::given(method("GET"))
            .and(path("/events"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("data: 1\n\ndata: 2\n\ndata: 3\n\n", "text/event-stream"),
            )
            .mount(&server),
    );

    let mut stream = client(&server, RetryConfig::new())
        .stream::<u32>(get("/events"))
        .unwrap();

    assert_eq!(stream.next().unwrap().unwrap(), 1);
    stream.close();
    assert!(stream.next().is_none());
}
