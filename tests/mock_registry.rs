//! The mock registry driving a client through the engine seam.

use std::sync::Arc;

use courier_http::{
    Client, ErrorCode, ReqwestEngine, RequestOptions, ResponseType, StatusCode,
};
use courier_mock::MockRegistry;
use futures::StreamExt;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const ORIGIN: &str = "http://mocked.test";

fn client_over(registry: &MockRegistry) -> Client {
    Client::with_engine(RequestOptions::default(), registry.as_engine())
}

#[tokio::test]
async fn serves_a_canned_json_reply() {
    let registry = MockRegistry::new();
    registry
        .mock(ORIGIN)
        .get("/json")
        .reply(200, r#"{"test": "value"}"#);

    let response = client_over(&registry)
        .get(
            format!("{ORIGIN}/json"),
            RequestOptions::new().with_response_type(ResponseType::Json),
        )
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.status_code, StatusCode::OK);
    assert_eq!(response.body.as_json().unwrap()["test"], "value");
}

#[tokio::test]
async fn rules_are_one_shot_by_default() {
    let registry = MockRegistry::new();
    registry.mock(ORIGIN).get("/json").reply(200, "{}");
    let client = client_over(&registry);

    assert!(client
        .get(format!("{ORIGIN}/json"), RequestOptions::default())
        .await
        .is_ok());

    let err = client
        .get(format!("{ORIGIN}/json"), RequestOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RequestError);
}

#[tokio::test]
async fn body_and_header_matchers_gate_the_rule() {
    let registry = MockRegistry::new();
    registry
        .mock(ORIGIN)
        .post("/submit")
        .match_body(r#"{"a":1}"#)
        .match_header("x-token", "secret")
        .reply(201, "created");

    let client = client_over(&registry);

    // missing header: no match
    let err = client
        .post(
            format!("{ORIGIN}/submit"),
            RequestOptions::new().with_body(r#"{"a":1}"#),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RequestError);

    let reply = client
        .post(
            format!("{ORIGIN}/submit"),
            RequestOptions::new()
                .with_body(r#"{"a":1}"#)
                .with_header("x-token", "secret"),
        )
        .await
        .unwrap();
    assert_eq!(reply.status_code(), Some(StatusCode::CREATED));
}

#[tokio::test]
async fn reply_headers_reach_the_response() {
    let registry = MockRegistry::new();
    let mut headers = courier_http::header::HeaderMap::new();
    headers.insert("x-mocked", "yes".parse().unwrap());
    registry
        .mock(ORIGIN)
        .get("/json")
        .reply_with(200, "{}", headers);

    let response = client_over(&registry)
        .get(format!("{ORIGIN}/json"), RequestOptions::default())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert_eq!(response.headers.get("x-mocked").unwrap(), "yes");
}

#[tokio::test]
async fn pending_lists_unconsumed_rules() {
    let registry = MockRegistry::new();
    registry.mock(ORIGIN).get("/seen").reply(200, "");
    registry.mock(ORIGIN).get("/never").reply(200, "");

    client_over(&registry)
        .get(format!("{ORIGIN}/seen"), RequestOptions::default())
        .await
        .unwrap();

    let pending = registry.pending();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].contains("/never"));

    registry.reset();
    assert!(registry.pending().is_empty());
}

#[tokio::test]
async fn unmatched_requests_fall_through_to_the_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/real"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from the network"))
        .mount(&server)
        .await;

    let registry = MockRegistry::with_fallback(Arc::new(ReqwestEngine::new().unwrap()));
    registry.mock(ORIGIN).get("/json").reply(200, "mocked");

    let client = client_over(&registry);

    let mocked = client
        .get(format!("{ORIGIN}/json"), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(mocked.body().as_str(), Some("mocked"));

    let real = client
        .get(format!("{}/real", server.uri()), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(real.body().as_str(), Some("from the network"));
}

#[tokio::test]
async fn deactivated_registry_passes_everything_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/real"))
        .respond_with(ResponseTemplate::new(200).set_body_string("network"))
        .mount(&server)
        .await;

    let registry = MockRegistry::with_fallback(Arc::new(ReqwestEngine::new().unwrap()));
    registry
        .mock(server.uri())
        .get("/real")
        .reply(200, "mocked");

    registry.deactivate();
    let reply = client_over(&registry)
        .get(format!("{}/real", server.uri()), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.body().as_str(), Some("network"));

    registry.activate();
    let reply = client_over(&registry)
        .get(format!("{}/real", server.uri()), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.body().as_str(), Some("mocked"));
}

#[tokio::test]
async fn sequential_rules_drive_a_retry_to_success() {
    let registry = MockRegistry::new();
    registry.mock(ORIGIN).get("/flaky").reply(429, "");
    registry.mock(ORIGIN).get("/flaky").reply(200, "recovered");

    let reply = client_over(&registry)
        .get(
            format!("{ORIGIN}/flaky"),
            RequestOptions::new().with_retry(courier_http::RetryOptions {
                limit: 1,
                backoff_limit: Some(std::time::Duration::from_millis(50)),
            }),
        )
        .await
        .unwrap();

    assert_eq!(reply.status_code(), Some(StatusCode::OK));
    assert_eq!(reply.body().as_str(), Some("recovered"));
    assert!(registry.pending().is_empty());
}

#[tokio::test]
async fn streams_the_canned_body() {
    let registry = MockRegistry::new();
    registry.mock(ORIGIN).get("/stream").reply(200, "hello\n");

    let mut stream = client_over(&registry)
        .stream(format!("{ORIGIN}/stream"), RequestOptions::default())
        .await
        .unwrap();

    let mut collected = Vec::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }

    assert_eq!(collected, b"hello\n");
}
