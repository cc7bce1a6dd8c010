use auditor::{AuditConfig, AuditLayer, AuditRecord, ConfigError};
use auditor_core::{body, handler_fn, LayerStack, Request, TestClient, TestRequest};
use auditor_testing::{MockResponse, MockServer, RequestMatcher};
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use std::time::Duration;

async fn collector() -> MockServer {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::new().method(Method::POST).path("/audit"))
        .respond_with(MockResponse::new())
        .any_times();
    server
}

async fn next_record(server: &MockServer, count: usize) -> Vec<AuditRecord> {
    server
        .wait_for_requests(count, Duration::from_secs(5))
        .await
        .iter()
        .map(|r| r.json::<AuditRecord>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_status_request_is_audited_with_redaction() {
    let server = collector().await;
    let layer = AuditLayer::new(
        AuditConfig::new(server.url("/audit")).ignore_header("authorization"),
    )
    .unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|_req| async { "ok" }),
    );

    let response = client
        .request(TestRequest::get("/status?x=1").header("Authorization", "secret"))
        .await;
    response.assert_status(200);
    assert_eq!(response.text(), "ok");

    let records = next_record(&server, 1).await;
    let record = &records[0];
    assert_eq!(record.request.method, "GET");
    assert_eq!(record.request.path, "/status");
    assert_eq!(record.request.raw_query, "x=1");
    assert_eq!(record.request.query.get("x").unwrap(), &["1".to_string()]);
    assert!(!record.request.headers.contains_key_ignore_case("authorization"));
    assert_eq!(record.response.status, 200);
    assert_eq!(record.response.body, Bytes::from_static(b"ok"));
    assert!(record.duration >= 0);
    assert!(record.response.time >= record.request.time);

    let raw = &server.received_requests()[0];
    assert_eq!(raw.header("content-type"), Some("application/json"));
    assert!(!String::from_utf8_lossy(&raw.body).contains("secret"));
}

#[tokio::test]
async fn test_handler_reads_original_request_body() {
    let server = collector().await;
    let layer = AuditLayer::new(AuditConfig::new(server.url("/audit"))).unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|req: Request| async move {
            req.into_body()
                .collect()
                .await
                .map(|c| c.to_bytes())
                .unwrap_or_default()
        }),
    );

    let response = client
        .request(TestRequest::post("/echo").body("payload"))
        .await;
    assert_eq!(response.text(), "payload");

    let record = &next_record(&server, 1).await[0];
    assert_eq!(record.request.body, Bytes::from_static(b"payload"));
    assert_eq!(record.request.content_length, 7);
    assert_eq!(record.response.body, Bytes::from_static(b"payload"));
}

#[tokio::test]
async fn test_declared_length_is_not_recomputed() {
    let server = collector().await;
    let layer = AuditLayer::new(AuditConfig::new(server.url("/audit"))).unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|_req| async { "" }),
    );

    client
        .request(
            TestRequest::post("/upload")
                .header("transfer-encoding", "chunked")
                .body("abc"),
        )
        .await;
    client.get("/empty").await;

    let mut records = next_record(&server, 2).await;
    records.sort_by(|a, b| a.request.path.cmp(&b.request.path));
    assert_eq!(records[0].request.path, "/empty");
    assert_eq!(records[0].request.content_length, 0);
    assert_eq!(records[1].request.content_length, -1);
    assert_eq!(records[1].request.body, Bytes::from_static(b"abc"));
}

#[tokio::test]
async fn test_default_status_is_ok() {
    let server = collector().await;
    let layer = AuditLayer::new(AuditConfig::new(server.url("/audit"))).unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|_req| async { http::Response::new(body::full("implicit")) }),
    );

    client.get("/").await.assert_status(200);

    let record = &next_record(&server, 1).await[0];
    assert_eq!(record.response.status, 200);
    assert_eq!(record.response.body, Bytes::from_static(b"implicit"));
}

#[tokio::test]
async fn test_explicit_status_and_response_headers() {
    let server = collector().await;
    let layer = AuditLayer::new(
        AuditConfig::new(server.url("/audit")).ignore_header("Set-Cookie"),
    )
    .unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|_req| async {
            http::Response::builder()
                .status(StatusCode::CREATED)
                .header("set-cookie", "session=abc")
                .header("x-custom", "one")
                .header("x-custom", "two")
                .body(body::full("made"))
                .unwrap()
        }),
    );

    let response = client.request(TestRequest::put("/things/1")).await;
    response.assert_status(201);
    // Redaction only affects the record.
    assert_eq!(response.header("set-cookie"), Some("session=abc"));

    let record = &next_record(&server, 1).await[0];
    assert_eq!(record.response.status, 201);
    assert!(!record.response.headers.contains_key_ignore_case("set-cookie"));
    assert_eq!(
        record.response.headers.get("x-custom").unwrap(),
        &["one".to_string(), "two".to_string()]
    );
}

#[tokio::test]
async fn test_repeated_request_headers_keep_all_values() {
    let server = collector().await;
    let layer = AuditLayer::new(AuditConfig::new(server.url("/audit"))).unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|_req| async { "ok" }),
    );

    client
        .request(
            TestRequest::get("/")
                .header("accept", "text/html")
                .header("accept", "application/json"),
        )
        .await;

    let record = &next_record(&server, 1).await[0];
    assert_eq!(
        record.request.headers.get("accept").unwrap(),
        &["text/html".to_string(), "application/json".to_string()]
    );
}

#[tokio::test]
async fn test_one_record_per_request() {
    let server = collector().await;
    let layer = AuditLayer::new(AuditConfig::new(server.url("/audit"))).unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|req: Request| async move { req.path().to_string() }),
    );

    for i in 0..5 {
        client.get(&format!("/item/{i}")).await.assert_status(200);
    }

    let records = next_record(&server, 5).await;
    assert_eq!(records.len(), 5);
    for record in &records {
        assert_eq!(record.response.body, Bytes::from(record.request.path.clone()));
    }
}

#[tokio::test]
async fn test_rejecting_collector_does_not_affect_client() {
    let server = MockServer::start().await;
    server
        .expect(RequestMatcher::new())
        .respond_with(MockResponse::new().status(StatusCode::INTERNAL_SERVER_ERROR))
        .any_times();

    let layer = AuditLayer::new(AuditConfig::new(server.url("/audit"))).unwrap();
    let client = TestClient::new(
        LayerStack::new().with(layer),
        handler_fn(|_req| async { "fine" }),
    );

    let response = client.get("/").await;
    response.assert_status(200);
    assert_eq!(response.text(), "fine");
    assert_eq!(server.wait_for_requests(1, Duration::from_secs(5)).await.len(), 1);
}

#[test]
fn test_construction_fails_without_remote_server() {
    let err = AuditLayer::new(AuditConfig::new("")).err().unwrap();
    assert!(matches!(err, ConfigError::MissingRemoteServer));
    assert_eq!(err.to_string(), "no remote server supplied");
}
