//! HTTP transport and bearer session against a real HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use cinepay_api::session::{InMemoryTokenStorage, SessionManager, Tokens};
use cinepay_api::{ApiError, ApiRequest, AuthenticatedTransport, HttpTransport, Transport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http(server: &MockServer) -> Arc<dyn Transport> {
    Arc::new(HttpTransport::new(&server.uri(), Duration::from_secs(5)).unwrap())
}

fn authenticated(server: &MockServer) -> AuthenticatedTransport {
    let plain = http(server);
    let storage = Arc::new(InMemoryTokenStorage::with_tokens(Tokens {
        access: Some("a1".into()),
        refresh: Some("r1".into()),
    }));
    let session = SessionManager::new(storage, Arc::clone(&plain));
    AuthenticatedTransport::new(plain, session)
}

#[tokio::test]
async fn appends_api_prefix_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Payment/7/payment-url"))
        .and(query_param("returnUrl", "http://localhost:5173/payment/result?order=7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"paymentUrl": "https://pay.example/7"})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
    let response = transport
        .send(
            ApiRequest::get("/Payment/7/payment-url")
                .with_query("returnUrl", "http://localhost:5173/payment/result?order=7"),
        )
        .await
        .unwrap();

    assert_eq!(response.body["paymentUrl"], "https://pay.example/7");
}

#[tokio::test]
async fn error_status_keeps_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Order"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"errorMessage": "Seat A1 is taken"})))
        .mount(&server)
        .await;

    let result = http(&server).send(ApiRequest::post("/Order", json!({}))).await;

    match result {
        Err(error @ ApiError::Status { status: 409, .. }) => {
            assert_eq!(error.user_message("fallback"), "Seat A1 is taken");
        },
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Order/my"))
        .and(header("authorization", "Bearer a1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/Order/my"))
        .and(header("authorization", "Bearer a2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refreshToken": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "a2", "refreshToken": "r2"}))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = authenticated(&server);
    let (first, second) = tokio::join!(
        transport.send(ApiRequest::get("/Order/my")),
        transport.send(ApiRequest::get("/Order/my")),
    );

    assert_eq!(first.unwrap().body, json!([{"id": 1}]));
    assert_eq!(second.unwrap().body, json!([{"id": 1}]));
    assert_eq!(transport.session().access_token().as_deref(), Some("a2"));
}

#[tokio::test]
async fn auth_routes_never_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "a2"})))
        .expect(0)
        .mount(&server)
        .await;

    let result = authenticated(&server)
        .send(ApiRequest::post("/Auth/login", json!({"email": "a@b.c"})))
        .await;

    assert_eq!(result.err().and_then(|e| e.status()), Some(401));
}
