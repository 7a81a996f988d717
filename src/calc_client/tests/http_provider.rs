use std::time::Duration;

use calc_client::{
    CalculationProvider, FailureClass, FetchClient, FetchError, RequestDefaults,
    identity::IdentityPool,
    pacing::Pacing,
    providers::http::{HttpCalculationProvider, HttpSettings},
};
use chrono::NaiveDate;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn settings(server: &MockServer) -> HttpSettings {
    HttpSettings {
        endpoint: format!("{}/api/bazi-calculate", server.uri()),
        timeout: Duration::from_millis(500),
        identities: IdentityPool::new(["agent-a", "agent-b"]).unwrap(),
        max_requests_per_minute: None,
    }
}

fn client(server: &MockServer) -> FetchClient<HttpCalculationProvider> {
    let provider = HttpCalculationProvider::new(settings(server)).expect("provider");
    FetchClient::new(provider, RequestDefaults::default(), Pacing::none())
}

fn slot() -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(1990, 5, 17)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

#[tokio::test]
async fn success_decodes_body_and_sends_slot_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/bazi-calculate"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "birthDate": "1990-05-17T10:00:00",
            "birthTime": { "hour": 10, "minute": 0 },
            "calendarType": "solar"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "abc-123",
            "solarDate": "1990-05-17T10:00:00",
            "wuXing": { "metal": 2 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let body = client(&server).fetch(slot()).await.expect("fetch");
    assert_eq!(body["id"], "abc-123");
    assert_eq!(body["wuXing"]["metal"], 2);
}

#[tokio::test]
async fn user_agent_comes_from_the_pool() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let c = client(&server);
    for _ in 0..10 {
        c.fetch(slot()).await.unwrap();
    }

    let pool = IdentityPool::new(["agent-a", "agent-b"]).unwrap();
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 10);
    for req in received {
        let ua = req.headers.get("user-agent").unwrap().to_str().unwrap();
        assert!(pool.contains(ua), "unexpected user agent {ua}");
    }
}

#[tokio::test]
async fn http_429_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let err = client(&server).fetch(slot()).await.unwrap_err();
    assert_eq!(err.class(), FailureClass::RateLimited);
    assert!(matches!(err, FetchError::RateLimited { ref body } if body == "Too Many Requests"));
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client(&server).fetch(slot()).await.unwrap_err();
    assert_eq!(err.class(), FailureClass::Transient);
    assert!(matches!(err, FetchError::Status { status: 502, .. }));
}

#[tokio::test]
async fn non_object_body_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch(slot()).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode(_)));
    assert_eq!(err.class(), FailureClass::Transient);
}

#[tokio::test]
async fn slow_remote_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client(&server).fetch(slot()).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err}");
    assert_eq!(err.class(), FailureClass::Transient);
}

#[tokio::test]
async fn provider_is_usable_as_trait_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 7 })))
        .mount(&server)
        .await;

    let provider: Box<dyn CalculationProvider> =
        Box::new(HttpCalculationProvider::new(settings(&server)).unwrap());
    let c = FetchClient::new(provider, RequestDefaults::default(), Pacing::none());
    let body = c.fetch(slot()).await.unwrap();
    assert_eq!(body["id"], 7);
}
