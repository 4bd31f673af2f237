//! Rate limiter integration tests over the HTTP surface.

mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::{body_json, test_config, TestApp, TEST_INTERNAL_KEY};
use security_service::models::{EventSeverity, SecurityEventType};
use security_service::store::SecurityEventFilter;
use uuid::Uuid;

fn session_request(ip: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/internal/sessions")
        .header("content-type", "application/json")
        .header("x-internal-api-key", TEST_INTERNAL_KEY)
        .header("x-forwarded-for", ip)
        .header("user-agent", "integration-test")
        .body(Body::from(
            serde_json::json!({ "user_id": Uuid::new_v4() }).to_string(),
        ))
        .unwrap()
}

async fn tight_limit_app() -> TestApp {
    let mut config = test_config();
    config.rate_limit.session_max_requests = 3;
    config.rate_limit.session_window_minutes = 1;
    TestApp::spawn_with(config).await
}

#[tokio::test]
async fn requests_within_the_window_pass_then_deny_with_retry_after() {
    let app = tight_limit_app().await;

    for i in 0..3 {
        let response = app.request(session_request("198.51.100.1")).await;
        assert_eq!(
            response.status(),
            StatusCode::CREATED,
            "request {} should pass",
            i + 1
        );
    }

    let denied = app.request(session_request("198.51.100.1")).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = denied
        .headers()
        .get("retry-after")
        .expect("Retry-After header missing")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);

    let body = body_json(denied).await;
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert!(body["error"]["timestamp"].is_string());
}

#[tokio::test]
async fn denial_emits_one_medium_brute_force_event_per_window() {
    let app = tight_limit_app().await;

    for _ in 0..3 {
        app.request(session_request("198.51.100.1")).await;
    }
    // Several denials in the same window.
    for _ in 0..4 {
        let denied = app.request(session_request("198.51.100.1")).await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let events = app
        .state
        .audit
        .get_security_events(&SecurityEventFilter {
            event_type: Some(SecurityEventType::BruteForceAttempt),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, EventSeverity::Medium);
    assert_eq!(events[0].ip_address.as_deref(), Some("198.51.100.1"));
}

#[tokio::test]
async fn limits_are_keyed_per_client_ip() {
    let app = tight_limit_app().await;

    for _ in 0..4 {
        app.request(session_request("198.51.100.1")).await;
    }
    // A different client is unaffected.
    let response = app.request(session_request("198.51.100.2")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
}
