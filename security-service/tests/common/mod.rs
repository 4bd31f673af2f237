//! Test helper module for security-service integration tests.
//!
//! Builds the full router over the in-memory store; no external
//! infrastructure is required.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

use security_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, RateLimitConfig, RetentionConfig, SecurityServiceConfig,
        SecuritySettings, StorageBackend, StorageConfig, SwaggerConfig, SwaggerMode,
    },
    services::TracingAlertSink,
    store::{MemoryStore, SecurityStore},
    AppState,
};
use service_core::config::Config as CoreConfig;
use service_core::observability::init_metrics;

pub const TEST_INTERNAL_KEY: &str = "test-internal-key-0123456789abcdef";

/// 32-byte hex key for sealing MFA secrets in tests.
pub fn test_mfa_key() -> String {
    "ab".repeat(32)
}

pub fn test_config() -> SecurityServiceConfig {
    SecurityServiceConfig {
        common: CoreConfig {
            port: 0,
            otlp_endpoint: None,
        },
        environment: Environment::Dev,
        service_name: "security-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            database: DatabaseConfig {
                url: "postgres://unused".to_string(),
                max_connections: 1,
                min_connections: 1,
            },
        },
        security: SecuritySettings {
            internal_api_key: TEST_INTERNAL_KEY.to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            session_timeout_minutes: 30,
            extended_session_minutes: 10080,
            mfa_issuer: "security-service-test".to_string(),
            mfa_encryption_key: test_mfa_key(),
        },
        rate_limit: RateLimitConfig {
            // Generous defaults so unrelated tests never trip the limiter.
            session_max_requests: 1000,
            session_window_minutes: 15,
            login_failure_max_requests: 1000,
            login_failure_window_minutes: 15,
            mfa_max_requests: 1000,
            mfa_window_minutes: 5,
        },
        retention: RetentionConfig {
            audit_log_days: 365,
            security_event_days: 180,
            cleanup_interval_minutes: 15,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: SecurityServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::build(
            config,
            store.clone() as Arc<dyn SecurityStore>,
            Arc::new(TracingAlertSink),
            init_metrics(),
        )
        .expect("Failed to build app state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");
        Self {
            state,
            router,
            store,
        }
    }

    pub async fn request(&self, request: Request<Body>) -> Response<axum::body::Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    /// Open a session through the internal route, as the outer application
    /// would after verifying credentials.
    pub async fn create_session(&self, user_id: Uuid, ip: &str) -> String {
        let response = self
            .request(
                Request::builder()
                    .method("POST")
                    .uri("/internal/sessions")
                    .header("content-type", "application/json")
                    .header("x-internal-api-key", TEST_INTERNAL_KEY)
                    .header("x-forwarded-for", ip)
                    .header("user-agent", "integration-test")
                    .body(Body::from(
                        serde_json::json!({ "user_id": user_id }).to_string(),
                    ))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        body["session_id"].as_str().unwrap().to_string()
    }

    /// Authenticated GET using the session cookie, from the given IP.
    pub async fn authed_get(&self, session_id: &str, ip: &str, uri: &str) -> Response<axum::body::Body> {
        self.request(
            Request::builder()
                .method("GET")
                .uri(uri)
                .header("cookie", format!("session_id={}", session_id))
                .header("x-forwarded-for", ip)
                .header("user-agent", "integration-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Authenticated JSON request using the session cookie.
    pub async fn authed_json(
        &self,
        session_id: &str,
        ip: &str,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> Response<axum::body::Body> {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .header("cookie", format!("session_id={}", session_id))
                .header("x-forwarded-for", ip)
                .header("user-agent", "integration-test")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub async fn body_json(response: Response<axum::body::Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not valid JSON")
}
