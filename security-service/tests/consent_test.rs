//! Consent lifecycle and consent-guard tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{body_json, TestApp};
use security_service::models::{ConsentPurpose, DataConsent, SecurityAction};
use security_service::store::{AuditLogFilter, SecurityStore};
use uuid::Uuid;

const IP: &str = "10.2.2.2";

#[tokio::test]
async fn export_requires_active_data_processing_consent() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let session = app.create_session(user_id, IP).await;

    // No consent yet: the legal/consent-required status.
    let denied = app.authed_get(&session, IP, "/me/export").await;
    assert_eq!(denied.status(), StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS);
    let body = body_json(denied).await;
    assert_eq!(body["error"]["code"], "CONSENT_REQUIRED");
    assert_eq!(body["error"]["details"]["purpose"], "data_processing");

    // Grant consent over HTTP, then the export passes and is audited.
    let granted = app
        .authed_json(
            &session,
            IP,
            "POST",
            "/consents",
            serde_json::json!({ "purpose": "data_processing" }),
        )
        .await;
    assert_eq!(granted.status(), StatusCode::CREATED);

    let allowed = app.authed_get(&session, IP, "/me/export").await;
    assert_eq!(allowed.status(), StatusCode::OK);
    let export = body_json(allowed).await;
    assert_eq!(export["user_id"], user_id.to_string());

    let exports = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            user_id: Some(user_id),
            action: Some(SecurityAction::DataExport),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(exports.len(), 1);

    // Revocation closes the route again.
    let revoked = app
        .authed_json(
            &session,
            IP,
            "DELETE",
            "/consents/data_processing",
            serde_json::json!({}),
        )
        .await;
    assert_eq!(revoked.status(), StatusCode::NO_CONTENT);

    let denied = app.authed_get(&session, IP, "/me/export").await;
    assert_eq!(denied.status(), StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS);
}

#[tokio::test]
async fn expired_consent_reads_as_absent() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    // A consent whose retention window has already passed.
    let mut stale = DataConsent::new(user_id, ConsentPurpose::Analytics, "consent", 30);
    stale.granted_utc = Utc::now() - Duration::days(31);
    app.store.upsert_consent(&stale).await.unwrap();

    let active = app
        .state
        .consent
        .active_consent(user_id, ConsentPurpose::Analytics)
        .await
        .unwrap();
    assert!(active.is_none());

    // Re-granting restarts the retention window.
    app.state
        .consent
        .grant_consent(user_id, ConsentPurpose::Analytics, "consent", 30)
        .await
        .unwrap();
    assert!(app
        .state
        .consent
        .active_consent(user_id, ConsentPurpose::Analytics)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn consents_are_tracked_per_purpose() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    app.state
        .consent
        .grant_consent(user_id, ConsentPurpose::Marketing, "consent", 365)
        .await
        .unwrap();

    assert!(app
        .state
        .consent
        .active_consent(user_id, ConsentPurpose::Marketing)
        .await
        .unwrap()
        .is_some());
    assert!(app
        .state
        .consent
        .active_consent(user_id, ConsentPurpose::Analytics)
        .await
        .unwrap()
        .is_none());

    // Revoking an absent consent reports false without erroring.
    assert!(!app
        .state
        .consent
        .revoke_consent(user_id, ConsentPurpose::Analytics)
        .await
        .unwrap());
}

#[tokio::test]
async fn unknown_purpose_in_the_path_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let session = app.create_session(user_id, IP).await;

    let response = app
        .authed_json(
            &session,
            IP,
            "DELETE",
            "/consents/telepathy",
            serde_json::json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
