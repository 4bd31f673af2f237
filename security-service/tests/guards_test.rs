//! Guard and end-to-end flow tests over the HTTP surface.

mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use chrono::Utc;
use common::{body_json, TestApp};
use security_service::models::{Permission, Role, SecurityAction};
use security_service::store::AuditLogFilter;
use security_service::totp::Totp;
use uuid::Uuid;

const IP: &str = "10.1.1.1";

#[tokio::test]
async fn unauthenticated_requests_are_denied_with_a_structured_401() {
    let app = TestApp::spawn().await;

    let response = app
        .request(Request::builder().uri("/me").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(body["error"]["message"].is_string());
    assert!(body["error"]["request_id"].is_string());
    assert!(body["error"]["timestamp"].is_string());
}

#[tokio::test]
async fn a_garbage_session_token_is_rejected() {
    let app = TestApp::spawn().await;
    let response = app.authed_get("deadbeef", IP, "/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn internal_routes_reject_a_wrong_service_key() {
    let app = TestApp::spawn().await;

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/internal/sessions")
                .header("content-type", "application/json")
                .header("x-internal-api-key", "wrong-key")
                .body(Body::from(
                    serde_json::json!({ "user_id": Uuid::new_v4() }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn permission_guard_denies_with_403_and_audits_the_denial() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let session = app.create_session(user_id, IP).await;

    // A customer cannot read audit logs.
    let response = app.authed_get(&session, IP, "/admin/audit-logs").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let denials = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            user_id: Some(user_id),
            action: Some(SecurityAction::UnauthorizedAccess),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(denials.len(), 1);
    assert!(!denials[0].success);
    assert_eq!(denials[0].resource, "/admin/audit-logs");
}

#[tokio::test]
async fn role_guard_requires_the_exact_role() {
    let app = TestApp::spawn().await;
    let actor = Uuid::new_v4();

    // An admin holds every admin permission but is not a super-admin, and
    // the role guard does not cascade.
    let admin = Uuid::new_v4();
    app.state
        .rbac
        .assign_role(admin, Role::Admin, actor, IP, "test")
        .await
        .unwrap();
    let admin_session = app.create_session(admin, IP).await;
    let response = app
        .authed_json(&admin_session, IP, "POST", "/admin/maintenance/cleanup", serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let super_admin = Uuid::new_v4();
    app.state
        .rbac
        .assign_role(super_admin, Role::SuperAdmin, actor, IP, "test")
        .await
        .unwrap();
    let super_session = app.create_session(super_admin, IP).await;
    let response = app
        .authed_json(&super_session, IP, "POST", "/admin/maintenance/cleanup", serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert!(report["expired_sessions"].is_number());
}

#[tokio::test]
async fn admin_with_capability_reads_audit_logs() {
    let app = TestApp::spawn().await;
    let actor = Uuid::new_v4();
    let admin = Uuid::new_v4();
    app.state
        .rbac
        .assign_role(admin, Role::Admin, actor, IP, "test")
        .await
        .unwrap();

    let session = app.create_session(admin, IP).await;
    let response = app.authed_get(&session, IP, "/admin/audit-logs").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body.is_array());
}

#[tokio::test]
async fn mfa_guard_denies_until_the_session_passes_a_challenge() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let session = app.create_session(user_id, IP).await;

    // Enroll and enable MFA over HTTP.
    let setup = app
        .authed_json(&session, IP, "POST", "/auth/mfa/setup", serde_json::json!({}))
        .await;
    assert_eq!(setup.status(), StatusCode::OK);
    let setup_body = body_json(setup).await;
    let secret_base32 = setup_body["secret_base32"].as_str().unwrap().to_string();

    let secret = Totp::decode_secret(&secret_base32).unwrap();
    let code = Totp::code_at(&secret, Utc::now().timestamp());
    let enable = app
        .authed_json(
            &session,
            IP,
            "POST",
            "/auth/mfa/enable",
            serde_json::json!({ "secret_base32": secret_base32, "code": code }),
        )
        .await;
    assert_eq!(enable.status(), StatusCode::OK);
    let backup_codes = body_json(enable).await["backup_codes"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(backup_codes, 10);

    // The session predates verification: the MFA-guarded route denies.
    let denied = app
        .authed_json(&session, IP, "POST", "/auth/mfa/backup-codes", serde_json::json!({}))
        .await;
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(denied).await["error"]["code"], "MFA_REQUIRED");

    // Pass the challenge with a current TOTP code.
    let code = Totp::code_at(&secret, Utc::now().timestamp());
    let challenge = app
        .authed_json(
            &session,
            IP,
            "POST",
            "/auth/mfa/challenge",
            serde_json::json!({ "code": code }),
        )
        .await;
    assert_eq!(challenge.status(), StatusCode::OK);
    let challenge_body = body_json(challenge).await;
    assert_eq!(challenge_body["verified"], true);
    assert_eq!(challenge_body["method"], "totp");

    // Same route, same session: pass-through now.
    let allowed = app
        .authed_json(&session, IP, "POST", "/auth/mfa/backup-codes", serde_json::json!({}))
        .await;
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn fresh_sessions_start_mfa_unverified_even_when_enrolled() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    // Enroll via the service layer.
    let enrollment = app.state.mfa.generate_enrollment("user@example.com");
    let secret = Totp::decode_secret(&enrollment.secret_base32).unwrap();
    app.state
        .mfa
        .enable_mfa(
            user_id,
            &enrollment.secret_base32,
            &Totp::code_at(&secret, Utc::now().timestamp()),
            IP,
            "test",
        )
        .await
        .unwrap();

    // A new session reports that MFA is still required.
    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/internal/sessions")
                .header("content-type", "application/json")
                .header("x-internal-api-key", common::TEST_INTERNAL_KEY)
                .header("x-forwarded-for", IP)
                .body(Body::from(
                    serde_json::json!({ "user_id": user_id }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["mfa_required"], true);
}

#[tokio::test]
async fn admin_grants_data_export_end_to_end() {
    let app = TestApp::spawn().await;
    let actor = Uuid::new_v4();
    let admin = Uuid::new_v4();
    let target = Uuid::new_v4();
    app.state
        .rbac
        .assign_role(admin, Role::Admin, actor, IP, "test")
        .await
        .unwrap();

    let session = app.create_session(admin, IP).await;
    let response = app
        .authed_json(
            &session,
            IP,
            "POST",
            &format!("/admin/users/{}/permissions", target),
            serde_json::json!({ "permission": "data_export" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The grant is audited against the admin, targeting the user.
    let grants = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            action: Some(SecurityAction::PermissionGrant),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].user_id, Some(admin));
    assert_eq!(grants[0].resource, format!("user:{}", target));

    assert!(app
        .state
        .rbac
        .has_permission(target, Permission::DataExport)
        .await
        .unwrap());
}

#[tokio::test]
async fn logout_invalidates_the_session_and_audits() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let session = app.create_session(user_id, IP).await;

    let response = app
        .authed_json(&session, IP, "POST", "/auth/logout", serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The session is gone.
    let after = app.authed_get(&session, IP, "/me").await;
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    let logs = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            user_id: Some(user_id),
            action: Some(SecurityAction::Logout),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn password_change_report_invalidates_other_sessions() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let keep = app.create_session(user_id, IP).await;
    let other = app.create_session(user_id, IP).await;

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/internal/password-changes")
                .header("content-type", "application/json")
                .header("x-internal-api-key", common::TEST_INTERNAL_KEY)
                .header("x-forwarded-for", IP)
                .body(Body::from(
                    serde_json::json!({ "user_id": user_id, "keep_session_id": keep })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // The originating session survives, every other one is gone.
    assert_eq!(app.authed_get(&keep, IP, "/me").await.status(), StatusCode::OK);
    assert_eq!(
        app.authed_get(&other, IP, "/me").await.status(),
        StatusCode::UNAUTHORIZED
    );

    let profile = app.state.sessions.profile(user_id).await.unwrap();
    assert!(profile.password_changed_utc.is_some());

    let logs = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            user_id: Some(user_id),
            action: Some(SecurityAction::PasswordChange),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn external_actions_are_recorded_with_computed_risk() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let response = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/internal/audit-events")
                .header("content-type", "application/json")
                .header("x-internal-api-key", common::TEST_INTERNAL_KEY)
                .header("x-forwarded-for", IP)
                .body(Body::from(
                    serde_json::json!({
                        "user_id": user_id,
                        "action": "data_deletion",
                        "resource": "order:42",
                        "success": true,
                        "note": "customer requested erasure"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["risk_level"], "high");

    let logs = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            user_id: Some(user_id),
            action: Some(SecurityAction::DataDeletion),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].resource, "order:42");
}

#[tokio::test]
async fn me_reports_role_and_effective_permissions() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();
    let session = app.create_session(user_id, IP).await;

    let response = app.authed_get(&session, IP, "/me").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["role"], "customer");
    assert_eq!(body["mfa_verified"], false);
    let permissions: Vec<String> = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p.as_str().unwrap().to_string())
        .collect();
    assert!(permissions.contains(&"view_own_data".to_string()));
    assert!(!permissions.contains(&"data_export".to_string()));
}
