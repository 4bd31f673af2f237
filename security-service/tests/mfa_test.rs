//! MFA service integration tests.

mod common;

use chrono::Utc;
use common::TestApp;
use security_service::models::MfaMethod;
use security_service::services::ServiceError;
use security_service::totp::Totp;
use uuid::Uuid;

fn current_code(secret_base32: &str) -> String {
    let secret = Totp::decode_secret(secret_base32).unwrap();
    Totp::code_at(&secret, Utc::now().timestamp())
}

#[tokio::test]
async fn enrollment_flow_enables_mfa_and_issues_backup_codes() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let enrollment = app.state.mfa.generate_enrollment("user@example.com");
    assert!(enrollment
        .provisioning_uri
        .contains(&enrollment.secret_base32));

    let backup_codes = app
        .state
        .mfa
        .enable_mfa(
            user_id,
            &enrollment.secret_base32,
            &current_code(&enrollment.secret_base32),
            "10.0.0.1",
            "test-agent",
        )
        .await
        .unwrap();
    assert_eq!(backup_codes.len(), 10);

    let profile = app.state.sessions.profile(user_id).await.unwrap();
    assert!(profile.mfa_enabled);
    assert!(profile.mfa_secret.is_some());
    assert_eq!(profile.backup_code_hashes.len(), 10);

    // The sealed secret at rest is not the raw secret.
    let raw = Totp::decode_secret(&enrollment.secret_base32).unwrap();
    assert_ne!(profile.mfa_secret.unwrap(), raw);
}

#[tokio::test]
async fn enable_rejects_a_wrong_code() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let enrollment = app.state.mfa.generate_enrollment("user@example.com");
    let result = app
        .state
        .mfa
        .enable_mfa(
            user_id,
            &enrollment.secret_base32,
            "000000",
            "10.0.0.1",
            "test-agent",
        )
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidCode)));

    let profile = app.state.sessions.profile(user_id).await.unwrap();
    assert!(!profile.mfa_enabled);
}

#[tokio::test]
async fn challenge_accepts_totp_then_backup_code() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let enrollment = app.state.mfa.generate_enrollment("user@example.com");
    let backup_codes = app
        .state
        .mfa
        .enable_mfa(
            user_id,
            &enrollment.secret_base32,
            &current_code(&enrollment.secret_base32),
            "10.0.0.1",
            "test-agent",
        )
        .await
        .unwrap();

    let method = app
        .state
        .mfa
        .verify_challenge(
            user_id,
            &current_code(&enrollment.secret_base32),
            "10.0.0.1",
            "test-agent",
        )
        .await
        .unwrap();
    assert_eq!(method, MfaMethod::Totp);

    let method = app
        .state
        .mfa
        .verify_challenge(user_id, &backup_codes[0], "10.0.0.1", "test-agent")
        .await
        .unwrap();
    assert_eq!(method, MfaMethod::BackupCode);
}

#[tokio::test]
async fn backup_codes_are_single_use() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let enrollment = app.state.mfa.generate_enrollment("user@example.com");
    let backup_codes = app
        .state
        .mfa
        .enable_mfa(
            user_id,
            &enrollment.secret_base32,
            &current_code(&enrollment.secret_base32),
            "10.0.0.1",
            "test-agent",
        )
        .await
        .unwrap();

    // Case-insensitive on first use, then permanently consumed.
    let lowercased = backup_codes[0].to_ascii_lowercase();
    assert!(app
        .state
        .mfa
        .verify_backup_code(user_id, &lowercased)
        .await
        .unwrap());
    assert!(!app
        .state
        .mfa
        .verify_backup_code(user_id, &backup_codes[0])
        .await
        .unwrap());

    let profile = app.state.sessions.profile(user_id).await.unwrap();
    assert_eq!(profile.backup_code_hashes.len(), 9);
}

#[tokio::test]
async fn disable_clears_secret_and_backup_codes_together() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let enrollment = app.state.mfa.generate_enrollment("user@example.com");
    app.state
        .mfa
        .enable_mfa(
            user_id,
            &enrollment.secret_base32,
            &current_code(&enrollment.secret_base32),
            "10.0.0.1",
            "test-agent",
        )
        .await
        .unwrap();

    app.state
        .mfa
        .disable_mfa(user_id, "10.0.0.1", "test-agent")
        .await
        .unwrap();

    let profile = app.state.sessions.profile(user_id).await.unwrap();
    assert!(!profile.mfa_enabled);
    assert!(profile.mfa_secret.is_none());
    assert!(profile.backup_code_hashes.is_empty());

    // Disabling again is a no-op.
    app.state
        .mfa
        .disable_mfa(user_id, "10.0.0.1", "test-agent")
        .await
        .unwrap();

    // Challenges fail once MFA is off.
    let result = app
        .state
        .mfa
        .verify_challenge(user_id, "123456", "10.0.0.1", "test-agent")
        .await;
    assert!(matches!(result, Err(ServiceError::MfaNotEnabled)));
}

#[tokio::test]
async fn double_enable_is_rejected() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let enrollment = app.state.mfa.generate_enrollment("user@example.com");
    app.state
        .mfa
        .enable_mfa(
            user_id,
            &enrollment.secret_base32,
            &current_code(&enrollment.secret_base32),
            "10.0.0.1",
            "test-agent",
        )
        .await
        .unwrap();

    let second = app.state.mfa.generate_enrollment("user@example.com");
    let result = app
        .state
        .mfa
        .enable_mfa(
            user_id,
            &second.secret_base32,
            &current_code(&second.secret_base32),
            "10.0.0.1",
            "test-agent",
        )
        .await;
    assert!(matches!(result, Err(ServiceError::MfaAlreadyEnabled)));
}
