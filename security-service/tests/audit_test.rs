//! Audit logging, risk scoring, brute-force detection and alerting tests.

mod common;

use chrono::Utc;
use common::TestApp;
use security_service::models::{
    EventSeverity, RiskLevel, SecurityAction, SecurityEventType,
};
use security_service::store::{AuditLogFilter, SecurityEventFilter, SecurityStore};
use uuid::Uuid;

#[tokio::test]
async fn five_failures_from_one_ip_produce_exactly_one_brute_force_event() {
    let app = TestApp::spawn().await;

    for _ in 0..4 {
        app.state
            .audit
            .log_failed_login(None, "victim@example.com", "203.0.113.9", "curl", "bad password")
            .await
            .unwrap();
    }
    let filter = SecurityEventFilter {
        event_type: Some(SecurityEventType::BruteForceAttempt),
        ..Default::default()
    };
    assert!(app
        .state
        .audit
        .get_security_events(&filter)
        .await
        .unwrap()
        .is_empty());

    // The fifth failure trips the signal.
    app.state
        .audit
        .log_failed_login(None, "victim@example.com", "203.0.113.9", "curl", "bad password")
        .await
        .unwrap();
    let events = app.state.audit.get_security_events(&filter).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, EventSeverity::High);
    assert_eq!(events[0].ip_address.as_deref(), Some("203.0.113.9"));

    // Further failures in the same window do not re-fire.
    for _ in 0..3 {
        app.state
            .audit
            .log_failed_login(None, "victim@example.com", "203.0.113.9", "curl", "bad password")
            .await
            .unwrap();
    }
    assert_eq!(
        app.state.audit.get_security_events(&filter).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn brute_force_signal_retriggers_on_a_fresh_window() {
    let app = TestApp::spawn().await;
    let filter = SecurityEventFilter {
        event_type: Some(SecurityEventType::BruteForceAttempt),
        ..Default::default()
    };

    for _ in 0..5 {
        app.state
            .audit
            .log_failed_login(None, "victim@example.com", "203.0.113.9", "curl", "bad password")
            .await
            .unwrap();
    }
    assert_eq!(
        app.state.audit.get_security_events(&filter).await.unwrap().len(),
        1
    );

    // Age the existing failures out of the rolling window.
    app.store.purge_audit_logs_before(Utc::now()).await.unwrap();

    for _ in 0..5 {
        app.state
            .audit
            .log_failed_login(None, "victim@example.com", "203.0.113.9", "curl", "bad password")
            .await
            .unwrap();
    }
    assert_eq!(
        app.state.audit.get_security_events(&filter).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn failures_from_distinct_ips_do_not_aggregate() {
    let app = TestApp::spawn().await;

    for i in 0..5 {
        let ip = format!("203.0.113.{}", i);
        app.state
            .audit
            .log_failed_login(None, "victim@example.com", &ip, "curl", "bad password")
            .await
            .unwrap();
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
    assert!(events.is_empty());
}

#[tokio::test]
async fn failed_login_bumps_the_profile_counter_when_attributed() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    for _ in 0..3 {
        app.state
            .audit
            .log_failed_login(
                Some(user_id),
                "victim@example.com",
                "203.0.113.9",
                "curl",
                "bad password",
            )
            .await
            .unwrap();
    }
    let profile = app.state.sessions.profile(user_id).await.unwrap();
    assert_eq!(profile.failed_login_count, 3);

    // A successful login resets the counter.
    app.state
        .sessions
        .create_session(user_id, "10.0.0.1", "test-agent", 30)
        .await
        .unwrap();
    let profile = app.state.sessions.profile(user_id).await.unwrap();
    assert_eq!(profile.failed_login_count, 0);
}

#[tokio::test]
async fn high_risk_actions_synthesize_a_suspicious_activity_event() {
    let app = TestApp::spawn().await;
    let admin_id = Uuid::new_v4();

    let log = app
        .state
        .audit
        .log_security_action(
            Some(admin_id),
            SecurityAction::AdminAction,
            "config:retention",
            "10.0.0.9",
            "admin-ui",
            true,
            None,
        )
        .await
        .unwrap();
    assert_eq!(log.risk_level, RiskLevel::High);

    let events = app
        .state
        .audit
        .get_security_events(&SecurityEventFilter {
            event_type: Some(SecurityEventType::SuspiciousActivity),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, Some(admin_id));

    // Low-risk actions do not.
    app.state
        .audit
        .log_security_action(
            Some(admin_id),
            SecurityAction::Logout,
            "auth:logout",
            "10.0.0.9",
            "admin-ui",
            true,
            None,
        )
        .await
        .unwrap();
    assert_eq!(
        app.state
            .audit
            .get_security_events(&SecurityEventFilter {
                event_type: Some(SecurityEventType::SuspiciousActivity),
                ..Default::default()
            })
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn critical_events_write_a_durable_alert() {
    let app = TestApp::spawn().await;

    let event = app
        .state
        .audit
        .create_security_event(
            SecurityEventType::AnomalousBehavior,
            EventSeverity::Critical,
            None,
            Some("203.0.113.9".to_string()),
            "Impossible travel between logins",
            None,
        )
        .await
        .unwrap();

    let alerts = app.state.audit.unacknowledged_alerts(10).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].event_id, event.event_id);
    assert!(!alerts[0].acknowledged);

    assert!(app
        .state
        .audit
        .acknowledge_alert(alerts[0].alert_id)
        .await
        .unwrap());
    assert!(app.state.audit.unacknowledged_alerts(10).await.unwrap().is_empty());

    // Unknown alerts report as absent rather than erroring.
    assert!(!app.state.audit.acknowledge_alert(Uuid::new_v4()).await.unwrap());

    // Sub-critical events do not create alerts.
    app.state
        .audit
        .create_security_event(
            SecurityEventType::AnomalousBehavior,
            EventSeverity::High,
            None,
            None,
            "Odd but not critical",
            None,
        )
        .await
        .unwrap();
    assert!(app.state.audit.unacknowledged_alerts(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn audit_queries_filter_and_order_newest_first() {
    let app = TestApp::spawn().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    for (user, action) in [
        (alice, SecurityAction::Login),
        (bob, SecurityAction::Login),
        (alice, SecurityAction::DataAccess),
        (alice, SecurityAction::Logout),
    ] {
        app.state
            .audit
            .log_security_action(Some(user), action, "test", "10.0.0.1", "agent", true, None)
            .await
            .unwrap();
    }

    let alice_logs = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            user_id: Some(alice),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(alice_logs.len(), 3);
    for pair in alice_logs.windows(2) {
        assert!(pair[0].created_utc >= pair[1].created_utc);
    }

    let logins = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            action: Some(SecurityAction::Login),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(logins.len(), 2);

    let limited = app
        .state
        .audit
        .get_audit_logs(&AuditLogFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}
