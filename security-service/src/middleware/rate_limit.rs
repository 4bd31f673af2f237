//! Window rate limiting keyed by `(client IP, path)`.
//!
//! The counter map is process-local; horizontally scaled deployments get
//! independent limits per instance, which makes this a soft deterrent
//! rather than a hard guarantee. Windows reset lazily on the first request
//! after the reset time.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use service_core::error::ErrorBody;
use service_core::middleware::tracing::request_id_of;

use crate::config::RateLimitConfig;
use crate::models::{EventDetails, EventSeverity, RateLimitDecision, RateLimitRecord, SecurityEventType};
use crate::AppState;

use super::auth::client_ip;

/// Lazily-resetting window counter over a concurrent key map.
pub struct WindowRateLimiter {
    counters: DashMap<(String, String), RateLimitRecord>,
    max_requests: u32,
    window_minutes: i64,
}

impl WindowRateLimiter {
    pub fn new(max_requests: u32, window_minutes: i64) -> Arc<Self> {
        Arc::new(Self {
            counters: DashMap::new(),
            max_requests: max_requests.max(1),
            window_minutes: window_minutes.max(1),
        })
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_minutes(&self) -> i64 {
        self.window_minutes
    }

    pub fn check(&self, client: &str, path: &str) -> RateLimitDecision {
        self.check_at(client, path, Utc::now())
    }

    /// Count a request against the `(client, path)` window.
    pub fn check_at(&self, client: &str, path: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let window = Duration::minutes(self.window_minutes);
        let key = (client.to_string(), path.to_string());

        let mut entry = self
            .counters
            .entry(key)
            .or_insert_with(|| RateLimitRecord {
                count: 0,
                reset_utc: now + window,
            });

        if entry.is_expired_at(now) {
            *entry = RateLimitRecord::new_window(now, window);
        } else {
            entry.count += 1;
        }

        let remaining_ms = (entry.reset_utc - now).num_milliseconds().max(0);
        let retry_after_seconds = (remaining_ms as u64).div_ceil(1000);
        let allowed = entry.count <= self.max_requests;

        RateLimitDecision {
            allowed,
            remaining: self.max_requests.saturating_sub(entry.count),
            retry_after_seconds,
            just_exceeded: entry.count == self.max_requests + 1,
        }
    }

    /// Drop counters whose window has passed. Returns the number evicted.
    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> u64 {
        let before = self.counters.len();
        self.counters.retain(|_, record| !record.is_expired_at(now));
        (before - self.counters.len()) as u64
    }
}

/// The per-surface limiter instances carried in application state.
#[derive(Clone)]
pub struct RateLimiters {
    pub session_create: Arc<WindowRateLimiter>,
    pub login_failure: Arc<WindowRateLimiter>,
    pub mfa_challenge: Arc<WindowRateLimiter>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            session_create: WindowRateLimiter::new(
                config.session_max_requests,
                config.session_window_minutes,
            ),
            login_failure: WindowRateLimiter::new(
                config.login_failure_max_requests,
                config.login_failure_window_minutes,
            ),
            mfa_challenge: WindowRateLimiter::new(
                config.mfa_max_requests,
                config.mfa_window_minutes,
            ),
        }
    }

    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> u64 {
        self.session_create.evict_expired_at(now)
            + self.login_failure.evict_expired_at(now)
            + self.mfa_challenge.evict_expired_at(now)
    }
}

/// Deny with 429 + `Retry-After` once the window is exhausted; the first
/// denial of a window also records a brute-force security event.
pub async fn rate_limit_middleware(
    State((state, limiter)): State<(AppState, Arc<WindowRateLimiter>)>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_ip(&request).unwrap_or_else(|| "unknown".to_string());
    let path = request.uri().path().to_string();

    let decision = limiter.check(&client, &path);
    if decision.allowed {
        return next.run(request).await;
    }

    if decision.just_exceeded {
        if let Err(e) = state
            .audit
            .create_security_event(
                SecurityEventType::BruteForceAttempt,
                EventSeverity::Medium,
                None,
                Some(client.clone()),
                format!("Rate limit exceeded on {} from {}", path, client),
                Some(EventDetails::RateLimitExceeded {
                    path: path.clone(),
                    limit: limiter.max_requests(),
                    window_minutes: limiter.window_minutes(),
                }),
            )
            .await
        {
            tracing::error!(error = %e, "Failed to record rate-limit event");
        }
    }

    ErrorBody::new(
        "RATE_LIMITED",
        "Too many requests. Please try again later.",
    )
    .with_details(serde_json::json!({
        "retry_after_seconds": decision.retry_after_seconds
    }))
    .with_request_id(request_id_of(request.headers()))
    .into_response_with(
        StatusCode::TOO_MANY_REQUESTS,
        Some(decision.retry_after_seconds),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies_with_remaining_window() {
        let limiter = WindowRateLimiter::new(3, 1);
        let now = Utc::now();

        for i in 0..3 {
            let decision = limiter.check_at("10.0.0.1", "/auth/login", now);
            assert!(decision.allowed, "request {} should pass", i + 1);
        }

        let denied = limiter.check_at("10.0.0.1", "/auth/login", now);
        assert!(!denied.allowed);
        assert!(denied.just_exceeded);
        assert_eq!(denied.retry_after_seconds, 60);

        // Subsequent denials in the same window are not "just exceeded".
        let denied_again = limiter.check_at("10.0.0.1", "/auth/login", now);
        assert!(!denied_again.allowed);
        assert!(!denied_again.just_exceeded);
    }

    #[test]
    fn window_resets_lazily_after_expiry() {
        let limiter = WindowRateLimiter::new(2, 1);
        let now = Utc::now();

        assert!(limiter.check_at("10.0.0.1", "/x", now).allowed);
        assert!(limiter.check_at("10.0.0.1", "/x", now).allowed);
        assert!(!limiter.check_at("10.0.0.1", "/x", now).allowed);

        let later = now + Duration::seconds(61);
        let fresh = limiter.check_at("10.0.0.1", "/x", later);
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 1);
    }

    #[test]
    fn keys_are_independent_per_client_and_path() {
        let limiter = WindowRateLimiter::new(1, 1);
        let now = Utc::now();

        assert!(limiter.check_at("10.0.0.1", "/a", now).allowed);
        assert!(limiter.check_at("10.0.0.2", "/a", now).allowed);
        assert!(limiter.check_at("10.0.0.1", "/b", now).allowed);
        assert!(!limiter.check_at("10.0.0.1", "/a", now).allowed);
    }

    #[test]
    fn expired_counters_are_evicted() {
        let limiter = WindowRateLimiter::new(5, 1);
        let now = Utc::now();
        limiter.check_at("10.0.0.1", "/a", now);
        limiter.check_at("10.0.0.2", "/b", now);

        assert_eq!(limiter.evict_expired_at(now), 0);
        assert_eq!(limiter.evict_expired_at(now + Duration::minutes(2)), 2);
    }
}
