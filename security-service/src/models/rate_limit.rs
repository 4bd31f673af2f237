//! Rate limit counter records.

use chrono::{DateTime, Duration, Utc};

/// Window counter for one `(client, route)` key.
///
/// The window resets lazily: the first request observed after `reset_utc`
/// starts a fresh window instead of relying on a background timer.
#[derive(Debug, Clone)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_utc: DateTime<Utc>,
}

impl RateLimitRecord {
    pub fn new_window(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 1,
            reset_utc: now + window,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_utc
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window (0 when denied).
    pub remaining: u32,
    /// Seconds until the window resets; the `Retry-After` hint on denial.
    pub retry_after_seconds: u64,
    /// True on the first denied request of a window; drives one security
    /// event per window instead of one per denied request.
    pub just_exceeded: bool,
}
