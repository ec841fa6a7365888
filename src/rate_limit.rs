//! Keyed fixed-window rate limiting for sensitive auth actions.
//!
//! Call sites combine two independent limiter instances per action: login is
//! limited per-email and per-IP, registration and password-reset requests
//! per-IP. A successful action resets its counters.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::warn;

// ============================================================================
// Limits per sensitive action
// ============================================================================

/// Failed login attempts per email address before lockout
pub const LOGIN_MAX_ATTEMPTS_PER_EMAIL: u32 = 5;

/// Failed login attempts per IP before lockout
pub const LOGIN_MAX_ATTEMPTS_PER_IP: u32 = 10;

/// Registrations per IP within a window
pub const REGISTER_MAX_ATTEMPTS_PER_IP: u32 = 5;

/// Password-reset requests per IP within a window
pub const RESET_REQUEST_MAX_ATTEMPTS_PER_IP: u32 = 3;

/// Window applied to all auth actions
pub const AUTH_WINDOW_MINUTES: u64 = 15;

#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub message: Option<String>,
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            message: None,
            retry_after: None,
        }
    }

    fn deny(retry_after: Duration) -> Self {
        let minutes = (retry_after.as_secs() + 59) / 60;
        Self {
            allowed: false,
            message: Some(format!(
                "Too many attempts. Please try again in {} minute{}.",
                minutes,
                if minutes == 1 { "" } else { "s" }
            )),
            retry_after: Some(retry_after),
        }
    }
}

struct AttemptWindow {
    count: u32,
    window_start: SystemTime,
}

/// One limiter instance tracks one key dimension (e.g. "login by email").
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    entries: Mutex<HashMap<String, AttemptWindow>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window_minutes: u64) -> Self {
        Self {
            max_attempts,
            window: Duration::from_secs(window_minutes * 60),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether an attempt keyed by `key` is currently allowed.
    /// An expired window resets the counter before the check, so the first
    /// attempt of a new window is always allowed.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, SystemTime::now())
    }

    /// Records a failed attempt for `key`.
    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, SystemTime::now())
    }

    /// Clears the counter for `key`, used after a successful action.
    pub fn reset(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }

    pub fn check_at(&self, key: &str, now: SystemTime) -> RateLimitDecision {
        let mut entries = self.entries.lock().unwrap();
        let entry = match entries.get_mut(key) {
            Some(entry) => entry,
            None => return RateLimitDecision::allow(),
        };

        let elapsed = now
            .duration_since(entry.window_start)
            .unwrap_or(Duration::ZERO);
        if elapsed > self.window {
            entry.count = 0;
            entry.window_start = now;
            return RateLimitDecision::allow();
        }

        if entry.count >= self.max_attempts {
            let retry_after = self.window.saturating_sub(elapsed);
            warn!(
                "Rate limit exceeded for key {} ({} attempts in window)",
                key, entry.count
            );
            return RateLimitDecision::deny(retry_after);
        }

        RateLimitDecision::allow()
    }

    pub fn record_failure_at(&self, key: &str, now: SystemTime) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.to_string()).or_insert(AttemptWindow {
            count: 0,
            window_start: now,
        });

        let elapsed = now
            .duration_since(entry.window_start)
            .unwrap_or(Duration::ZERO);
        if elapsed > self.window {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count += 1;
    }

    #[cfg(test)]
    fn attempt_count(&self, key: &str) -> u32 {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|e| e.count)
            .unwrap_or(0)
    }
}

/// The limiter instances the auth routes combine per action.
pub struct AuthRateLimits {
    pub login_email: RateLimiter,
    pub login_ip: RateLimiter,
    pub register_ip: RateLimiter,
    pub reset_request_ip: RateLimiter,
}

impl Default for AuthRateLimits {
    fn default() -> Self {
        Self {
            login_email: RateLimiter::new(LOGIN_MAX_ATTEMPTS_PER_EMAIL, AUTH_WINDOW_MINUTES),
            login_ip: RateLimiter::new(LOGIN_MAX_ATTEMPTS_PER_IP, AUTH_WINDOW_MINUTES),
            register_ip: RateLimiter::new(REGISTER_MAX_ATTEMPTS_PER_IP, AUTH_WINDOW_MINUTES),
            reset_request_ip: RateLimiter::new(
                RESET_REQUEST_MAX_ATTEMPTS_PER_IP,
                AUTH_WINDOW_MINUTES,
            ),
        }
    }
}
