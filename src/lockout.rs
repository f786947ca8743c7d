//! Per-account failed-attempt counting and time-boxed lockout.
//!
//! The lock state lives on the [`User`] record; this module owns the
//! transitions. Callers must hold the per-user lock while registering
//! outcomes so concurrent logins cannot under- or over-count failures.

use chrono::{DateTime, Duration, Utc};

use crate::config::AuthConfig;
use crate::models::{User, UserStatus};

/// Lock state observed at the start of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Clear,
    /// Still inside the lockout window; reject without touching the verifier.
    Locked { minutes_remaining: i64 },
}

/// Result of recording a failed authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// The failure tripped the threshold and the account is now locked.
    pub locked_now: bool,
    pub remaining_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct LockoutTracker {
    max_attempts: u32,
    lockout_minutes: i64,
}

impl LockoutTracker {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            max_attempts: config.max_login_attempts(),
            lockout_minutes: config.lockout_minutes(),
        }
    }

    /// Inspect the lock state without mutating it. An elapsed `locked_until`
    /// reads as `Clear` (lazy unlock); the stored status is corrected on the
    /// next state-changing call.
    #[must_use]
    pub fn check(&self, user: &User, now: DateTime<Utc>) -> LockState {
        if user.status != UserStatus::Locked {
            return LockState::Clear;
        }
        match user.locked_until {
            Some(until) if until > now => LockState::Locked {
                minutes_remaining: minutes_remaining(until, now),
            },
            _ => LockState::Clear,
        }
    }

    /// Record a failed authentication; locks the account when the new count
    /// reaches the threshold.
    pub fn register_failure(&self, user: &mut User, now: DateTime<Utc>) -> FailureOutcome {
        user.failed_login_attempts = user.failed_login_attempts.saturating_add(1);

        if self.max_attempts > 0 && user.failed_login_attempts >= self.max_attempts {
            user.status = UserStatus::Locked;
            user.locked_until = Some(now + Duration::minutes(self.lockout_minutes));
            return FailureOutcome {
                locked_now: true,
                remaining_attempts: 0,
            };
        }

        FailureOutcome {
            locked_now: false,
            remaining_attempts: self.max_attempts.saturating_sub(user.failed_login_attempts),
        }
    }

    /// Record a successful authentication: counters reset to zero exactly here,
    /// and an expired lock transitions back to `Active`.
    pub fn register_success(&self, user: &mut User) {
        user.failed_login_attempts = 0;
        user.locked_until = None;
        if user.status == UserStatus::Locked {
            user.status = UserStatus::Active;
        }
    }

    /// Administrative unlock, independent of elapsed time.
    pub fn unlock(&self, user: &mut User) {
        user.failed_login_attempts = 0;
        user.locked_until = None;
        if user.status == UserStatus::Locked {
            user.status = UserStatus::Active;
        }
    }
}

/// Whole minutes remaining, rounded up so "under a minute" reads as 1.
fn minutes_remaining(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (until - now).num_seconds().max(0);
    (seconds + 59) / 60
}
