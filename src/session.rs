//! Session admission policy and inactivity enforcement.
//!
//! Admission runs after credentials verify and before any session row is
//! written: the single-session-role check first, then the concurrency cap
//! (documented order). Callers must hold the per-user lock so two concurrent
//! logins cannot both observe "under the cap", and must serialize guarded-role
//! admissions with each other so two holders cannot both pass the exclusivity
//! check before either session row lands.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::config::{AuthConfig, SingleSessionBehavior};
use crate::error::AuthError;
use crate::models::{Session, User};
use crate::store::{SessionStore, UserStore};

pub const REASON_EVICTED: &str = "evicted by new login";
pub const REASON_CONCURRENT_LIMIT: &str = "exceeded concurrent session limit";
pub const REASON_INACTIVITY: &str = "inactivity timeout";

/// A session revoked during admission, reported for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub reason: &'static str,
}

/// Result of the inactivity check performed on token validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityCheck {
    /// Session remains valid; `last_activity_at` was refreshed if tracking is on.
    Current,
    /// Session exceeded the inactivity window and was revoked.
    TimedOut,
}

pub struct SessionPolicyEngine {
    config: Arc<AuthConfig>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
}

impl SessionPolicyEngine {
    #[must_use]
    pub fn new(
        config: Arc<AuthConfig>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            config,
            users,
            sessions,
        }
    }

    /// Evaluate admission for a verified login. On success returns the
    /// sessions revoked to make room; on conflict no session is touched and
    /// the login must abort.
    pub async fn admit(&self, user: &User, now: DateTime<Utc>) -> Result<Vec<Eviction>, AuthError> {
        let mut evictions = self.check_single_session_roles(user, now).await?;
        evictions.extend(self.enforce_concurrency_cap(user, now).await?);
        Ok(evictions)
    }

    /// Single-session-role exclusivity: at most one active holder system-wide.
    async fn check_single_session_roles(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Vec<Eviction>, AuthError> {
        let guarded: Vec<&String> = self
            .config
            .single_session_roles()
            .iter()
            .filter(|role| user.holds_role(role))
            .collect();
        if guarded.is_empty() {
            return Ok(Vec::new());
        }

        let active = self
            .sessions
            .active_sessions(now)
            .await
            .map_err(AuthError::Internal)?;
        let mut owners: HashMap<Uuid, Option<User>> = HashMap::new();
        let mut evictions = Vec::new();

        for session in &active {
            if session.user_id == user.id {
                continue;
            }
            let owner = match owners.get(&session.user_id) {
                Some(cached) => cached.clone(),
                None => {
                    let fetched = self
                        .users
                        .find_by_id(session.user_id)
                        .await
                        .map_err(AuthError::Internal)?;
                    owners.insert(session.user_id, fetched.clone());
                    fetched
                }
            };
            let Some(owner) = owner else { continue };
            if !guarded.iter().any(|role| owner.holds_role(role)) {
                continue;
            }

            match self.config.single_session_behavior() {
                SingleSessionBehavior::Reject => {
                    return Err(AuthError::SessionConflict {
                        occupying_user: owner.username,
                    });
                }
                SingleSessionBehavior::Force => {
                    self.sessions
                        .revoke(session.id, REASON_EVICTED, now)
                        .await
                        .map_err(AuthError::Internal)?;
                    warn!(
                        session = %session.id,
                        evicted_user = %owner.username,
                        new_user = %user.username,
                        "single-session role eviction"
                    );
                    evictions.push(Eviction {
                        session_id: session.id,
                        user_id: session.user_id,
                        username: owner.username,
                        reason: REASON_EVICTED,
                    });
                }
            }
        }

        Ok(evictions)
    }

    /// Concurrency cap: revoke the oldest active sessions until admitting one
    /// more respects the configured maximum.
    async fn enforce_concurrency_cap(
        &self,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Vec<Eviction>, AuthError> {
        let max = self.config.max_concurrent_sessions();
        if max == 0 {
            return Ok(Vec::new());
        }

        let active = self
            .sessions
            .active_for_user(user.id, now)
            .await
            .map_err(AuthError::Internal)?;
        let cap = max as usize;
        if active.len() < cap {
            return Ok(Vec::new());
        }

        // Oldest first; keep cap-1 so the incoming session fits.
        let excess = active.len() + 1 - cap;
        let mut evictions = Vec::with_capacity(excess);
        for session in active.into_iter().take(excess) {
            self.sessions
                .revoke(session.id, REASON_CONCURRENT_LIMIT, now)
                .await
                .map_err(AuthError::Internal)?;
            evictions.push(Eviction {
                session_id: session.id,
                user_id: session.user_id,
                username: user.username.clone(),
                reason: REASON_CONCURRENT_LIMIT,
            });
        }
        Ok(evictions)
    }

    /// Inactivity check, executed on every token validation. Revokes the
    /// session when the idle window is exceeded; otherwise refreshes
    /// `last_activity_at` when tracking is enabled (last-write-wins under
    /// concurrent requests, an accepted relaxation).
    pub async fn check_activity(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<ActivityCheck, AuthError> {
        let timeout = self.config.inactivity_timeout_minutes();
        if timeout > 0 && now - session.last_activity_at > Duration::minutes(timeout) {
            self.sessions
                .revoke(session.id, REASON_INACTIVITY, now)
                .await
                .map_err(AuthError::Internal)?;
            return Ok(ActivityCheck::TimedOut);
        }
        if self.config.track_last_activity() {
            self.sessions
                .touch(session.id, now)
                .await
                .map_err(AuthError::Internal)?;
        }
        Ok(ActivityCheck::Current)
    }
}
