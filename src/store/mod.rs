//! Persistence and audit seams consumed by the facade and policy engine.
//!
//! The backing store is an external collaborator assumed to expose simple
//! CRUD with bounded latency; [`memory`] ships the reference implementation
//! used by tests and small single-process deployments.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{LoginAttempt, OriginMeta, Session, User};

/// Outcome when inserting a new user (username is case-insensitively unique).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    DuplicateUsername,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Lookup by normalized username (see [`crate::models::normalize_username`]).
    async fn find_by_username(&self, username_normalized: &str) -> anyhow::Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn insert(&self, user: User) -> anyhow::Result<InsertOutcome>;
    async fn update(&self, user: &User) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
    async fn list(&self) -> anyhow::Result<Vec<User>>;
    /// Append-only; attempts are never mutated after the fact.
    async fn record_attempt(&self, attempt: LoginAttempt) -> anyhow::Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Session>>;
    async fn find_by_refresh_hash(&self, refresh_hash: &str) -> anyhow::Result<Option<Session>>;
    /// Active sessions for one user, oldest first.
    async fn active_for_user(&self, user_id: Uuid, now: DateTime<Utc>)
        -> anyhow::Result<Vec<Session>>;
    /// All active sessions, oldest first. The policy engine scans this for the
    /// single-session-role check; small operator pools keep it cheap.
    async fn active_sessions(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Session>>;
    async fn list(&self, user_id: Option<Uuid>) -> anyhow::Result<Vec<Session>>;
    /// Revoke a session. Idempotent: revoking an already-revoked or missing
    /// session is a no-op returning `false`. Revocation is never undone.
    async fn revoke(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
    /// Revoke every active session for a user; returns how many were revoked.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
    /// Last-write-wins activity timestamp update.
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<()>;
    /// Retention housekeeping: hard-delete sessions that expired before the
    /// cutoff. Not required for correctness; expiry is evaluated lazily.
    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
    Warning,
    Error,
}

/// One security-relevant event for the append-only audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub category: String,
    pub action: String,
    pub result: AuditResult,
    pub details: Option<String>,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub origin: OriginMeta,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        action: impl Into<String>,
        result: AuditResult,
    ) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            result,
            details: None,
            user_id: None,
            username: None,
            origin: OriginMeta::default(),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn user(mut self, user_id: Uuid, username: impl Into<String>) -> Self {
        self.user_id = Some(user_id);
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: OriginMeta) -> Self {
        self.origin = origin;
        self
    }
}

/// Append-only audit sink seam. Recording must not fail the calling
/// operation; implementations handle their own delivery errors.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Audit sink that emits structured `tracing` events; the default when no
/// external trail is wired up.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        match event.result {
            AuditResult::Success => tracing::info!(
                category = %event.category,
                action = %event.action,
                user = event.username.as_deref().unwrap_or("-"),
                details = event.details.as_deref().unwrap_or(""),
                "audit"
            ),
            AuditResult::Failure | AuditResult::Warning => tracing::warn!(
                category = %event.category,
                action = %event.action,
                user = event.username.as_deref().unwrap_or("-"),
                details = event.details.as_deref().unwrap_or(""),
                "audit"
            ),
            AuditResult::Error => tracing::error!(
                category = %event.category,
                action = %event.action,
                user = event.username.as_deref().unwrap_or("-"),
                details = event.details.as_deref().unwrap_or(""),
                "audit"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_event_builder_sets_fields() {
        let user_id = Uuid::new_v4();
        let event = AuditEvent::new("auth", "login", AuditResult::Success)
            .user(user_id, "alice")
            .details("method=local")
            .origin(OriginMeta {
                ip: Some("203.0.113.10".to_string()),
                user_agent: Some("console/1.0".to_string()),
            });
        assert_eq!(event.category, "auth");
        assert_eq!(event.action, "login");
        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.username.as_deref(), Some("alice"));
        assert_eq!(event.details.as_deref(), Some("method=local"));
        assert_eq!(event.origin.ip.as_deref(), Some("203.0.113.10"));
    }

    #[tokio::test]
    async fn tracing_sink_accepts_all_results() {
        let sink = TracingAuditSink;
        for result in [
            AuditResult::Success,
            AuditResult::Failure,
            AuditResult::Warning,
            AuditResult::Error,
        ] {
            sink.record(AuditEvent::new("auth", "probe", result)).await;
        }
    }
}
