//! In-memory reference implementations of the store and audit seams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{AuditEvent, AuditSink, InsertOutcome, SessionStore, UserStore};
use crate::models::{normalize_username, LoginAttempt, Session, User};

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
    attempts: Mutex<Vec<LoginAttempt>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the append-only attempt history.
    pub async fn attempts(&self) -> Vec<LoginAttempt> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_username(&self, username_normalized: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| normalize_username(&user.username) == username_normalized)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn insert(&self, user: User) -> anyhow::Result<InsertOutcome> {
        let mut users = self.users.write().await;
        let normalized = normalize_username(&user.username);
        if users
            .values()
            .any(|existing| normalize_username(&existing.username) == normalized)
        {
            return Ok(InsertOutcome::DuplicateUsername);
        }
        users.insert(user.id, user);
        Ok(InsertOutcome::Created)
    }

    async fn update(&self, user: &User) -> anyhow::Result<()> {
        let mut users = self.users.write().await;
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        self.users.write().await.remove(&id);
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn record_attempt(&self, attempt: LoginAttempt) -> anyhow::Result<()> {
        self.attempts.lock().await.push(attempt);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn oldest_first(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by_key(|session| session.issued_at);
    sessions
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: Session) -> anyhow::Result<()> {
        self.sessions.write().await.insert(session.id, session);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn find_by_refresh_hash(&self, refresh_hash: &str) -> anyhow::Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|session| session.refresh_token_hash == refresh_hash)
            .cloned())
    }

    async fn active_for_user(
        &self,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(oldest_first(
            sessions
                .values()
                .filter(|session| session.user_id == user_id && session.is_active(now))
                .cloned()
                .collect(),
        ))
    }

    async fn active_sessions(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(oldest_first(
            sessions
                .values()
                .filter(|session| session.is_active(now))
                .cloned()
                .collect(),
        ))
    }

    async fn list(&self, user_id: Option<Uuid>) -> anyhow::Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        Ok(oldest_first(
            sessions
                .values()
                .filter(|session| user_id.map_or(true, |id| session.user_id == id))
                .cloned()
                .collect(),
        ))
    }

    async fn revoke(&self, id: Uuid, reason: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id) {
            // One-way transition: an already-revoked session stays untouched.
            Some(session) if !session.revoked => {
                session.revoked = true;
                session.revoked_at = Some(now);
                session.revoked_reason = Some(reason.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut sessions = self.sessions.write().await;
        let mut revoked = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id && !session.revoked {
                session.revoked = true;
                session.revoked_at = Some(now);
                session.revoked_reason = Some(reason.to_string());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&id) {
            session.last_activity_at = now;
        }
        Ok(())
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at >= cutoff);
        Ok((before - sessions.len()) as u64)
    }
}

/// Audit sink that collects events in memory; used by tests to assert on the
/// emitted trail.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().await.push(event);
    }
}
