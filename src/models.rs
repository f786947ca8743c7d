//! Core entities shared across the authentication subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account status. `Disabled` is administrator-only and never auto-recovered;
/// `Locked` with an elapsed `locked_until` is treated as unlocked on next access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Locked,
    Disabled,
}

/// A named role. `system` marks roles that participate in last-administrator
/// protection (e.g. `Administrator`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub system: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Role {
    pub const ADMINISTRATOR: &'static str = "Administrator";

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system: false,
            permissions: Vec::new(),
        }
    }

    #[must_use]
    pub fn administrator() -> Self {
        Self {
            name: Self::ADMINISTRATOR.to_string(),
            system: true,
            permissions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored as entered; uniqueness and lookups use [`normalize_username`].
    pub username: String,
    pub display_name: String,
    /// `None` for directory-only accounts without a local credential.
    pub password_hash: Option<String>,
    /// Authentication is delegated to the directory service when set.
    pub directory_account: bool,
    pub status: UserStatus,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub must_change_password: bool,
    pub roles: Vec<Role>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub fn holds_role(&self, role_name: &str) -> bool {
        self.roles.iter().any(|role| role.name == role_name)
    }

    /// Holds any role flagged as a system role.
    #[must_use]
    pub fn is_system_admin(&self) -> bool {
        self.roles.iter().any(|role| role.system)
    }
}

/// Normalize a username for lookup/uniqueness checks.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Request origin metadata carried through login, refresh, and audit records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMeta {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// How a credential was verified, tagged on audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Local,
    Directory,
    /// Directory authentication failed or was unavailable and the stored local
    /// hash matched instead.
    LocalFallback,
}

impl AuthMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Directory => "directory",
            Self::LocalFallback => "local_fallback",
        }
    }
}

/// A server-side record binding an issued token pair to a user and an
/// expiry/activity window. Revocation is one-way; a revoked session is inert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 of the refresh token; the raw value is never stored.
    pub refresh_token_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub origin: OriginMeta,
}

impl Session {
    /// A session is active iff it is not revoked and has not expired.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at > now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptKind {
    Login,
    Refresh,
}

/// Append-only login attempt record; written once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub username: String,
    pub success: bool,
    pub kind: AttemptKind,
    pub origin: OriginMeta,
    pub failure_reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(now: DateTime<Utc>) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            refresh_token_hash: "hash".to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(60),
            last_activity_at: now,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            origin: OriginMeta::default(),
        }
    }

    #[test]
    fn session_active_until_expiry() {
        let now = Utc::now();
        let session = session(now);
        assert!(session.is_active(now));
        assert!(!session.is_active(now + Duration::minutes(61)));
    }

    #[test]
    fn revoked_session_is_inert() {
        let now = Utc::now();
        let mut session = session(now);
        session.revoked = true;
        assert!(!session.is_active(now));
    }

    #[test]
    fn normalize_username_trims_and_lowercases() {
        assert_eq!(normalize_username(" Alice "), "alice");
        assert_eq!(normalize_username("OPERATOR"), "operator");
    }

    #[test]
    fn system_admin_requires_system_role() {
        let now = Utc::now();
        let mut user = User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            password_hash: None,
            directory_account: false,
            status: UserStatus::Active,
            failed_login_attempts: 0,
            locked_until: None,
            must_change_password: false,
            roles: vec![Role::new("Operator")],
            last_login_at: None,
            last_login_ip: None,
            password_changed_at: None,
            created_at: now,
        };
        assert!(!user.is_system_admin());
        user.roles.push(Role::administrator());
        assert!(user.is_system_admin());
        assert!(user.holds_role(Role::ADMINISTRATOR));
    }
}
