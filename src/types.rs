//! Request/response types for the facade's public operations.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Role, Session, User, UserStatus};

/// Caller-facing view of a user; never carries credential material.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub status: UserStatus,
    pub roles: Vec<String>,
    pub must_change_password: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            status: user.status,
            roles: user.roles.iter().map(|role| role.name.clone()).collect(),
            must_change_password: user.must_change_password,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub must_change_password: Option<bool>,
    pub user: Option<UserProfile>,
    pub lockout_minutes_remaining: Option<i64>,
    pub remaining_attempts: Option<u32>,
}

impl LoginResponse {
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            must_change_password: None,
            user: None,
            lockout_minutes_remaining: None,
            remaining_attempts: None,
        }
    }

    #[must_use]
    pub fn locked(message: impl Into<String>, minutes_remaining: i64) -> Self {
        Self {
            lockout_minutes_remaining: Some(minutes_remaining),
            ..Self::failure(message)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
}

impl OperationResponse {
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogoutAllResponse {
    pub success: bool,
    pub message: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenValidation {
    pub valid: bool,
    pub profile: Option<UserProfile>,
}

impl TokenValidation {
    #[must_use]
    pub fn invalid() -> Self {
        Self {
            valid: false,
            profile: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangePasswordResponse {
    pub success: bool,
    pub message: String,
    pub violations: Option<Vec<String>>,
}

/// Parameters for the administrative create-user operation.
pub struct NewUser {
    pub username: String,
    pub display_name: String,
    /// `None` for directory-only accounts.
    pub password: Option<SecretString>,
    pub directory_account: bool,
    pub roles: Vec<Role>,
    pub must_change_password: bool,
}

/// Partial administrative update; `None` fields are left untouched.
#[derive(Default)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub roles: Option<Vec<Role>>,
    pub status: Option<UserStatus>,
}

/// Administrative view of a session; exposes no token material.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_reason: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            last_activity_at: session.last_activity_at,
            revoked: session.revoked,
            revoked_reason: session.revoked_reason.clone(),
            ip: session.origin.ip.clone(),
            user_agent: session.origin.user_agent.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OriginMeta;
    use chrono::Duration;

    #[test]
    fn profile_carries_no_credential_material() {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            password_hash: Some("$argon2id$...".to_string()),
            directory_account: false,
            status: UserStatus::Active,
            failed_login_attempts: 0,
            locked_until: None,
            must_change_password: true,
            roles: vec![Role::new("Operator")],
            last_login_at: None,
            last_login_ip: None,
            password_changed_at: None,
            created_at: Utc::now(),
        };
        let profile = UserProfile::from(&user);
        let json = serde_json::to_string(&profile).expect("serializable");
        assert!(!json.contains("argon2"));
        assert!(profile.must_change_password);
        assert_eq!(profile.roles, vec!["Operator"]);
    }

    #[test]
    fn session_info_hides_refresh_hash() {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            refresh_token_hash: "refresh-hash-value".to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(60),
            last_activity_at: now,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            origin: OriginMeta {
                ip: Some("203.0.113.10".to_string()),
                user_agent: None,
            },
        };
        let info = SessionInfo::from(&session);
        let json = serde_json::to_string(&info).expect("serializable");
        assert!(!json.contains("refresh-hash-value"));
        assert_eq!(info.ip.as_deref(), Some("203.0.113.10"));
    }

    #[test]
    fn locked_response_sets_minutes() {
        let response = LoginResponse::locked("Account is locked", 12);
        assert!(!response.success);
        assert_eq!(response.lockout_minutes_remaining, Some(12));
        assert!(response.access_token.is_none());
    }
}
