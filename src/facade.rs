//! Public authentication operations: login, logout, refresh, validation,
//! password management, and user administration.
//!
//! Every operation catches unexpected internal faults at this boundary, logs
//! them with detail, audits an error event, and returns a generic response.
//! Read-check-then-write sections (lockout counting, policy admission) run
//! under a per-user lock; the session row is written only after every check
//! has passed, so a cancelled call leaves no partial session.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AuthError, GENERIC_INTERNAL_ERROR};
use crate::lockout::{LockState, LockoutTracker};
use crate::models::{
    normalize_username, AttemptKind, LoginAttempt, OriginMeta, Session, User, UserStatus,
};
use crate::password::{hash_password, verify_password, PasswordPolicy};
use crate::session::{ActivityCheck, SessionPolicyEngine};
use crate::store::{AuditEvent, AuditResult, AuditSink, InsertOutcome, SessionStore, UserStore};
use crate::token::{generate_refresh_token, hash_refresh_token, TokenError, TokenIssuer};
use crate::types::{
    ChangePasswordResponse, LoginResponse, LogoutAllResponse, NewUser, OperationResponse,
    SessionInfo, TokenValidation, UserProfile, UserUpdate,
};
use crate::verifier::{CredentialVerifier, DirectoryAuthenticator, Verification};

const AUDIT_AUTH: &str = "auth";
const AUDIT_ADMIN: &str = "admin";
const AUDIT_SESSION: &str = "session";

pub const REASON_LOGOUT: &str = "logout";
pub const REASON_ROTATED: &str = "refresh token rotated";
pub const REASON_PASSWORD_CHANGED: &str = "password changed";
pub const REASON_PASSWORD_RESET: &str = "password reset";
pub const REASON_ACCOUNT_DISABLED: &str = "account disabled";
pub const REASON_USER_DELETED: &str = "user deleted";

/// Unwrap the internal cause of an [`AuthError`] for boundary logging.
fn into_internal(err: AuthError) -> anyhow::Error {
    match err {
        AuthError::Internal(inner) => inner,
        other => anyhow!(other),
    }
}

pub struct AuthService {
    config: Arc<AuthConfig>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    verifier: CredentialVerifier,
    lockout: LockoutTracker,
    policy: SessionPolicyEngine,
    tokens: TokenIssuer,
    password_policy: PasswordPolicy,
    user_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Serializes admissions by holders of a single-session role, so the
    /// cross-user exclusivity check and the session write cannot interleave
    /// between two such logins.
    role_admission_lock: Mutex<()>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        directory: Option<Arc<dyn DirectoryAuthenticator>>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            verifier: CredentialVerifier::from_config(&config, directory),
            lockout: LockoutTracker::from_config(&config),
            policy: SessionPolicyEngine::new(config.clone(), users.clone(), sessions.clone()),
            tokens: TokenIssuer::from_config(&config),
            password_policy: PasswordPolicy::from_config(&config),
            config,
            users,
            sessions,
            audit,
            user_locks: Mutex::new(HashMap::new()),
            role_admission_lock: Mutex::new(()),
        }
    }

    /// Serialization boundary for one user's read-check-then-write sections.
    async fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Held across admission and the session write for holders of a
    /// single-session role; `None` for everyone else.
    async fn role_guard(&self, user: &User) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        if self
            .config
            .single_session_roles()
            .iter()
            .any(|role| user.holds_role(role))
        {
            Some(self.role_admission_lock.lock().await)
        } else {
            None
        }
    }

    async fn emit(&self, event: AuditEvent) {
        self.audit.record(event).await;
    }

    /// Attempt-history recording must never fail the calling operation.
    async fn record_attempt(
        &self,
        username: &str,
        success: bool,
        kind: AttemptKind,
        origin: &OriginMeta,
        failure_reason: Option<&str>,
    ) {
        let attempt = LoginAttempt {
            username: username.to_string(),
            success,
            kind,
            origin: origin.clone(),
            failure_reason: failure_reason.map(str::to_string),
            at: Utc::now(),
        };
        if let Err(err) = self.users.record_attempt(attempt).await {
            error!("Failed to record login attempt: {err:#}");
        }
    }

    // ----- login -----------------------------------------------------------

    pub async fn login(
        &self,
        username: &str,
        password: SecretString,
        remember_me: bool,
        origin: OriginMeta,
    ) -> LoginResponse {
        match self.login_inner(username, &password, remember_me, &origin).await {
            Ok(response) => response,
            Err(err) => {
                error!("Login failed unexpectedly: {err:#}");
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "login", AuditResult::Error)
                        .username(username)
                        .details("internal error")
                        .origin(origin),
                )
                .await;
                LoginResponse::failure(GENERIC_INTERNAL_ERROR)
            }
        }
    }

    async fn login_inner(
        &self,
        username: &str,
        password: &SecretString,
        remember_me: bool,
        origin: &OriginMeta,
    ) -> anyhow::Result<LoginResponse> {
        let now = Utc::now();

        let normalized = normalize_username(username);
        let Some(found) = self.users.find_by_username(&normalized).await? else {
            self.record_attempt(username, false, AttemptKind::Login, origin, Some("unknown user"))
                .await;
            self.emit(
                AuditEvent::new(AUDIT_AUTH, "login_failed", AuditResult::Failure)
                    .username(username)
                    .details("unknown user")
                    .origin(origin.clone()),
            )
            .await;
            // Must stay byte-identical with the wrong-password response.
            return Ok(LoginResponse::failure(
                AuthError::InvalidCredentials.public_message(),
            ));
        };

        let lock = self.user_lock(found.id).await;
        let _guard = lock.lock().await;
        // Re-read under the lock; counters may have moved since the lookup.
        let mut user = self
            .users
            .find_by_id(found.id)
            .await?
            .context("user disappeared during login")?;

        // Locked accounts are rejected before the verifier runs, so lock state
        // cannot leak whether the password would have matched.
        if let LockState::Locked { minutes_remaining } = self.lockout.check(&user, now) {
            self.record_attempt(username, false, AttemptKind::Login, origin, Some("account locked"))
                .await;
            self.emit(
                AuditEvent::new(AUDIT_AUTH, "login_failed", AuditResult::Failure)
                    .user(user.id, &user.username)
                    .details("account locked")
                    .origin(origin.clone()),
            )
            .await;
            return Ok(LoginResponse::locked(
                AuthError::AccountLocked { minutes_remaining }.public_message(),
                minutes_remaining,
            ));
        }

        if user.status == UserStatus::Disabled {
            self.record_attempt(username, false, AttemptKind::Login, origin, Some("account disabled"))
                .await;
            self.emit(
                AuditEvent::new(AUDIT_AUTH, "login_failed", AuditResult::Failure)
                    .user(user.id, &user.username)
                    .details("account disabled")
                    .origin(origin.clone()),
            )
            .await;
            return Ok(LoginResponse::failure(
                AuthError::AccountDisabled.public_message(),
            ));
        }

        let Verification::Matched(method) = self.verifier.verify(&user, password).await else {
            let outcome = self.lockout.register_failure(&mut user, now);
            self.users.update(&user).await?;
            self.record_attempt(
                username,
                false,
                AttemptKind::Login,
                origin,
                Some("invalid credentials"),
            )
            .await;

            if outcome.locked_now {
                // Distinct from the plain login-failed event.
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "account_locked", AuditResult::Warning)
                        .user(user.id, &user.username)
                        .details(format!(
                            "locked after {} failed attempts",
                            user.failed_login_attempts
                        ))
                        .origin(origin.clone()),
                )
                .await;
                let minutes = self.config.lockout_minutes();
                let mut response = LoginResponse::locked(
                    AuthError::AccountLocked {
                        minutes_remaining: minutes,
                    }
                    .public_message(),
                    minutes,
                );
                response.remaining_attempts = Some(0);
                return Ok(response);
            }

            self.emit(
                AuditEvent::new(AUDIT_AUTH, "login_failed", AuditResult::Failure)
                    .user(user.id, &user.username)
                    .details("invalid credentials")
                    .origin(origin.clone()),
            )
            .await;
            // Byte-identical with the unknown-user response: no hint fields.
            return Ok(LoginResponse::failure(
                AuthError::InvalidCredentials.public_message(),
            ));
        };

        let _role_guard = self.role_guard(&user).await;
        match self.policy.admit(&user, now).await {
            Ok(evictions) => {
                for eviction in evictions {
                    self.emit(
                        AuditEvent::new(AUDIT_SESSION, "session_evicted", AuditResult::Warning)
                            .user(eviction.user_id, &eviction.username)
                            .details(format!("session {}: {}", eviction.session_id, eviction.reason))
                            .origin(origin.clone()),
                    )
                    .await;
                }
            }
            Err(AuthError::SessionConflict { occupying_user }) => {
                self.record_attempt(
                    username,
                    false,
                    AttemptKind::Login,
                    origin,
                    Some("session conflict"),
                )
                .await;
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "login_failed", AuditResult::Failure)
                        .user(user.id, &user.username)
                        .details(format!("single-session role held by {occupying_user}"))
                        .origin(origin.clone()),
                )
                .await;
                return Ok(LoginResponse::failure(
                    AuthError::SessionConflict { occupying_user }.public_message(),
                ));
            }
            Err(err) => return Err(into_internal(err)),
        }

        self.lockout.register_success(&mut user);
        user.last_login_at = Some(now);
        user.last_login_ip = origin.ip.clone();
        // The user row lands before the session row; a failed write must not
        // leave an orphaned session holding a policy slot.
        self.users.update(&user).await?;

        let response = self.open_session(&user, remember_me, origin, now).await?;

        self.record_attempt(username, true, AttemptKind::Login, origin, None)
            .await;
        self.emit(
            AuditEvent::new(AUDIT_AUTH, "login", AuditResult::Success)
                .user(user.id, &user.username)
                .details(format!("method={}", method.as_str()))
                .origin(origin.clone()),
        )
        .await;

        Ok(response)
    }

    /// Mint tokens and write the session row. Called only after admission.
    async fn open_session(
        &self,
        user: &User,
        remember_me: bool,
        origin: &OriginMeta,
        now: DateTime<Utc>,
    ) -> anyhow::Result<LoginResponse> {
        let timeout_minutes = if remember_me {
            self.config.remember_me_timeout_minutes()
        } else {
            self.config.session_timeout_minutes()
        };
        let expires_at = now + Duration::minutes(timeout_minutes);
        let session_id = Uuid::new_v4();

        let refresh_token = generate_refresh_token()?;
        let claims = self.tokens.claims_for(user, session_id, now, expires_at);
        let access_token = self
            .tokens
            .sign(&claims)
            .map_err(|err| anyhow!("failed to sign access token: {err}"))?;

        let session = Session {
            id: session_id,
            user_id: user.id,
            refresh_token_hash: hash_refresh_token(&refresh_token),
            issued_at: now,
            expires_at,
            last_activity_at: now,
            revoked: false,
            revoked_at: None,
            revoked_reason: None,
            origin: origin.clone(),
        };
        self.sessions.insert(session).await?;

        Ok(LoginResponse {
            success: true,
            message: "Login successful".to_string(),
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
            must_change_password: Some(user.must_change_password),
            user: Some(UserProfile::from(user)),
            lockout_minutes_remaining: None,
            remaining_attempts: None,
        })
    }

    // ----- token validation ------------------------------------------------

    pub async fn validate_token(&self, access_token: &str) -> TokenValidation {
        match self.validate_inner(access_token).await {
            Ok(validation) => validation,
            Err(err) => {
                error!("Token validation failed unexpectedly: {err:#}");
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "validate_token", AuditResult::Error)
                        .details("internal error"),
                )
                .await;
                TokenValidation::invalid()
            }
        }
    }

    async fn validate_inner(&self, access_token: &str) -> anyhow::Result<TokenValidation> {
        let now = Utc::now();
        let Ok(claims) = self.tokens.verify(access_token, now) else {
            return Ok(self.validation_rejected(None, "invalid token").await);
        };
        let Some(session) = self.sessions.get(claims.jti).await? else {
            return Ok(self.validation_rejected(None, "unknown session").await);
        };
        if !session.is_active(now) {
            return Ok(self
                .validation_rejected(None, "session revoked or expired")
                .await);
        }
        let Some(user) = self.users.find_by_id(session.user_id).await? else {
            return Ok(self
                .validation_rejected(None, "session owner no longer exists")
                .await);
        };
        if user.status == UserStatus::Disabled {
            return Ok(self
                .validation_rejected(Some(&user), "account disabled")
                .await);
        }

        let check = self
            .policy
            .check_activity(&session, now)
            .await
            .map_err(into_internal)?;
        if check == ActivityCheck::TimedOut {
            self.emit(
                AuditEvent::new(AUDIT_SESSION, "session_timeout", AuditResult::Warning)
                    .user(user.id, &user.username)
                    .details(format!("session {} revoked for inactivity", session.id)),
            )
            .await;
            return Ok(TokenValidation::invalid());
        }

        Ok(TokenValidation {
            valid: true,
            profile: Some(UserProfile::from(&user)),
        })
    }

    /// Rejected presentations are security-relevant and hit the audit trail
    /// like any other terminal outcome.
    async fn validation_rejected(&self, user: Option<&User>, details: &str) -> TokenValidation {
        let mut event =
            AuditEvent::new(AUDIT_AUTH, "validate_token", AuditResult::Failure).details(details);
        if let Some(user) = user {
            event = event.user(user.id, &user.username);
        }
        self.emit(event).await;
        TokenValidation::invalid()
    }

    // ----- refresh ---------------------------------------------------------

    pub async fn refresh_token(&self, refresh_token: &str, origin: OriginMeta) -> LoginResponse {
        match self.refresh_inner(refresh_token, &origin).await {
            Ok(response) => response,
            Err(err) => {
                error!("Token refresh failed unexpectedly: {err:#}");
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "token_refresh", AuditResult::Error)
                        .details("internal error")
                        .origin(origin),
                )
                .await;
                LoginResponse::failure(GENERIC_INTERNAL_ERROR)
            }
        }
    }

    async fn refresh_inner(
        &self,
        refresh_token: &str,
        origin: &OriginMeta,
    ) -> anyhow::Result<LoginResponse> {
        let now = Utc::now();
        let refresh_hash = hash_refresh_token(refresh_token);

        let old_session = self.sessions.find_by_refresh_hash(&refresh_hash).await?;
        let Some(old_session) = old_session.filter(|session| session.is_active(now)) else {
            // Unknown, expired, or already-rotated token: one generic answer.
            self.emit(
                AuditEvent::new(AUDIT_AUTH, "token_refresh", AuditResult::Failure)
                    .details("unknown or inactive refresh token")
                    .origin(origin.clone()),
            )
            .await;
            return Ok(LoginResponse::failure(
                AuthError::TokenInvalid.public_message(),
            ));
        };

        let lock = self.user_lock(old_session.user_id).await;
        let _guard = lock.lock().await;

        let Some(user) = self.users.find_by_id(old_session.user_id).await? else {
            self.emit(
                AuditEvent::new(AUDIT_AUTH, "token_refresh", AuditResult::Failure)
                    .details("session owner no longer exists")
                    .origin(origin.clone()),
            )
            .await;
            return Ok(LoginResponse::failure(
                AuthError::TokenInvalid.public_message(),
            ));
        };

        if user.status == UserStatus::Disabled {
            self.emit(
                AuditEvent::new(AUDIT_AUTH, "token_refresh", AuditResult::Failure)
                    .user(user.id, &user.username)
                    .details("account disabled")
                    .origin(origin.clone()),
            )
            .await;
            return Ok(LoginResponse::failure(
                AuthError::AccountDisabled.public_message(),
            ));
        }

        if let LockState::Locked { minutes_remaining } = self.lockout.check(&user, now) {
            self.emit(
                AuditEvent::new(AUDIT_AUTH, "token_refresh", AuditResult::Failure)
                    .user(user.id, &user.username)
                    .details("account locked")
                    .origin(origin.clone()),
            )
            .await;
            return Ok(LoginResponse::locked(
                AuthError::AccountLocked { minutes_remaining }.public_message(),
                minutes_remaining,
            ));
        }

        // Rotation: the old session dies before the new one is admitted, so a
        // used refresh token can never be redeemed twice.
        self.sessions
            .revoke(old_session.id, REASON_ROTATED, now)
            .await?;

        let _role_guard = self.role_guard(&user).await;
        match self.policy.admit(&user, now).await {
            Ok(evictions) => {
                for eviction in evictions {
                    self.emit(
                        AuditEvent::new(AUDIT_SESSION, "session_evicted", AuditResult::Warning)
                            .user(eviction.user_id, &eviction.username)
                            .details(format!("session {}: {}", eviction.session_id, eviction.reason))
                            .origin(origin.clone()),
                    )
                    .await;
                }
            }
            Err(AuthError::SessionConflict { occupying_user }) => {
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "token_refresh", AuditResult::Failure)
                        .user(user.id, &user.username)
                        .details(format!("single-session role held by {occupying_user}"))
                        .origin(origin.clone()),
                )
                .await;
                return Ok(LoginResponse::failure(
                    AuthError::SessionConflict { occupying_user }.public_message(),
                ));
            }
            Err(err) => return Err(into_internal(err)),
        }

        let response = self.open_session(&user, false, origin, now).await?;

        self.record_attempt(&user.username, true, AttemptKind::Refresh, origin, None)
            .await;
        self.emit(
            AuditEvent::new(AUDIT_AUTH, "token_refresh", AuditResult::Success)
                .user(user.id, &user.username)
                .details(format!("rotated session {}", old_session.id))
                .origin(origin.clone()),
        )
        .await;

        Ok(response)
    }

    // ----- logout ----------------------------------------------------------

    pub async fn logout(&self, access_token: &str) -> OperationResponse {
        let now = Utc::now();
        let claims = match self.tokens.verify(access_token, now) {
            Ok(claims) => claims,
            Err(err) => {
                let reason = match err {
                    TokenError::Expired => AuthError::TokenExpired,
                    _ => AuthError::TokenInvalid,
                };
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "logout", AuditResult::Failure)
                        .details(reason.public_message()),
                )
                .await;
                return OperationResponse::failed(reason.public_message());
            }
        };

        match self.sessions.revoke(claims.jti, REASON_LOGOUT, now).await {
            Ok(_) => {
                // Revoking an already-revoked session is a no-op, still a
                // successful logout from the caller's point of view.
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "logout", AuditResult::Success)
                        .user(claims.sub, &claims.name),
                )
                .await;
                OperationResponse::ok("Logged out")
            }
            Err(err) => {
                error!("Logout failed unexpectedly: {err:#}");
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "logout", AuditResult::Error)
                        .user(claims.sub, &claims.name)
                        .details("internal error"),
                )
                .await;
                OperationResponse::failed(GENERIC_INTERNAL_ERROR)
            }
        }
    }

    pub async fn logout_all_sessions(&self, user_id: Uuid, reason: &str) -> LogoutAllResponse {
        let now = Utc::now();
        match self.sessions.revoke_all_for_user(user_id, reason, now).await {
            Ok(count) => {
                self.emit(
                    AuditEvent::new(AUDIT_SESSION, "logout_all", AuditResult::Success)
                        .details(format!("revoked {count} session(s): {reason}")),
                )
                .await;
                LogoutAllResponse {
                    success: true,
                    message: format!("Revoked {count} session(s)"),
                    count,
                }
            }
            Err(err) => {
                error!("Logout-all failed unexpectedly: {err:#}");
                self.emit(
                    AuditEvent::new(AUDIT_SESSION, "logout_all", AuditResult::Error)
                        .details("internal error"),
                )
                .await;
                LogoutAllResponse {
                    success: false,
                    message: GENERIC_INTERNAL_ERROR.to_string(),
                    count: 0,
                }
            }
        }
    }

    // ----- password management ---------------------------------------------

    /// Check a candidate password against the configured policy.
    pub fn validate_password_policy(&self, password: &str) -> Result<(), Vec<String>> {
        self.password_policy
            .validate(password)
            .map_err(|violations| violations.iter().map(ToString::to_string).collect())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: SecretString,
        new_password: SecretString,
        confirm_password: SecretString,
    ) -> ChangePasswordResponse {
        match self
            .change_password_inner(user_id, &current_password, &new_password, &confirm_password)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!("Password change failed unexpectedly: {err:#}");
                self.emit(
                    AuditEvent::new(AUDIT_AUTH, "password_change", AuditResult::Error)
                        .details("internal error"),
                )
                .await;
                ChangePasswordResponse {
                    success: false,
                    message: GENERIC_INTERNAL_ERROR.to_string(),
                    violations: None,
                }
            }
        }
    }

    async fn change_password_inner(
        &self,
        user_id: Uuid,
        current_password: &SecretString,
        new_password: &SecretString,
        confirm_password: &SecretString,
    ) -> anyhow::Result<ChangePasswordResponse> {
        let now = Utc::now();
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let Some(mut user) = self.users.find_by_id(user_id).await? else {
            return Ok(self
                .password_change_rejected(None, "User not found", None)
                .await);
        };

        // Directory-only accounts have no local credential to change.
        if user.directory_account && !self.config.fallback_to_local() {
            return Ok(self
                .password_change_rejected(
                    Some(&user),
                    "Password is managed by the directory service",
                    None,
                )
                .await);
        }

        if !self.verifier.verify(&user, current_password).await.matched() {
            return Ok(self
                .password_change_rejected(Some(&user), "Current password is incorrect", None)
                .await);
        }

        if new_password.expose_secret() != confirm_password.expose_secret() {
            return Ok(self
                .password_change_rejected(
                    Some(&user),
                    "New password and confirmation do not match",
                    None,
                )
                .await);
        }

        if let Err(violations) = self.validate_password_policy(new_password.expose_secret()) {
            return Ok(self
                .password_change_rejected(
                    Some(&user),
                    "New password does not meet the password policy",
                    Some(violations),
                )
                .await);
        }

        if let Some(stored) = user.password_hash.as_deref() {
            if verify_password(new_password, stored) {
                return Ok(self
                    .password_change_rejected(
                        Some(&user),
                        "New password must differ from the current password",
                        None,
                    )
                    .await);
            }
        }

        user.password_hash = Some(hash_password(new_password)?);
        user.password_changed_at = Some(now);
        user.must_change_password = false;
        self.users.update(&user).await?;

        // Force re-authentication everywhere the old credential was used.
        let revoked = self
            .sessions
            .revoke_all_for_user(user.id, REASON_PASSWORD_CHANGED, now)
            .await?;

        self.emit(
            AuditEvent::new(AUDIT_AUTH, "password_change", AuditResult::Success)
                .user(user.id, &user.username)
                .details(format!("revoked {revoked} session(s)")),
        )
        .await;

        Ok(ChangePasswordResponse {
            success: true,
            message: "Password changed".to_string(),
            violations: None,
        })
    }

    async fn password_change_rejected(
        &self,
        user: Option<&User>,
        message: &str,
        violations: Option<Vec<String>>,
    ) -> ChangePasswordResponse {
        let mut event = AuditEvent::new(AUDIT_AUTH, "password_change", AuditResult::Failure)
            .details(message);
        if let Some(user) = user {
            event = event.user(user.id, &user.username);
        }
        self.emit(event).await;
        ChangePasswordResponse {
            success: false,
            message: message.to_string(),
            violations,
        }
    }

    // ----- user administration ---------------------------------------------

    pub async fn create_user(&self, new_user: NewUser) -> Result<UserProfile, AuthError> {
        let result = self.create_user_inner(new_user).await;
        self.finish_admin_op("user_create", result).await
    }

    async fn create_user_inner(&self, new_user: NewUser) -> Result<UserProfile, AuthError> {
        let now = Utc::now();
        let normalized = normalize_username(&new_user.username);
        if normalized.is_empty() {
            return Err(AuthError::PolicyViolation(vec![
                "Username must not be empty".to_string(),
            ]));
        }

        let password_hash = match &new_user.password {
            Some(password) => {
                self.validate_password_policy(password.expose_secret())
                    .map_err(AuthError::PolicyViolation)?;
                Some(hash_password(password).map_err(AuthError::Internal)?)
            }
            None if new_user.directory_account => None,
            None => {
                return Err(AuthError::PolicyViolation(vec![
                    "A password is required for local accounts".to_string(),
                ]));
            }
        };

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.clone(),
            display_name: new_user.display_name,
            password_hash,
            directory_account: new_user.directory_account,
            status: UserStatus::Active,
            failed_login_attempts: 0,
            locked_until: None,
            must_change_password: new_user.must_change_password
                || self.config.force_password_change_on_first_login(),
            roles: new_user.roles,
            last_login_at: None,
            last_login_ip: None,
            password_changed_at: None,
            created_at: now,
        };
        let profile = UserProfile::from(&user);

        match self.users.insert(user).await.map_err(AuthError::Internal)? {
            InsertOutcome::Created => Ok(profile),
            InsertOutcome::DuplicateUsername => Err(AuthError::PolicyViolation(vec![
                "Username is already taken".to_string(),
            ])),
        }
    }

    pub async fn update_user(
        &self,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Result<UserProfile, AuthError> {
        let result = self.update_user_inner(user_id, update).await;
        self.finish_admin_op("user_update", result).await
    }

    async fn update_user_inner(
        &self,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Result<UserProfile, AuthError> {
        let now = Utc::now();
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or_else(|| AuthError::PolicyViolation(vec!["User not found".to_string()]))?;

        let loses_admin = update
            .roles
            .as_ref()
            .is_some_and(|roles| !roles.iter().any(|role| role.system));
        let becomes_disabled = update.status == Some(UserStatus::Disabled);
        if user.is_system_admin()
            && user.status != UserStatus::Disabled
            && (loses_admin || becomes_disabled)
            && !self.another_enabled_admin_exists(user.id).await?
        {
            return Err(AuthError::LastAdministratorProtected);
        }

        if let Some(display_name) = update.display_name {
            user.display_name = display_name;
        }
        if let Some(roles) = update.roles {
            user.roles = roles;
        }
        if let Some(status) = update.status {
            user.status = status;
            if status == UserStatus::Disabled {
                self.sessions
                    .revoke_all_for_user(user.id, REASON_ACCOUNT_DISABLED, now)
                    .await
                    .map_err(AuthError::Internal)?;
            }
        }

        self.users.update(&user).await.map_err(AuthError::Internal)?;
        Ok(UserProfile::from(&user))
    }

    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let result = self.delete_user_inner(user_id).await;
        self.finish_admin_op("user_delete", result).await
    }

    async fn delete_user_inner(&self, user_id: Uuid) -> Result<(), AuthError> {
        let now = Utc::now();
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or_else(|| AuthError::PolicyViolation(vec!["User not found".to_string()]))?;

        if user.is_system_admin() && !self.another_enabled_admin_exists(user.id).await? {
            return Err(AuthError::LastAdministratorProtected);
        }

        // Sessions first; a user is never deleted while it owns active ones.
        self.sessions
            .revoke_all_for_user(user.id, REASON_USER_DELETED, now)
            .await
            .map_err(AuthError::Internal)?;
        self.users.delete(user.id).await.map_err(AuthError::Internal)?;
        // The keyed lock entry would otherwise outlive the user forever.
        self.user_locks.lock().await.remove(&user.id);
        Ok(())
    }

    pub async fn unlock_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let result = self.unlock_user_inner(user_id).await;
        self.finish_admin_op("user_unlock", result).await
    }

    async fn unlock_user_inner(&self, user_id: Uuid) -> Result<(), AuthError> {
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or_else(|| AuthError::PolicyViolation(vec!["User not found".to_string()]))?;

        self.lockout.unlock(&mut user);
        self.users.update(&user).await.map_err(AuthError::Internal)?;
        Ok(())
    }

    pub async fn reset_password(
        &self,
        user_id: Uuid,
        new_password: SecretString,
    ) -> Result<(), AuthError> {
        let result = self.reset_password_inner(user_id, &new_password).await;
        self.finish_admin_op("password_reset", result).await
    }

    async fn reset_password_inner(
        &self,
        user_id: Uuid,
        new_password: &SecretString,
    ) -> Result<(), AuthError> {
        let now = Utc::now();
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or_else(|| AuthError::PolicyViolation(vec!["User not found".to_string()]))?;

        if user.directory_account && !self.config.fallback_to_local() {
            return Err(AuthError::PolicyViolation(vec![
                "Password is managed by the directory service".to_string(),
            ]));
        }

        self.validate_password_policy(new_password.expose_secret())
            .map_err(AuthError::PolicyViolation)?;

        user.password_hash = Some(hash_password(new_password).map_err(AuthError::Internal)?);
        user.password_changed_at = Some(now);
        user.must_change_password = true;
        self.users.update(&user).await.map_err(AuthError::Internal)?;

        self.sessions
            .revoke_all_for_user(user.id, REASON_PASSWORD_RESET, now)
            .await
            .map_err(AuthError::Internal)?;
        Ok(())
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserProfile>, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(AuthError::Internal)?;
        Ok(user.as_ref().map(UserProfile::from))
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, AuthError> {
        let users = self.users.list().await.map_err(AuthError::Internal)?;
        Ok(users.iter().map(UserProfile::from).collect())
    }

    pub async fn list_sessions(
        &self,
        user_id: Option<Uuid>,
    ) -> Result<Vec<SessionInfo>, AuthError> {
        let sessions = self
            .sessions
            .list(user_id)
            .await
            .map_err(AuthError::Internal)?;
        Ok(sessions.iter().map(SessionInfo::from).collect())
    }

    /// Administratively close a session. Returns `false` when the session was
    /// already revoked or unknown.
    pub async fn close_session(&self, session_id: Uuid, reason: &str) -> Result<bool, AuthError> {
        let now = Utc::now();
        let revoked = self
            .sessions
            .revoke(session_id, reason, now)
            .await
            .map_err(AuthError::Internal)?;
        self.emit(
            AuditEvent::new(AUDIT_SESSION, "session_closed", AuditResult::Success)
                .details(format!("session {session_id}: {reason}")),
        )
        .await;
        Ok(revoked)
    }

    /// Retention housekeeping; expiry and lockout stay correct without it.
    pub async fn sweep_expired_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        self.sessions
            .delete_expired_before(cutoff)
            .await
            .map_err(AuthError::Internal)
    }

    /// Audit the terminal outcome of an administrative operation and collapse
    /// internal faults to the generic error.
    async fn finish_admin_op<T>(
        &self,
        action: &str,
        result: Result<T, AuthError>,
    ) -> Result<T, AuthError> {
        match result {
            Ok(value) => {
                self.emit(AuditEvent::new(AUDIT_ADMIN, action, AuditResult::Success))
                    .await;
                Ok(value)
            }
            Err(AuthError::Internal(err)) => {
                error!("Administrative operation {action} failed unexpectedly: {err:#}");
                self.emit(
                    AuditEvent::new(AUDIT_ADMIN, action, AuditResult::Error)
                        .details("internal error"),
                )
                .await;
                Err(AuthError::Internal(anyhow!("{GENERIC_INTERNAL_ERROR}")))
            }
            Err(err) => {
                self.emit(
                    AuditEvent::new(AUDIT_ADMIN, action, AuditResult::Failure)
                        .details(err.public_message()),
                )
                .await;
                Err(err)
            }
        }
    }

    async fn another_enabled_admin_exists(&self, excluding: Uuid) -> Result<bool, AuthError> {
        let users = self.users.list().await.map_err(AuthError::Internal)?;
        Ok(users.iter().any(|user| {
            user.id != excluding && user.is_system_admin() && user.status != UserStatus::Disabled
        }))
    }

    #[cfg(test)]
    pub(crate) async fn user_lock_count(&self) -> usize {
        self.user_locks.lock().await.len()
    }
}
