//! Immutable authentication configuration, resolved once per process lifetime.

use secrecy::SecretString;
use serde::Deserialize;

const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_MINUTES: i64 = 15;
const DEFAULT_SESSION_TIMEOUT_MINUTES: i64 = 60;
const DEFAULT_REMEMBER_ME_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;
const DEFAULT_INACTIVITY_TIMEOUT_MINUTES: i64 = 30;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 8;
const DEFAULT_TOKEN_ISSUER: &str = "opsgate";
const DEFAULT_TOKEN_AUDIENCE: &str = "opsgate-console";

/// Behavior when a login would create a second active session for a
/// single-session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingleSessionBehavior {
    /// Evict the prior holder and admit the new login.
    Force,
    /// Refuse the new login while the prior holder's session is active.
    Reject,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    signing_key: SecretString,
    max_login_attempts: u32,
    lockout_minutes: i64,
    session_timeout_minutes: i64,
    remember_me_timeout_minutes: i64,
    /// 0 disables inactivity revocation.
    inactivity_timeout_minutes: i64,
    /// 0 disables the concurrency cap.
    max_concurrent_sessions: u32,
    single_session_roles: Vec<String>,
    single_session_behavior: SingleSessionBehavior,
    track_last_activity: bool,
    password_min_length: usize,
    require_uppercase: bool,
    require_lowercase: bool,
    require_numbers: bool,
    require_special_chars: bool,
    force_password_change_on_first_login: bool,
    token_issuer: String,
    token_audience: String,
    enable_directory_auth: bool,
    fallback_to_local: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(signing_key: SecretString) -> Self {
        Self {
            signing_key,
            max_login_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_minutes: DEFAULT_LOCKOUT_MINUTES,
            session_timeout_minutes: DEFAULT_SESSION_TIMEOUT_MINUTES,
            remember_me_timeout_minutes: DEFAULT_REMEMBER_ME_TIMEOUT_MINUTES,
            inactivity_timeout_minutes: DEFAULT_INACTIVITY_TIMEOUT_MINUTES,
            max_concurrent_sessions: 0,
            single_session_roles: Vec::new(),
            single_session_behavior: SingleSessionBehavior::Force,
            track_last_activity: true,
            password_min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special_chars: false,
            force_password_change_on_first_login: false,
            token_issuer: DEFAULT_TOKEN_ISSUER.to_string(),
            token_audience: DEFAULT_TOKEN_AUDIENCE.to_string(),
            enable_directory_auth: false,
            fallback_to_local: true,
        }
    }

    #[must_use]
    pub fn with_max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_minutes(mut self, minutes: i64) -> Self {
        self.lockout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_session_timeout_minutes(mut self, minutes: i64) -> Self {
        self.session_timeout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_remember_me_timeout_minutes(mut self, minutes: i64) -> Self {
        self.remember_me_timeout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_inactivity_timeout_minutes(mut self, minutes: i64) -> Self {
        self.inactivity_timeout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_sessions(mut self, max: u32) -> Self {
        self.max_concurrent_sessions = max;
        self
    }

    #[must_use]
    pub fn with_single_session_roles(mut self, roles: Vec<String>) -> Self {
        self.single_session_roles = roles;
        self
    }

    #[must_use]
    pub fn with_single_session_behavior(mut self, behavior: SingleSessionBehavior) -> Self {
        self.single_session_behavior = behavior;
        self
    }

    #[must_use]
    pub fn with_track_last_activity(mut self, track: bool) -> Self {
        self.track_last_activity = track;
        self
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    #[must_use]
    pub fn with_require_uppercase(mut self, required: bool) -> Self {
        self.require_uppercase = required;
        self
    }

    #[must_use]
    pub fn with_require_lowercase(mut self, required: bool) -> Self {
        self.require_lowercase = required;
        self
    }

    #[must_use]
    pub fn with_require_numbers(mut self, required: bool) -> Self {
        self.require_numbers = required;
        self
    }

    #[must_use]
    pub fn with_require_special_chars(mut self, required: bool) -> Self {
        self.require_special_chars = required;
        self
    }

    #[must_use]
    pub fn with_force_password_change_on_first_login(mut self, force: bool) -> Self {
        self.force_password_change_on_first_login = force;
        self
    }

    #[must_use]
    pub fn with_token_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.token_issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_token_audience(mut self, audience: impl Into<String>) -> Self {
        self.token_audience = audience.into();
        self
    }

    #[must_use]
    pub fn with_enable_directory_auth(mut self, enabled: bool) -> Self {
        self.enable_directory_auth = enabled;
        self
    }

    #[must_use]
    pub fn with_fallback_to_local(mut self, fallback: bool) -> Self {
        self.fallback_to_local = fallback;
        self
    }

    #[must_use]
    pub fn signing_key(&self) -> &SecretString {
        &self.signing_key
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> u32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn lockout_minutes(&self) -> i64 {
        self.lockout_minutes
    }

    #[must_use]
    pub fn session_timeout_minutes(&self) -> i64 {
        self.session_timeout_minutes
    }

    #[must_use]
    pub fn remember_me_timeout_minutes(&self) -> i64 {
        self.remember_me_timeout_minutes
    }

    #[must_use]
    pub fn inactivity_timeout_minutes(&self) -> i64 {
        self.inactivity_timeout_minutes
    }

    #[must_use]
    pub fn max_concurrent_sessions(&self) -> u32 {
        self.max_concurrent_sessions
    }

    #[must_use]
    pub fn single_session_roles(&self) -> &[String] {
        &self.single_session_roles
    }

    #[must_use]
    pub fn single_session_behavior(&self) -> SingleSessionBehavior {
        self.single_session_behavior
    }

    #[must_use]
    pub fn track_last_activity(&self) -> bool {
        self.track_last_activity
    }

    #[must_use]
    pub fn password_min_length(&self) -> usize {
        self.password_min_length
    }

    #[must_use]
    pub fn require_uppercase(&self) -> bool {
        self.require_uppercase
    }

    #[must_use]
    pub fn require_lowercase(&self) -> bool {
        self.require_lowercase
    }

    #[must_use]
    pub fn require_numbers(&self) -> bool {
        self.require_numbers
    }

    #[must_use]
    pub fn require_special_chars(&self) -> bool {
        self.require_special_chars
    }

    #[must_use]
    pub fn force_password_change_on_first_login(&self) -> bool {
        self.force_password_change_on_first_login
    }

    #[must_use]
    pub fn token_issuer(&self) -> &str {
        &self.token_issuer
    }

    #[must_use]
    pub fn token_audience(&self) -> &str {
        &self.token_audience
    }

    #[must_use]
    pub fn enable_directory_auth(&self) -> bool {
        self.enable_directory_auth
    }

    #[must_use]
    pub fn fallback_to_local(&self) -> bool {
        self.fallback_to_local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = AuthConfig::new(SecretString::from("key".to_string()));
        assert_eq!(config.max_login_attempts(), DEFAULT_MAX_LOGIN_ATTEMPTS);
        assert_eq!(config.lockout_minutes(), DEFAULT_LOCKOUT_MINUTES);
        assert_eq!(config.max_concurrent_sessions(), 0);
        assert_eq!(
            config.single_session_behavior(),
            SingleSessionBehavior::Force
        );
        assert!(config.track_last_activity());
        assert!(!config.enable_directory_auth());

        let config = config
            .with_max_login_attempts(3)
            .with_lockout_minutes(5)
            .with_max_concurrent_sessions(2)
            .with_single_session_roles(vec!["Controller".to_string()])
            .with_single_session_behavior(SingleSessionBehavior::Reject)
            .with_token_issuer("console")
            .with_token_audience("operators");

        assert_eq!(config.max_login_attempts(), 3);
        assert_eq!(config.lockout_minutes(), 5);
        assert_eq!(config.max_concurrent_sessions(), 2);
        assert_eq!(config.single_session_roles(), ["Controller".to_string()]);
        assert_eq!(
            config.single_session_behavior(),
            SingleSessionBehavior::Reject
        );
        assert_eq!(config.token_issuer(), "console");
        assert_eq!(config.token_audience(), "operators");
    }

    #[test]
    fn debug_redacts_signing_key() {
        let config = AuthConfig::new(SecretString::from("super-secret".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
    }
}
