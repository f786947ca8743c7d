//! Credential verification strategies: local, directory, and fallback.

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use tracing::warn;

use crate::config::AuthConfig;
use crate::models::{AuthMethod, User};
use crate::password::verify_password;

/// External directory service (AD/LDAP) seam. Implementations are supplied by
/// the embedding application.
#[async_trait]
pub trait DirectoryAuthenticator: Send + Sync {
    /// Check a username/password pair against the directory.
    async fn authenticate(&self, username: &str, password: &SecretString)
        -> anyhow::Result<bool>;
}

/// Outcome of credential verification. Verification never mutates state; it is
/// a pure predicate over (stored credential, presented secret).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Matched(AuthMethod),
    NoMatch,
}

impl Verification {
    #[must_use]
    pub fn matched(self) -> bool {
        matches!(self, Self::Matched(_))
    }
}

/// Dispatches verification by account type: local accounts check the stored
/// Argon2 hash; directory accounts delegate to the directory, optionally
/// falling back to the local hash when the directory is unavailable.
pub struct CredentialVerifier {
    directory: Option<Arc<dyn DirectoryAuthenticator>>,
    directory_enabled: bool,
    fallback_to_local: bool,
}

impl CredentialVerifier {
    #[must_use]
    pub fn from_config(
        config: &AuthConfig,
        directory: Option<Arc<dyn DirectoryAuthenticator>>,
    ) -> Self {
        Self {
            directory,
            directory_enabled: config.enable_directory_auth(),
            fallback_to_local: config.fallback_to_local(),
        }
    }

    pub async fn verify(&self, user: &User, password: &SecretString) -> Verification {
        if user.directory_account && self.directory_enabled {
            return self.verify_directory(user, password).await;
        }
        Self::verify_local(user, password, AuthMethod::Local)
    }

    fn verify_local(user: &User, password: &SecretString, method: AuthMethod) -> Verification {
        match user.password_hash.as_deref() {
            Some(hash) if verify_password(password, hash) => Verification::Matched(method),
            _ => Verification::NoMatch,
        }
    }

    async fn verify_directory(&self, user: &User, password: &SecretString) -> Verification {
        let directory_result = match self.directory.as_deref() {
            Some(directory) => directory.authenticate(&user.username, password).await,
            None => Err(anyhow::anyhow!("no directory authenticator configured")),
        };

        match directory_result {
            Ok(true) => Verification::Matched(AuthMethod::Directory),
            Ok(false) => self.local_fallback(user, password),
            Err(err) => {
                warn!("Directory authentication unavailable: {err}");
                self.local_fallback(user, password)
            }
        }
    }

    /// Fallback attempts carry a distinct auth-method label for audit.
    fn local_fallback(&self, user: &User, password: &SecretString) -> Verification {
        if self.fallback_to_local && user.password_hash.is_some() {
            Self::verify_local(user, password, AuthMethod::LocalFallback)
        } else {
            Verification::NoMatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, UserStatus};
    use crate::password::hash_password;
    use anyhow::{anyhow, Result};
    use chrono::Utc;
    use uuid::Uuid;

    struct StaticDirectory {
        accept: bool,
        fail: bool,
    }

    #[async_trait]
    impl DirectoryAuthenticator for StaticDirectory {
        async fn authenticate(&self, _username: &str, _password: &SecretString) -> Result<bool> {
            if self.fail {
                Err(anyhow!("directory unreachable"))
            } else {
                Ok(self.accept)
            }
        }
    }

    fn user(password_hash: Option<String>, directory_account: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            password_hash,
            directory_account,
            status: UserStatus::Active,
            failed_login_attempts: 0,
            locked_until: None,
            must_change_password: false,
            roles: vec![Role::new("Operator")],
            last_login_at: None,
            last_login_ip: None,
            password_changed_at: None,
            created_at: Utc::now(),
        }
    }

    fn config(directory: bool, fallback: bool) -> AuthConfig {
        AuthConfig::new(SecretString::from("key".to_string()))
            .with_enable_directory_auth(directory)
            .with_fallback_to_local(fallback)
    }

    #[tokio::test]
    async fn local_account_matches_stored_hash() -> Result<()> {
        let password = SecretString::from("Tr4verse-North".to_string());
        let user = user(Some(hash_password(&password)?), false);
        let verifier = CredentialVerifier::from_config(&config(false, false), None);

        let result = verifier.verify(&user, &password).await;
        assert_eq!(result, Verification::Matched(AuthMethod::Local));

        let wrong = SecretString::from("Tr4verse-South".to_string());
        assert_eq!(verifier.verify(&user, &wrong).await, Verification::NoMatch);
        Ok(())
    }

    #[tokio::test]
    async fn local_account_without_hash_never_matches() {
        let user = user(None, false);
        let verifier = CredentialVerifier::from_config(&config(false, true), None);
        let password = SecretString::from("anything".to_string());
        assert_eq!(
            verifier.verify(&user, &password).await,
            Verification::NoMatch
        );
    }

    #[tokio::test]
    async fn directory_account_uses_directory() {
        let user = user(None, true);
        let directory = Arc::new(StaticDirectory {
            accept: true,
            fail: false,
        });
        let verifier = CredentialVerifier::from_config(&config(true, false), Some(directory));
        let password = SecretString::from("directory-pass".to_string());
        assert_eq!(
            verifier.verify(&user, &password).await,
            Verification::Matched(AuthMethod::Directory)
        );
    }

    #[tokio::test]
    async fn directory_failure_falls_back_to_local_hash() -> Result<()> {
        let password = SecretString::from("Tr4verse-North".to_string());
        let user = user(Some(hash_password(&password)?), true);
        let directory = Arc::new(StaticDirectory {
            accept: false,
            fail: true,
        });
        let verifier = CredentialVerifier::from_config(&config(true, true), Some(directory));

        let result = verifier.verify(&user, &password).await;
        assert_eq!(result, Verification::Matched(AuthMethod::LocalFallback));
        Ok(())
    }

    #[tokio::test]
    async fn fallback_disabled_means_no_match() -> Result<()> {
        let password = SecretString::from("Tr4verse-North".to_string());
        let user = user(Some(hash_password(&password)?), true);
        let directory = Arc::new(StaticDirectory {
            accept: false,
            fail: true,
        });
        let verifier = CredentialVerifier::from_config(&config(true, false), Some(directory));
        assert_eq!(
            verifier.verify(&user, &password).await,
            Verification::NoMatch
        );
        Ok(())
    }

    #[tokio::test]
    async fn directory_rejection_can_still_fall_back() -> Result<()> {
        // Account exists locally but the directory answers "no": fallback is
        // tagged distinctly for audit.
        let password = SecretString::from("Tr4verse-North".to_string());
        let user = user(Some(hash_password(&password)?), true);
        let directory = Arc::new(StaticDirectory {
            accept: false,
            fail: false,
        });
        let verifier = CredentialVerifier::from_config(&config(true, true), Some(directory));
        assert_eq!(
            verifier.verify(&user, &password).await,
            Verification::Matched(AuthMethod::LocalFallback)
        );
        Ok(())
    }
}
