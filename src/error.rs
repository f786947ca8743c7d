//! Domain failure taxonomy, reported as values rather than thrown.

use thiserror::Error;

/// Message returned for both unknown usernames and wrong passwords. The two
/// cases must stay byte-identical so account existence is never revealed.
pub const GENERIC_INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Message returned for any unexpected internal fault; internal detail is
/// logged, never surfaced.
pub const GENERIC_INTERNAL_ERROR: &str = "An internal error occurred";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{GENERIC_INVALID_CREDENTIALS}")]
    InvalidCredentials,
    #[error("Account is locked, try again in {minutes_remaining} minute(s)")]
    AccountLocked { minutes_remaining: i64 },
    #[error("Account is disabled")]
    AccountDisabled,
    #[error("Policy violation")]
    PolicyViolation(Vec<String>),
    #[error("Role is in use by {occupying_user}")]
    SessionConflict { occupying_user: String },
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Token expired")]
    TokenExpired,
    #[error("Cannot remove the last administrator account")]
    LastAdministratorProtected,
    #[error("{GENERIC_INTERNAL_ERROR}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Caller-facing message; `Internal` collapses to the generic text.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::PolicyViolation(reasons) => {
                if reasons.is_empty() {
                    "Policy violation".to_string()
                } else {
                    reasons.join("; ")
                }
            }
            Self::Internal(_) => GENERIC_INTERNAL_ERROR.to_string(),
            other => other.to_string(),
        }
    }
}
