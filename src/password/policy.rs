//! Stateless password strength validation against configurable rules.

use thiserror::Error;

use crate::config::AuthConfig;

/// Common weak patterns rejected by case-insensitive substring match.
const WEAK_PATTERNS: &[&str] = &["password", "123456", "qwerty", "letmein", "welcome", "admin"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyViolation {
    #[error("Password must not be empty")]
    Empty,
    #[error("Password must be at least {minimum} characters long")]
    TooShort { minimum: usize },
    #[error("Password must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("Password must contain at least one lowercase letter")]
    MissingLowercase,
    #[error("Password must contain at least one digit")]
    MissingDigit,
    #[error("Password must contain at least one special character")]
    MissingSpecial,
    #[error("Password must not contain the common pattern \"{pattern}\"")]
    WeakPattern { pattern: &'static str },
}

/// Stateless rule engine; every violated rule is reported independently.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    min_length: usize,
    require_uppercase: bool,
    require_lowercase: bool,
    require_numbers: bool,
    require_special_chars: bool,
}

impl PasswordPolicy {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            min_length: config.password_min_length(),
            require_uppercase: config.require_uppercase(),
            require_lowercase: config.require_lowercase(),
            require_numbers: config.require_numbers(),
            require_special_chars: config.require_special_chars(),
        }
    }

    /// Check a candidate password. Empty input is always invalid with a single
    /// violation, regardless of the other rules.
    pub fn validate(&self, password: &str) -> Result<(), Vec<PolicyViolation>> {
        if password.is_empty() {
            return Err(vec![PolicyViolation::Empty]);
        }

        let mut violations = Vec::new();

        if password.chars().count() < self.min_length {
            violations.push(PolicyViolation::TooShort {
                minimum: self.min_length,
            });
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            violations.push(PolicyViolation::MissingUppercase);
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            violations.push(PolicyViolation::MissingLowercase);
        }
        if self.require_numbers && !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push(PolicyViolation::MissingDigit);
        }
        if self.require_special_chars
            && !password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
        {
            violations.push(PolicyViolation::MissingSpecial);
        }

        let lowered = password.to_lowercase();
        for pattern in WEAK_PATTERNS {
            if lowered.contains(pattern) {
                violations.push(PolicyViolation::WeakPattern { pattern });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
