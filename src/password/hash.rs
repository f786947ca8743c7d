//! Argon2id credential hashing and verification.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &SecretString) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("argon2 hashing failed: {err}"))
        .context("failed to hash password")?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC-format hash.
///
/// Malformed stored hashes are treated as "no match" rather than an error, so
/// a corrupt credential row can never be leveraged into a bypass or a panic.
/// Digest comparison inside `argon2` is constant-time.
#[must_use]
pub fn verify_password(password: &SecretString, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .is_ok()
}
