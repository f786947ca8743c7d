//! Authentication and session control for operator consoles.
//!
//! The crate verifies credentials (local Argon2 hashes with optional
//! directory delegation), issues signed access tokens paired with rotating
//! refresh tokens, and enforces session policy: per-role exclusivity,
//! concurrency caps, inactivity timeouts, and account lockout. Every
//! security-relevant outcome is written to an append-only audit trail.
//!
//! [`AuthService`] is the entry point; persistence and the directory are
//! pluggable seams with in-memory reference implementations under
//! [`store::memory`].

pub mod config;
pub mod error;
pub mod facade;
pub mod lockout;
pub mod models;
pub mod password;
pub mod session;
pub mod store;
pub mod token;
pub mod types;
pub mod verifier;

pub use config::{AuthConfig, SingleSessionBehavior};
pub use error::{AuthError, GENERIC_INTERNAL_ERROR, GENERIC_INVALID_CREDENTIALS};
pub use facade::AuthService;
pub use models::{AuthMethod, OriginMeta, Role, Session, User, UserStatus};
pub use store::{AuditEvent, AuditResult, AuditSink, SessionStore, TracingAuditSink, UserStore};
pub use token::{AccessTokenClaims, TokenError, TokenIssuer};
pub use types::{
    ChangePasswordResponse, LoginResponse, LogoutAllResponse, NewUser, OperationResponse,
    SessionInfo, TokenValidation, UserProfile, UserUpdate,
};
pub use verifier::DirectoryAuthenticator;
