//! Password strength rules and credential hashing.

pub mod hash;
pub mod policy;

pub use hash::{hash_password, verify_password};
pub use policy::{PasswordPolicy, PolicyViolation};
