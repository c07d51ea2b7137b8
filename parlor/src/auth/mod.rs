//! Authentication for Parlor
//!
//! Provides:
//! - JWT access tokens carrying the user id as subject
//! - Password hashing with Argon2
//! - Optional identity resolution with an explicit gate for owner-only routes

pub mod identity;
pub mod jwt;
pub mod password;

pub use identity::{require_identity, Identity, IdentityResolver};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenValidationResult};
pub use password::{hash_password, verify_password};
