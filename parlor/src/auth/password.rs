//! Password hashing and verification using Argon2
//!
//! Digests are PHC strings (argon2id, random salt), so parameters travel
//! with the stored value.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::ParlorError;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, ParlorError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ParlorError::Auth(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored digest.
///
/// A mismatch is `Ok(false)`; only an unparseable digest is an error.
pub fn verify_password(password: &str, digest: &str) -> Result<bool, ParlorError> {
    let parsed = PasswordHash::new(digest)
        .map_err(|e| ParlorError::Auth(format!("Invalid password digest: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let digest = hash_password("secret1").unwrap();

        assert!(digest.starts_with("$argon2"));
        assert!(!digest.contains("secret1"));
        assert!(verify_password("secret1", &digest).unwrap());
        assert!(!verify_password("secret2", &digest).unwrap());
    }

    #[test]
    fn test_salted() {
        let first = hash_password("same-password").unwrap();
        let second = hash_password("same-password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_digest() {
        assert!(verify_password("secret1", "plaintext").is_err());
    }
}
