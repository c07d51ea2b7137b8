//! Credential store
//!
//! Registration and password login over a [`UserStore`]. Only digests are
//! stored; login failures do not say whether the email or the password was
//! wrong.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::db::UserStore;
use crate::models::User;
use crate::types::{ParlorError, Result};

/// Shortest accepted password
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Clone)]
pub struct Credentials {
    users: Arc<dyn UserStore>,
}

impl Credentials {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Create an account. Fails with `DuplicateEmail` if the email is taken.
    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        if !email.contains('@') {
            return Err(ParlorError::Validation("Invalid email address".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ParlorError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        // Cheap early answer; the store's unique key is still the guard
        if self.users.find_user_by_email(email).await?.is_some() {
            return Err(ParlorError::DuplicateEmail(email.to_string()));
        }

        let digest = hash_password(password)?;
        let user = self.users.insert_user(email, &digest).await?;

        info!(user_id = %user.id, "Registered user");
        Ok(user)
    }

    /// `None` on unknown email or wrong password
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.users.find_user_by_email(email).await? else {
            return Ok(None);
        };

        match verify_password(password, &user.password_digest) {
            Ok(true) => Ok(Some(user)),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Stored password digest is unreadable");
                Ok(None)
            }
        }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.users.find_user_by_email(email).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.users.find_user_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use tokio_test::{assert_err, assert_ok};

    fn credentials() -> Credentials {
        Credentials::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let credentials = credentials();
        let user = credentials.register("a@x.com", "secret1").await.unwrap();

        assert_ne!(user.password_digest, "secret1");

        let found = credentials.authenticate("a@x.com", "secret1").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id));
        assert!(credentials
            .authenticate("a@x.com", "wrong-pass")
            .await
            .unwrap()
            .is_none());
        assert!(credentials
            .authenticate("b@x.com", "secret1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let credentials = credentials();
        assert_ok!(credentials.register("a@x.com", "secret1").await);

        let err = assert_err!(credentials.register("a@x.com", "other-pw").await);
        assert!(matches!(err, ParlorError::DuplicateEmail(_)));
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let err = assert_err!(credentials().register("a@x.com", "12345").await);
        assert!(matches!(err, ParlorError::Validation(_)));

        let err = assert_err!(credentials().register("not-an-email", "secret1").await);
        assert!(matches!(err, ParlorError::Validation(_)));
    }

    #[tokio::test]
    async fn test_lookup() {
        let credentials = credentials();
        let user = credentials.register("a@x.com", "secret1").await.unwrap();

        assert_eq!(credentials.find_by_id(user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(credentials.find_by_email("a@x.com").await.unwrap(), Some(user));
        assert!(credentials.find_by_email("A@X.COM").await.unwrap().is_none());
    }
}
