//! Optional identity resolution
//!
//! Chat and report routes work for guests, so resolving a bearer token never
//! fails: anything short of a valid token for an existing user is
//! [`Identity::Anonymous`]. Owner-only routes pass the result through
//! [`require_identity`].

use tracing::{debug, warn};

use super::jwt::{extract_token_from_header, JwtValidator};
use crate::models::User;
use crate::services::Credentials;
use crate::types::{ParlorError, Result};

/// Who is making a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(User),
}

impl Identity {
    pub fn user(&self) -> Option<&User> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Gate for owner-only operations
pub fn require_identity(identity: Identity) -> Result<User> {
    match identity {
        Identity::Authenticated(user) => Ok(user),
        Identity::Anonymous => Err(ParlorError::Unauthenticated(
            "Could not validate credentials".into(),
        )),
    }
}

/// Turns an `Authorization` header into an [`Identity`]
#[derive(Clone)]
pub struct IdentityResolver {
    tokens: JwtValidator,
    credentials: Credentials,
}

impl IdentityResolver {
    pub fn new(tokens: JwtValidator, credentials: Credentials) -> Self {
        Self {
            tokens,
            credentials,
        }
    }

    pub async fn resolve_optional(&self, auth_header: Option<&str>) -> Identity {
        let Some(token) = extract_token_from_header(auth_header) else {
            return Identity::Anonymous;
        };

        let result = self.tokens.verify_token(token);
        let Some(user_id) = result.user_id() else {
            debug!(reason = ?result.error, "Ignoring unusable bearer token");
            return Identity::Anonymous;
        };

        match self.credentials.find_by_id(user_id).await {
            Ok(Some(user)) => Identity::Authenticated(user),
            Ok(None) => {
                debug!(user_id = %user_id, "Token subject no longer exists");
                Identity::Anonymous
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "User lookup failed, treating request as guest");
                Identity::Anonymous
            }
        }
    }
}
