//! Bearer tokens for registered users
//!
//! Tokens are HS256 JWTs whose `sub` claim is the user id. Verification never
//! fails loudly: malformed, expired or foreign tokens all come back as an
//! invalid [`TokenValidationResult`].

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::types::ParlorError;

/// Default access-token lifetime (30 minutes)
pub const DEFAULT_EXPIRY_SECONDS: u64 = 30 * 60;

/// Payload stored in JWT token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }

    /// The subject as a user id, if the token was valid and well-formed
    pub fn user_id(&self) -> Option<Uuid> {
        self.claims
            .as_ref()
            .filter(|_| self.valid)
            .and_then(|c| Uuid::parse_str(&c.sub).ok())
    }
}

/// JWT issuer and validator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, ParlorError> {
        if secret.is_empty() {
            return Err(ParlorError::Config(
                "JWT_SECRET is required in production mode".into(),
            ));
        }

        if secret.len() < 32 {
            return Err(ParlorError::Config(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Create a validator for dev mode
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: DEFAULT_EXPIRY_SECONDS,
        }
    }

    /// Issue an access token for a user
    pub fn issue(&self, user_id: Uuid) -> Result<String, ParlorError> {
        let now = unix_now()?;
        self.sign(&Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, ParlorError> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ParlorError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a JWT token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(token_data) => TokenValidationResult::valid(token_data.claims),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

fn unix_now() -> Result<u64, ParlorError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| ParlorError::Auth(format!("System time error: {}", e)))
}

/// Extract token from Authorization header ("Bearer <token>")
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            DEFAULT_EXPIRY_SECONDS,
        )
        .unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let validator = test_validator();
        let user_id = Uuid::new_v4();

        let token = validator.issue(user_id).unwrap();
        let result = validator.verify_token(&token);

        assert!(result.valid);
        assert_eq!(result.user_id(), Some(user_id));

        let claims = result.claims.unwrap();
        assert_eq!(claims.exp - claims.iat, DEFAULT_EXPIRY_SECONDS);
    }

    #[test]
    fn test_malformed_token() {
        let result = test_validator().verify_token("not.a.jwt");
        assert!(!result.valid);
        assert!(result.error.is_some());
        assert_eq!(result.user_id(), None);
    }

    #[test]
    fn test_expired_token() {
        let validator = test_validator();
        let now = unix_now().unwrap();
        let token = validator
            .sign(&Claims {
                sub: Uuid::new_v4().to_string(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        let result = validator.verify_token(&token);
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Token expired"));
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            DEFAULT_EXPIRY_SECONDS,
        )
        .unwrap();

        let token = test_validator().issue(Uuid::new_v4()).unwrap();
        assert!(!other.verify_token(&token).valid);
    }

    #[test]
    fn test_non_uuid_subject() {
        let validator = test_validator();
        let now = unix_now().unwrap();
        let token = validator
            .sign(&Claims {
                sub: "someone".into(),
                iat: now,
                exp: now + 60,
            })
            .unwrap();

        let result = validator.verify_token(&token);
        assert!(result.valid);
        assert_eq!(result.user_id(), None);
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(
            extract_token_from_header(Some("Bearer abc123")),
            Some("abc123")
        );
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
        assert_eq!(extract_token_from_header(Some("abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 60).is_err());
        assert!(JwtValidator::new("".into(), 60).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 60).is_ok());
    }
}
