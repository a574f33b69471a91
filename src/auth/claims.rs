/// JWT Claims structure
///
/// Payload of an access token: staff identity plus the standard claims
/// (RFC 7519). `jti` makes every issued token distinct, so a token minted
/// right after a logout never collides with the blacklisted one.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};
use crate::models::StaffRole;

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (account ID as UUID string)
    pub sub: String,
    pub email: String,
    pub role: StaffRole,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

impl Claims {
    pub fn new(
        account_id: Uuid,
        email: String,
        role: StaffRole,
        issued_at: DateTime<Utc>,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = issued_at.timestamp();
        Self {
            sub: account_id.to_string(),
            email,
            role,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Extract account ID from claims
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }

    /// Natural expiry of the token as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Expired once `now` is past `exp`, the same cut-off blacklist cleanup uses
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at() < now
    }

    pub fn require_role(&self, role: StaffRole) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Auth(AuthError::Forbidden))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims::new(
            Uuid::new_v4(),
            "test@example.com".to_string(),
            StaffRole::Dentist,
            Utc::now(),
            3600,
            "test".to_string(),
        )
    }

    #[test]
    fn test_claims_creation() {
        let claims = claims();

        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_expired(Utc::now()));
    }

    #[test]
    fn test_each_token_gets_a_fresh_jti() {
        assert_ne!(claims().jti, claims().jti);
    }

    #[test]
    fn test_expires_at_matches_exp() {
        let claims = claims();
        assert_eq!(claims.expires_at().timestamp(), claims.exp);
    }

    #[test]
    fn test_invalid_user_id() {
        let mut claims = claims();
        claims.sub = "invalid-uuid".to_string();

        assert!(claims.user_id().is_err());
    }

    #[test]
    fn test_require_role() {
        let claims = claims();
        assert!(claims.require_role(StaffRole::Dentist).is_ok());
        assert!(matches!(
            claims.require_role(StaffRole::Admin),
            Err(AppError::Auth(AuthError::Forbidden))
        ));
    }
}
