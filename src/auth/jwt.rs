/// JWT Token Generation and Validation
///
/// HS256 access tokens. Signature, issuer and expiry are checked here; the
/// blacklist is consulted separately by the middleware. Expiry is compared
/// against the caller's clock with no leeway, the same comparison blacklist
/// cleanup uses.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::models::Account;

/// Generate a new access token for an account
pub fn generate_access_token(
    account: &Account,
    config: &JwtSettings,
    issued_at: DateTime<Utc>,
) -> Result<String, AppError> {
    let claims = Claims::new(
        account.id,
        account.email.clone(),
        account.role,
        issued_at,
        config.access_token_expiry,
        config.issuer.clone(),
    );

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Validate and extract claims from an access token
///
/// # Errors
/// `AuthError::TokenInvalid` if the token is malformed, expired at `now`,
/// tampered with, or from another issuer
pub fn validate_access_token(
    token: &str,
    config: &JwtSettings,
    now: DateTime<Utc>,
) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);
    validation.leeway = 0;
    validation.validate_exp = false;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("JWT validation error: {}", e);
        AppError::Auth(AuthError::TokenInvalid)
    })?;

    if claims.is_expired(now) {
        tracing::warn!(user_id = %claims.sub, "JWT expired");
        return Err(AuthError::TokenInvalid.into());
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StaffRole;
    use uuid::Uuid;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 3600,
            refresh_token_ttl_days: 7,
            issuer: "test".to_string(),
        }
    }

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "dentist@example.com".to_string(),
            name: "Dr. Test".to_string(),
            password_hash: String::new(),
            role: StaffRole::Dentist,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let config = get_test_config();
        let account = account();

        let token = generate_access_token(&account, &config, Utc::now()).expect("Failed to generate token");
        let claims = validate_access_token(&token, &config, Utc::now()).expect("Failed to validate token");

        assert_eq!(claims.sub, account.id.to_string());
        assert_eq!(claims.email, account.email);
        assert_eq!(claims.role, StaffRole::Dentist);
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_tokens_issued_together_differ() {
        let config = get_test_config();
        let account = account();
        let now = Utc::now();

        let first = generate_access_token(&account, &config, now).unwrap();
        let second = generate_access_token(&account, &config, now).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_token() {
        let config = get_test_config();
        let result = validate_access_token("invalid.token.here", &config, Utc::now());

        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenInvalid))));
    }

    #[test]
    fn test_tampered_token() {
        let config = get_test_config();
        let token = generate_access_token(&account(), &config, Utc::now()).unwrap();

        let tampered = format!("{}X", token);
        assert!(validate_access_token(&tampered, &config, Utc::now()).is_err());
    }

    #[test]
    fn test_expired_token() {
        let config = get_test_config();
        let issued_long_ago = Utc::now() - chrono::Duration::hours(3);
        let token = generate_access_token(&account(), &config, issued_long_ago).unwrap();

        assert!(validate_access_token(&token, &config, Utc::now()).is_err());
    }

    #[test]
    fn test_expiry_has_no_leeway() {
        let config = get_test_config();
        let issued_at = Utc::now() - chrono::Duration::seconds(3_630);
        let token = generate_access_token(&account(), &config, issued_at).unwrap();

        // exp was 30 seconds ago
        let err = validate_access_token(&token, &config, Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_expiry_follows_the_given_clock() {
        let config = get_test_config();
        let issued_at = Utc::now() - chrono::Duration::hours(3);
        let token = generate_access_token(&account(), &config, issued_at).unwrap();

        let claims = validate_access_token(&token, &config, issued_at + chrono::Duration::minutes(59)).unwrap();
        assert!(validate_access_token(&token, &config, claims.expires_at()).is_ok());
        assert!(validate_access_token(&token, &config, claims.expires_at() + chrono::Duration::seconds(1)).is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = get_test_config();
        let token = generate_access_token(&account(), &config, Utc::now()).unwrap();

        config.issuer = "wrong-issuer".to_string();
        assert!(validate_access_token(&token, &config, Utc::now()).is_err());
    }
}
