/// Password Hashing and Verification
///
/// bcrypt with a fixed work factor. The salt is random per call and embedded
/// in the `$2b$` digest, so verification needs nothing but the digest.

use bcrypt::{hash, verify};

use crate::error::{AppError, AuthError, ValidationError};

/// bcrypt work factor
pub const PASSWORD_HASH_COST: u32 = 10;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password using bcrypt
///
/// Strength rules are not applied here; callers accepting a new password run
/// `validate_password_strength` first.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, PASSWORD_HASH_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// Verify a password against its digest
///
/// A mismatch is `Ok(false)`. Only a digest that is not valid bcrypt output
/// yields `AuthError::HashFormat`.
pub fn verify_password(password: &str, digest: &str) -> Result<bool, AppError> {
    verify(password, digest).map_err(|e| AppError::Auth(AuthError::HashFormat(e.to_string())))
}

/// Validate password strength requirements
///
/// Requirements:
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - At least one digit
/// - At least one lowercase letter
/// - At least one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    // bcrypt only looks at the first 72 bytes; the cap also bounds hashing work
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(AppError::Validation(ValidationError::InvalidFormat(
            "password must contain at least one digit, one lowercase letter, and one uppercase letter"
                .to_string(),
        )));
    }

    Ok(())
}
