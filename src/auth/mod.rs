/// Authentication module
///
/// Handles JWT token generation/validation, password hashing,
/// refresh token rotation and the access token blacklist.

mod blacklist;
mod claims;
mod jwt;
mod password;
mod refresh_token;
mod service;
mod token_hash;

pub use blacklist::AccessTokenBlacklist;
pub use claims::Claims;
pub use jwt::{generate_access_token, validate_access_token};
pub use password::{hash_password, validate_password_strength, verify_password, PASSWORD_HASH_COST};
pub use refresh_token::{generate_refresh_token, RefreshTokenStore, RotatedRefreshToken};
pub use service::{AuthService, CleanupReport, NewAccount, TokenPair};
pub use token_hash::digest_token;
