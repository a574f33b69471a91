/// Token digests for at-rest storage
///
/// Refresh tokens and blacklisted access tokens are stored only as SHA-256
/// digests. Tokens are already high-entropy, so the digest is unsalted and
/// can be used directly for equality lookups.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the token, 64 characters.
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
