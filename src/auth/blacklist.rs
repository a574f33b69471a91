/// Access Token Blacklist
///
/// Access tokens revoked before their natural expiry (explicit logout).
/// Entries are keyed by the SHA-256 digest of the token, never the token
/// text, and are kept only until the token would have expired anyway.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::auth::token_hash::digest_token;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::BlacklistEntry;
use crate::storage::BlacklistRepository;

#[derive(Clone)]
pub struct AccessTokenBlacklist {
    repository: Arc<dyn BlacklistRepository>,
    clock: Arc<dyn Clock>,
}

impl AccessTokenBlacklist {
    pub fn new(repository: Arc<dyn BlacklistRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Reject `token` until `expires_at`. Blacklisting twice keeps the first entry.
    pub async fn blacklist(&self, token: &str, expires_at: DateTime<Utc>) -> Result<BlacklistEntry, AppError> {
        let entry = BlacklistEntry {
            token_hash: digest_token(token),
            expires_at,
            created_at: self.clock.now(),
        };

        let stored = self.repository.insert_blacklist_entry(&entry).await?;
        tracing::debug!(expires_at = %stored.expires_at, "Access token blacklisted");
        Ok(stored)
    }

    /// True if the token was explicitly revoked.
    ///
    /// `false` does not make a token valid; signature and expiry are checked
    /// before this is consulted.
    pub async fn is_blacklisted(&self, token: &str) -> Result<bool, AppError> {
        self.repository
            .blacklist_entry_exists(&digest_token(token))
            .await
    }

    /// Drop entries whose tokens have expired naturally.
    pub async fn cleanup_expired(&self) -> Result<u64, AppError> {
        self.repository
            .delete_expired_blacklist_entries(self.clock.now())
            .await
    }
}
