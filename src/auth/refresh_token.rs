/// Refresh Token Management
///
/// Refresh tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use: rotation revokes the presented token with one conditional
///   update before a replacement is issued
/// - Database-backed for revocation support

use chrono::Duration;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::token_hash::digest_token;
use crate::clock::Clock;
use crate::error::{AppError, AuthError};
use crate::models::RefreshTokenRecord;
use crate::storage::RefreshTokenRepository;

const REFRESH_TOKEN_LENGTH: usize = 64;

/// Generate a new cryptographically secure refresh token
///
/// The plaintext goes to the client; only its digest is persisted.
pub fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFRESH_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Result of a successful rotation
#[derive(Debug, Clone)]
pub struct RotatedRefreshToken {
    /// The record that was just revoked
    pub previous: RefreshTokenRecord,
    pub record_id: Uuid,
    /// Plaintext of the replacement token
    pub token: String,
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    repository: Arc<dyn RefreshTokenRepository>,
    clock: Arc<dyn Clock>,
}

impl RefreshTokenStore {
    pub fn new(repository: Arc<dyn RefreshTokenRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Persist a token for the account, valid for `ttl_days`.
    pub async fn issue(&self, account_id: Uuid, token: &str, ttl_days: i64) -> Result<Uuid, AppError> {
        let now = self.clock.now();
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            account_id,
            token_hash: digest_token(token),
            expires_at: now + Duration::days(ttl_days),
            revoked: false,
            created_at: now,
        };

        self.repository.insert_refresh_token(&record).await?;

        tracing::debug!(account_id = %account_id, record_id = %record.id, "Refresh token issued");
        Ok(record.id)
    }

    /// Look up a usable token.
    ///
    /// Unknown, revoked, expired or foreign tokens all come back as `None`;
    /// only storage failures are errors.
    pub async fn validate(
        &self,
        account_id: Uuid,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        self.repository
            .find_active_refresh_token(account_id, &digest_token(token), self.clock.now())
            .await
    }

    /// Revoke one record. Revoking an already revoked record succeeds.
    ///
    /// Returns false only when no such record exists.
    pub async fn revoke(&self, record_id: Uuid) -> Result<bool, AppError> {
        self.repository.revoke_refresh_token(record_id).await
    }

    /// Revoke every live token of the account (logout, password change,
    /// suspected compromise). Returns the number of records revoked.
    pub async fn revoke_all(&self, account_id: Uuid) -> Result<u64, AppError> {
        let count = self.repository.revoke_all_refresh_tokens(account_id).await?;
        tracing::info!(account_id = %account_id, revoked = count, "All refresh tokens revoked for account");
        Ok(count)
    }

    /// Delete records that are expired or revoked. Valid records are untouched.
    pub async fn cleanup(&self) -> Result<u64, AppError> {
        self.repository
            .delete_stale_refresh_tokens(self.clock.now())
            .await
    }

    /// Exchange a presented token for a new one.
    ///
    /// The presented token is revoked by a single conditional update, so two
    /// concurrent refreshes with the same token cannot both succeed. On
    /// failure the token is classified:
    /// - matches a revoked record of the account: `TokenReuseDetected`
    /// - anything else: `TokenNotFound`
    pub async fn rotate(
        &self,
        account_id: Uuid,
        presented: &str,
        ttl_days: i64,
    ) -> Result<RotatedRefreshToken, AppError> {
        let token_hash = digest_token(presented);
        let now = self.clock.now();

        let previous = match self
            .repository
            .revoke_active_refresh_token(account_id, &token_hash, now)
            .await?
        {
            Some(record) => record,
            None => return Err(self.classify_rejected(account_id, &token_hash).await?.into()),
        };

        let token = generate_refresh_token();
        let record_id = self.issue(account_id, &token, ttl_days).await?;

        tracing::info!(
            account_id = %account_id,
            previous_id = %previous.id,
            record_id = %record_id,
            "Refresh token rotated"
        );

        Ok(RotatedRefreshToken {
            previous,
            record_id,
            token,
        })
    }

    async fn classify_rejected(&self, account_id: Uuid, token_hash: &str) -> Result<AuthError, AppError> {
        match self.repository.find_refresh_token(account_id, token_hash).await? {
            Some(record) if record.revoked => {
                tracing::warn!(account_id = %account_id, record_id = %record.id, "Attempt to use revoked refresh token");
                Ok(AuthError::TokenReuseDetected)
            }
            Some(record) => {
                tracing::info!(account_id = %account_id, record_id = %record.id, "Refresh token expired");
                Ok(AuthError::TokenNotFound)
            }
            None => {
                tracing::warn!(account_id = %account_id, "Refresh token not found");
                Ok(AuthError::TokenNotFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::storage::MemoryStorage;

    fn store() -> (RefreshTokenStore, Arc<MemoryStorage>, MockClock) {
        let storage = Arc::new(MemoryStorage::new());
        let clock = MockClock::default();
        let store = RefreshTokenStore::new(storage.clone(), Arc::new(clock.clone()));
        (store, storage, clock)
    }

    #[test]
    fn test_generate_refresh_token() {
        let token = generate_refresh_token();

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_refresh_token());
    }

    #[tokio::test]
    async fn test_issue_then_validate() {
        let (store, _, _) = store();
        let account = Uuid::new_v4();
        let token = generate_refresh_token();

        let id = store.issue(account, &token, 7).await.unwrap();
        let record = store.validate(account, &token).await.unwrap().expect("token should validate");

        assert_eq!(record.id, id);
        assert_eq!(record.account_id, account);
        assert_ne!(record.token_hash, token);
        assert!(!record.revoked);
    }

    #[tokio::test]
    async fn test_validate_rejects_wrong_account_or_secret() {
        let (store, _, _) = store();
        let account = Uuid::new_v4();
        let token = generate_refresh_token();
        store.issue(account, &token, 7).await.unwrap();

        assert!(store.validate(Uuid::new_v4(), &token).await.unwrap().is_none());
        assert!(store.validate(account, "not-the-token").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoked_token_fails_validation() {
        let (store, _, _) = store();
        let account = Uuid::new_v4();
        let token = generate_refresh_token();
        let id = store.issue(account, &token, 7).await.unwrap();

        assert!(store.revoke(id).await.unwrap());
        assert!(store.validate(account, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (store, _, _) = store();
        let id = store.issue(Uuid::new_v4(), "secret", 7).await.unwrap();

        assert!(store.revoke(id).await.unwrap());
        assert!(store.revoke(id).await.unwrap());
        assert!(!store.revoke(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_token_fails_validation() {
        let (store, _, clock) = store();
        let account = Uuid::new_v4();
        store.issue(account, "secret", 7).await.unwrap();

        clock.advance(Duration::days(7) - Duration::seconds(1));
        assert!(store.validate(account, "secret").await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.validate(account, "secret").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_only_touches_one_account() {
        let (store, _, _) = store();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        store.issue(alice, "alice-1", 7).await.unwrap();
        store.issue(alice, "alice-2", 7).await.unwrap();
        store.issue(bob, "bob-1", 7).await.unwrap();

        assert_eq!(store.revoke_all(alice).await.unwrap(), 2);
        assert_eq!(store.revoke_all(alice).await.unwrap(), 0);

        assert!(store.validate(alice, "alice-1").await.unwrap().is_none());
        assert!(store.validate(alice, "alice-2").await.unwrap().is_none());
        assert!(store.validate(bob, "bob-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_stale_records() {
        let (store, storage, clock) = store();
        let account = Uuid::new_v4();

        let revoked = store.issue(account, "revoked", 30).await.unwrap();
        store.revoke(revoked).await.unwrap();
        store.issue(account, "short-lived", 1).await.unwrap();
        store.issue(account, "valid", 30).await.unwrap();

        clock.advance(Duration::days(2));

        assert_eq!(store.cleanup().await.unwrap(), 2);
        assert_eq!(storage.refresh_token_count(), 1);
        assert!(store.validate(account, "valid").await.unwrap().is_some());

        assert_eq!(store.cleanup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rotate_revokes_presented_token() {
        let (store, _, _) = store();
        let account = Uuid::new_v4();
        let original = store.issue(account, "original", 7).await.unwrap();

        let rotated = store.rotate(account, "original", 7).await.unwrap();

        assert_eq!(rotated.previous.id, original);
        assert_ne!(rotated.record_id, original);
        assert!(store.validate(account, "original").await.unwrap().is_none());
        assert!(store.validate(account, &rotated.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replayed_token_is_reuse() {
        let (store, _, _) = store();
        let account = Uuid::new_v4();
        store.issue(account, "original", 7).await.unwrap();
        store.rotate(account, "original", 7).await.unwrap();

        let replay = store.rotate(account, "original", 7).await;
        assert!(matches!(replay, Err(AppError::Auth(AuthError::TokenReuseDetected))));
    }

    #[tokio::test]
    async fn test_unknown_or_expired_token_is_not_found() {
        let (store, _, clock) = store();
        let account = Uuid::new_v4();

        let unknown = store.rotate(account, "never-issued", 7).await;
        assert!(matches!(unknown, Err(AppError::Auth(AuthError::TokenNotFound))));

        store.issue(account, "expiring", 1).await.unwrap();
        clock.advance(Duration::days(2));
        let expired = store.rotate(account, "expiring", 7).await;
        assert!(matches!(expired, Err(AppError::Auth(AuthError::TokenNotFound))));
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let (store, _, _) = store();
        let account = Uuid::new_v4();
        store.issue(account, "contended", 7).await.unwrap();

        let (first, second) = tokio::join!(
            store.rotate(account, "contended", 7),
            store.rotate(account, "contended", 7)
        );

        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    }
}
