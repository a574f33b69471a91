/// Persistence layer
///
/// Each concern gets its own repository trait so services only see the
/// operations they need. `PgStorage` backs them with PostgreSQL and
/// `MemoryStorage` with process memory for tests and local runs.
///
/// Repositories never read the clock themselves; callers pass `now`.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Account, AppointmentRequest, BlacklistEntry, Invoice, RefreshTokenRecord};

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Fails with `UniqueConstraintViolation` when the email is taken.
    async fn insert_account(&self, account: &Account) -> Result<(), AppError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError>;

    /// Returns false if the account does not exist.
    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;

    /// Record matching account and digest that is unrevoked and unexpired at `now`.
    async fn find_active_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Record matching account and digest in any state.
    async fn find_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Sets `revoked`. Returns whether the record exists.
    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, AppError>;

    /// Conditional revoke: flips `revoked` only on a record that is usable at
    /// `now` and returns it. A second caller racing on the same token gets `None`.
    async fn revoke_active_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Revokes every unrevoked record of the account, returns how many changed.
    async fn revoke_all_refresh_tokens(&self, account_id: Uuid) -> Result<u64, AppError>;

    /// Deletes records that are revoked or expired before `now`.
    async fn delete_stale_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    /// Inserts the entry unless one exists for the digest; returns the stored entry.
    async fn insert_blacklist_entry(&self, entry: &BlacklistEntry) -> Result<BlacklistEntry, AppError>;

    async fn blacklist_entry_exists(&self, token_hash: &str) -> Result<bool, AppError>;

    async fn delete_expired_blacklist_entries(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait IdentifierRepository: Send + Sync {
    /// Atomically bumps the (prefix, period) counter and returns the new value.
    /// A missing counter row starts at 1.
    async fn increment_counter(&self, prefix: &str, period_key: &str) -> Result<u32, AppError>;

    /// Raises the counter to at least `floor`. Never lowers it.
    async fn raise_counter(&self, prefix: &str, period_key: &str, floor: u32) -> Result<(), AppError>;
}

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Fails with `DuplicateIdentifier` when the invoice number is taken.
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError>;

    async fn find_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, AppError>;

    /// Highest invoice number starting with `number_prefix`.
    async fn max_invoice_number(&self, number_prefix: &str) -> Result<Option<String>, AppError>;
}

#[async_trait]
pub trait AppointmentRequestRepository: Send + Sync {
    /// Fails with `DuplicateIdentifier` when the reference is taken.
    async fn insert_appointment_request(&self, request: &AppointmentRequest) -> Result<(), AppError>;

    /// Highest reference starting with `reference_prefix`.
    async fn max_appointment_reference(&self, reference_prefix: &str) -> Result<Option<String>, AppError>;
}

/// Everything the application needs from one backend
pub trait Storage:
    AccountRepository
    + RefreshTokenRepository
    + BlacklistRepository
    + IdentifierRepository
    + InvoiceRepository
    + AppointmentRequestRepository
{
}

impl<T> Storage for T where
    T: AccountRepository
        + RefreshTokenRepository
        + BlacklistRepository
        + IdentifierRepository
        + InvoiceRepository
        + AppointmentRequestRepository
{
}
