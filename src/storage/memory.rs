/// In-process storage
///
/// Mirrors the constraints of the PostgreSQL schema (unique email, unique
/// invoice number, unique appointment reference, atomic counters) so the
/// services behave the same against either backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    AccountRepository, AppointmentRequestRepository, BlacklistRepository, IdentifierRepository,
    InvoiceRepository, RefreshTokenRepository,
};
use crate::error::{AppError, DatabaseError};
use crate::models::{Account, AppointmentRequest, BlacklistEntry, Invoice, RefreshTokenRecord};

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    blacklist: HashMap<String, BlacklistEntry>,
    counters: HashMap<(String, String), u32>,
    invoices: HashMap<String, Invoice>,
    appointment_requests: HashMap<String, AppointmentRequest>,
}

#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock cannot leave a table half-written
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored refresh token records, in any state.
    pub fn refresh_token_count(&self) -> usize {
        self.tables().refresh_tokens.len()
    }

    /// Number of stored blacklist entries, expired or not.
    pub fn blacklist_len(&self) -> usize {
        self.tables().blacklist.len()
    }
}

/// Highest identifier under `prefix`. Longer suffixes are larger numbers.
fn max_with_prefix<'a>(keys: impl Iterator<Item = &'a String>, prefix: &str) -> Option<String> {
    keys.filter(|k| k.starts_with(prefix))
        .max_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .cloned()
}

#[async_trait]
impl AccountRepository for MemoryStorage {
    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        let mut tables = self.tables();
        if tables
            .accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(DatabaseError::UniqueConstraintViolation(
                "staff_accounts_email_key".to_string(),
            )
            .into());
        }
        tables.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        Ok(self
            .tables()
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        Ok(self.tables().accounts.get(&id).cloned())
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        match self.tables().accounts.get_mut(&id) {
            Some(account) => {
                account.password_hash = password_hash.to_string();
                account.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryStorage {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        self.tables().refresh_tokens.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_active_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self
            .tables()
            .refresh_tokens
            .values()
            .find(|r| r.account_id == account_id && r.token_hash == token_hash && r.is_usable(now))
            .cloned())
    }

    async fn find_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self
            .tables()
            .refresh_tokens
            .values()
            .filter(|r| r.account_id == account_id && r.token_hash == token_hash)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, AppError> {
        match self.tables().refresh_tokens.get_mut(&id) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_active_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let mut tables = self.tables();
        let record = tables
            .refresh_tokens
            .values_mut()
            .find(|r| r.account_id == account_id && r.token_hash == token_hash && r.is_usable(now));

        Ok(record.map(|r| {
            r.revoked = true;
            r.clone()
        }))
    }

    async fn revoke_all_refresh_tokens(&self, account_id: Uuid) -> Result<u64, AppError> {
        let mut count = 0;
        for record in self.tables().refresh_tokens.values_mut() {
            if record.account_id == account_id && !record.revoked {
                record.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete_stale_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.tables();
        let before = tables.refresh_tokens.len();
        tables
            .refresh_tokens
            .retain(|_, r| !r.revoked && r.expires_at >= now);
        Ok((before - tables.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl BlacklistRepository for MemoryStorage {
    async fn insert_blacklist_entry(&self, entry: &BlacklistEntry) -> Result<BlacklistEntry, AppError> {
        Ok(self
            .tables()
            .blacklist
            .entry(entry.token_hash.clone())
            .or_insert_with(|| entry.clone())
            .clone())
    }

    async fn blacklist_entry_exists(&self, token_hash: &str) -> Result<bool, AppError> {
        Ok(self.tables().blacklist.contains_key(token_hash))
    }

    async fn delete_expired_blacklist_entries(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.tables();
        let before = tables.blacklist.len();
        tables.blacklist.retain(|_, e| e.expires_at >= now);
        Ok((before - tables.blacklist.len()) as u64)
    }
}

#[async_trait]
impl IdentifierRepository for MemoryStorage {
    async fn increment_counter(&self, prefix: &str, period_key: &str) -> Result<u32, AppError> {
        let mut tables = self.tables();
        let counter = tables
            .counters
            .entry((prefix.to_string(), period_key.to_string()))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn raise_counter(&self, prefix: &str, period_key: &str, floor: u32) -> Result<(), AppError> {
        let mut tables = self.tables();
        let counter = tables
            .counters
            .entry((prefix.to_string(), period_key.to_string()))
            .or_insert(0);
        *counter = (*counter).max(floor);
        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for MemoryStorage {
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut tables = self.tables();
        if tables.invoices.contains_key(&invoice.invoice_number) {
            return Err(DatabaseError::DuplicateIdentifier(invoice.invoice_number.clone()).into());
        }
        tables
            .invoices
            .insert(invoice.invoice_number.clone(), invoice.clone());
        Ok(())
    }

    async fn find_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, AppError> {
        Ok(self.tables().invoices.get(invoice_number).cloned())
    }

    async fn max_invoice_number(&self, number_prefix: &str) -> Result<Option<String>, AppError> {
        Ok(max_with_prefix(self.tables().invoices.keys(), number_prefix))
    }
}

#[async_trait]
impl AppointmentRequestRepository for MemoryStorage {
    async fn insert_appointment_request(&self, request: &AppointmentRequest) -> Result<(), AppError> {
        let mut tables = self.tables();
        if tables.appointment_requests.contains_key(&request.reference) {
            return Err(DatabaseError::DuplicateIdentifier(request.reference.clone()).into());
        }
        tables
            .appointment_requests
            .insert(request.reference.clone(), request.clone());
        Ok(())
    }

    async fn max_appointment_reference(&self, reference_prefix: &str) -> Result<Option<String>, AppError> {
        Ok(max_with_prefix(
            self.tables().appointment_requests.keys(),
            reference_prefix,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn appointment(reference: &str) -> AppointmentRequest {
        AppointmentRequest {
            id: Uuid::new_v4(),
            reference: reference.to_string(),
            patient_name: "Sam Molar".to_string(),
            email: "sam@example.com".to_string(),
            phone: "+1 555 010 2030".to_string(),
            preferred_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn refresh_record(account_id: Uuid, created_at: DateTime<Utc>, revoked: bool) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            account_id,
            token_hash: "digest".to_string(),
            expires_at: created_at + Duration::days(7),
            revoked,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_highest_reference_orders_numerically() {
        let storage = MemoryStorage::new();
        for reference in ["APT-2025-99999", "APT-2025-100000", "APT-2025-00007", "APT-2024-999999"] {
            storage.insert_appointment_request(&appointment(reference)).await.unwrap();
        }

        let highest = storage.max_appointment_reference("APT-2025-").await.unwrap();
        assert_eq!(highest.as_deref(), Some("APT-2025-100000"));
        assert!(storage.max_appointment_reference("APT-2026-").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_refresh_token_returns_newest_match() {
        let storage = MemoryStorage::new();
        let account_id = Uuid::new_v4();
        let now = Utc::now();

        let older = refresh_record(account_id, now - Duration::hours(2), true);
        let newer = refresh_record(account_id, now, false);
        storage.insert_refresh_token(&newer).await.unwrap();
        storage.insert_refresh_token(&older).await.unwrap();

        let found = storage.find_refresh_token(account_id, "digest").await.unwrap().unwrap();
        assert_eq!(found.id, newer.id);
        assert!(!found.revoked);
    }
}
