/// PostgreSQL storage backed by a sqlx connection pool
///
/// The pool is created once at startup, handed to `PgStorage` explicitly and
/// closed on shutdown through `PgStorage::close`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    AccountRepository, AppointmentRequestRepository, BlacklistRepository, IdentifierRepository,
    InvoiceRepository, RefreshTokenRepository,
};
use crate::configuration::DatabaseSettings;
use crate::error::{AppError, DatabaseError, UNIQUE_VIOLATION};
use crate::models::{
    Account, AppointmentRequest, BlacklistEntry, Invoice, InvoiceItem, RefreshTokenRecord, StaffRole,
};

type AccountRow = (Uuid, String, String, String, String, bool, DateTime<Utc>, DateTime<Utc>);
type RefreshTokenRow = (Uuid, Uuid, String, DateTime<Utc>, bool, DateTime<Utc>);
type InvoiceRow = (Uuid, String, String, i64, i64, i64, String, Uuid, DateTime<Utc>);

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool for the configured database.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.connection_string())
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the schema in `./migrations`.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::QueryExecution(e.to_string())))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn account_from_row(row: AccountRow) -> Result<Account, AppError> {
    let (id, email, name, password_hash, role, is_active, created_at, updated_at) = row;
    Ok(Account {
        id,
        email,
        name,
        password_hash,
        role: StaffRole::parse(&role)?,
        is_active,
        created_at,
        updated_at,
    })
}

fn refresh_token_from_row(row: RefreshTokenRow) -> RefreshTokenRecord {
    let (id, account_id, token_hash, expires_at, revoked, created_at) = row;
    RefreshTokenRecord {
        id,
        account_id,
        token_hash,
        expires_at,
        revoked,
        created_at,
    }
}

/// A unique violation on an identifier column means the generated identifier
/// was already issued.
fn identifier_conflict(err: sqlx::Error, identifier: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            AppError::Database(DatabaseError::DuplicateIdentifier(identifier.to_string()))
        }
        _ => AppError::from(err),
    }
}

fn counter_value(value: i32) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| {
        AppError::Database(DatabaseError::UnexpectedError(format!(
            "negative identifier counter: {}",
            value
        )))
    })
}

fn prefix_pattern(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

#[async_trait]
impl AccountRepository for PgStorage {
    async fn insert_account(&self, account: &Account) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO staff_accounts (id, email, name, password_hash, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.name)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.is_active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, name, password_hash, role, is_active, created_at, updated_at
            FROM staff_accounts
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, AppError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, email, name, password_hash, role, is_active, created_at, updated_at
            FROM staff_accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE staff_accounts SET password_hash = $1, updated_at = $2 WHERE id = $3",
        )
        .bind(password_hash)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStorage {
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, account_id, token_hash, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.account_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_active_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, account_id, token_hash, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE account_id = $1 AND token_hash = $2 AND revoked = false AND expires_at > $3
            "#,
        )
        .bind(account_id)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(refresh_token_from_row))
    }

    async fn find_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, account_id, token_hash, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE account_id = $1 AND token_hash = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(refresh_token_from_row))
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_active_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, AppError> {
        // Row lock + re-check of the WHERE clause makes this a compare-and-swap
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            UPDATE refresh_tokens
            SET revoked = true
            WHERE account_id = $1 AND token_hash = $2 AND revoked = false AND expires_at > $3
            RETURNING id, account_id, token_hash, expires_at, revoked, created_at
            "#,
        )
        .bind(account_id)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(refresh_token_from_row))
    }

    async fn revoke_all_refresh_tokens(&self, account_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true WHERE account_id = $1 AND revoked = false",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_stale_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1 OR revoked = true")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BlacklistRepository for PgStorage {
    async fn insert_blacklist_entry(&self, entry: &BlacklistEntry) -> Result<BlacklistEntry, AppError> {
        // The no-op update makes RETURNING yield the row that already existed
        let (token_hash, expires_at, created_at) =
            sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>)>(
                r#"
                INSERT INTO access_token_blacklist (token_hash, expires_at, created_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (token_hash) DO UPDATE SET token_hash = EXCLUDED.token_hash
                RETURNING token_hash, expires_at, created_at
                "#,
            )
            .bind(&entry.token_hash)
            .bind(entry.expires_at)
            .bind(entry.created_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(BlacklistEntry {
            token_hash,
            expires_at,
            created_at,
        })
    }

    async fn blacklist_entry_exists(&self, token_hash: &str) -> Result<bool, AppError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM access_token_blacklist WHERE token_hash = $1)",
        )
        .bind(token_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn delete_expired_blacklist_entries(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM access_token_blacklist WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdentifierRepository for PgStorage {
    async fn increment_counter(&self, prefix: &str, period_key: &str) -> Result<u32, AppError> {
        let value = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO identifier_counters (prefix, period_key, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (prefix, period_key)
            DO UPDATE SET last_value = identifier_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(prefix)
        .bind(period_key)
        .fetch_one(&self.pool)
        .await?;

        counter_value(value)
    }

    async fn raise_counter(&self, prefix: &str, period_key: &str, floor: u32) -> Result<(), AppError> {
        let floor = i32::try_from(floor)
            .map_err(|_| AppError::Internal(format!("identifier counter overflow: {}", floor)))?;

        sqlx::query(
            r#"
            INSERT INTO identifier_counters (prefix, period_key, last_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (prefix, period_key)
            DO UPDATE SET last_value = GREATEST(identifier_counters.last_value, EXCLUDED.last_value)
            "#,
        )
        .bind(prefix)
        .bind(period_key)
        .bind(floor)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl InvoiceRepository for PgStorage {
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (id, invoice_number, patient_name, subtotal_cents, tax_cents,
                                  total_cents, status, created_by, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.patient_name)
        .bind(invoice.subtotal_cents)
        .bind(invoice.tax_cents)
        .bind(invoice.total_cents)
        .bind(&invoice.status)
        .bind(invoice.created_by)
        .bind(invoice.issued_at)
        .execute(&mut tx)
        .await
        .map_err(|e| identifier_conflict(e, &invoice.invoice_number))?;

        for (position, item) in invoice.items.iter().enumerate() {
            let quantity = i32::try_from(item.quantity)
                .map_err(|_| AppError::Internal("invoice item quantity overflow".to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO invoice_items (invoice_id, position, description, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(invoice.id)
            .bind(position as i32)
            .bind(&item.description)
            .bind(quantity)
            .bind(item.unit_price_cents)
            .execute(&mut tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, AppError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT id, invoice_number, patient_name, subtotal_cents, tax_cents, total_cents,
                   status, created_by, issued_at
            FROM invoices
            WHERE invoice_number = $1
            "#,
        )
        .bind(invoice_number)
        .fetch_optional(&self.pool)
        .await?;

        let (id, invoice_number, patient_name, subtotal_cents, tax_cents, total_cents, status, created_by, issued_at) =
            match row {
                Some(row) => row,
                None => return Ok(None),
            };

        let items = sqlx::query_as::<_, (String, i32, i64)>(
            r#"
            SELECT description, quantity, unit_price_cents
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(description, quantity, unit_price_cents)| InvoiceItem {
            description,
            quantity: quantity.max(0) as u32,
            unit_price_cents,
        })
        .collect();

        Ok(Some(Invoice {
            id,
            invoice_number,
            patient_name,
            items,
            subtotal_cents,
            tax_cents,
            total_cents,
            status,
            created_by,
            issued_at,
        }))
    }

    async fn max_invoice_number(&self, number_prefix: &str) -> Result<Option<String>, AppError> {
        let max = sqlx::query_scalar::<_, String>(
            r#"
            SELECT invoice_number FROM invoices
            WHERE invoice_number LIKE $1
            ORDER BY length(invoice_number) DESC, invoice_number DESC
            LIMIT 1
            "#,
        )
        .bind(prefix_pattern(number_prefix))
        .fetch_optional(&self.pool)
        .await?;

        Ok(max)
    }
}

#[async_trait]
impl AppointmentRequestRepository for PgStorage {
    async fn insert_appointment_request(&self, request: &AppointmentRequest) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO appointment_requests (id, reference, patient_name, email, phone,
                                              preferred_date, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(request.id)
        .bind(&request.reference)
        .bind(&request.patient_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(request.preferred_date)
        .bind(&request.notes)
        .bind(request.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| identifier_conflict(e, &request.reference))?;

        Ok(())
    }

    async fn max_appointment_reference(&self, reference_prefix: &str) -> Result<Option<String>, AppError> {
        let max = sqlx::query_scalar::<_, String>(
            r#"
            SELECT reference FROM appointment_requests
            WHERE reference LIKE $1
            ORDER BY length(reference) DESC, reference DESC
            LIMIT 1
            "#,
        )
        .bind(prefix_pattern(reference_prefix))
        .fetch_optional(&self.pool)
        .await?;

        Ok(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_pattern_escapes_wildcards() {
        assert_eq!(prefix_pattern("INV-2025-"), "INV-2025-%");
        assert_eq!(prefix_pattern("A_B%"), "A\\_B\\%%");
    }

    #[test]
    fn test_counter_value_rejects_negative() {
        assert_eq!(counter_value(7).unwrap(), 7);
        assert!(counter_value(-1).is_err());
    }
}
