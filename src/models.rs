/// Persisted records
///
/// Plain data shared by the repositories and the services built on them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Staff roles in the back office
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Admin,
    Dentist,
    Receptionist,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::Dentist => "dentist",
            StaffRole::Receptionist => "receptionist",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "admin" => Ok(StaffRole::Admin),
            "dentist" => Ok(StaffRole::Dentist),
            "receptionist" => Ok(StaffRole::Receptionist),
            _ => Err(ValidationError::InvalidFormat("role".to_string())),
        }
    }
}

/// Staff account with its credential record.
///
/// `password_hash` is a bcrypt digest; it is never serialized.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: StaffRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored refresh token. Only the SHA-256 digest of the secret is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Usable for authentication only while unrevoked and unexpired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

/// Access token rejected before its natural expiry
#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistEntry {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl InvoiceItem {
    /// `quantity × unit_price`, `None` on overflow
    pub fn line_total_cents(&self) -> Option<i64> {
        i64::from(self.quantity).checked_mul(self.unit_price_cents)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub patient_name: String,
    pub items: Vec<InvoiceItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub status: String,
    pub created_by: Uuid,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentRequest {
    pub id: Uuid,
    pub reference: String,
    pub patient_name: String,
    pub email: String,
    pub phone: String,
    pub preferred_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_round_trip_names() {
        for role in [StaffRole::Admin, StaffRole::Dentist, StaffRole::Receptionist] {
            assert_eq!(StaffRole::parse(role.as_str()).unwrap(), role);
        }
        assert!(StaffRole::parse("janitor").is_err());
    }

    #[test]
    fn test_refresh_record_usability() {
        let now = Utc::now();
        let mut record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            token_hash: "h".to_string(),
            expires_at: now + Duration::days(1),
            revoked: false,
            created_at: now,
        };

        assert!(record.is_usable(now));
        assert!(!record.is_usable(now + Duration::days(1)));

        record.revoked = true;
        assert!(!record.is_usable(now));
    }

    #[test]
    fn test_line_total_is_checked() {
        let item = InvoiceItem {
            description: "Implant".to_string(),
            quantity: 3,
            unit_price_cents: 150_000,
        };
        assert_eq!(item.line_total_cents(), Some(450_000));

        let huge = InvoiceItem {
            quantity: 2,
            unit_price_cents: i64::MAX,
            ..item
        };
        assert_eq!(huge.line_total_cents(), None);
    }
}
