/// Invoices numbered `INV-YYYY-NNNNN`.
///
/// Totals: `subtotal = Σ quantity × unit_price`,
/// `tax = subtotal × tax_rate_bps / 10000` rounded half up, `total = subtotal + tax`.

use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::configuration::BillingSettings;
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::identifiers::{period_prefix, IdentifierGenerator, MAX_IDENTIFIER_ATTEMPTS};
use crate::models::{Invoice, InvoiceItem};
use crate::storage::InvoiceRepository;
use crate::validators::{is_valid_name, is_valid_text};

const MAX_ITEMS: usize = 100;
const MAX_DESCRIPTION_LENGTH: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub patient_name: String,
    pub items: Vec<InvoiceItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Apply the tax formula. Fails on arithmetic overflow.
pub fn compute_totals(items: &[InvoiceItem], tax_rate_bps: u32) -> Result<InvoiceTotals, ValidationError> {
    let overflow = || ValidationError::OutOfRange("invoice total".to_string());

    let subtotal_cents = items
        .iter()
        .try_fold(0i64, |acc, item| acc.checked_add(item.line_total_cents()?));
    let subtotal_cents = subtotal_cents.ok_or_else(overflow)?;

    let tax_cents = subtotal_cents
        .checked_mul(i64::from(tax_rate_bps))
        .and_then(|scaled| scaled.checked_add(5_000))
        .map(|scaled| scaled / 10_000)
        .ok_or_else(overflow)?;

    let total_cents = subtotal_cents.checked_add(tax_cents).ok_or_else(overflow)?;

    Ok(InvoiceTotals {
        subtotal_cents,
        tax_cents,
        total_cents,
    })
}

fn validate_items(items: &[InvoiceItem]) -> Result<Vec<InvoiceItem>, ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::EmptyField("items".to_string()));
    }
    if items.len() > MAX_ITEMS {
        return Err(ValidationError::OutOfRange("items".to_string()));
    }

    items
        .iter()
        .map(|item| {
            if item.quantity == 0 {
                return Err(ValidationError::OutOfRange("quantity".to_string()));
            }
            if item.unit_price_cents < 0 {
                return Err(ValidationError::OutOfRange("unit_price_cents".to_string()));
            }
            Ok(InvoiceItem {
                description: is_valid_text("description", &item.description, MAX_DESCRIPTION_LENGTH)?,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct InvoiceService {
    repository: Arc<dyn InvoiceRepository>,
    identifiers: IdentifierGenerator,
    clock: Arc<dyn Clock>,
    settings: BillingSettings,
}

impl InvoiceService {
    pub fn new(
        repository: Arc<dyn InvoiceRepository>,
        identifiers: IdentifierGenerator,
        clock: Arc<dyn Clock>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            repository,
            identifiers,
            clock,
            settings,
        }
    }

    /// Validate, number and persist an invoice.
    ///
    /// A colliding invoice number resyncs the counter from the highest stored
    /// number of the period and retries.
    pub async fn create(&self, created_by: Uuid, new_invoice: NewInvoice) -> Result<Invoice, AppError> {
        let patient_name = is_valid_name("patient_name", &new_invoice.patient_name)?;
        let items = validate_items(&new_invoice.items)?;
        let totals = compute_totals(&items, self.settings.tax_rate_bps)?;
        let prefix = self.settings.invoice_prefix.as_str();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let period = self.identifiers.current_period();
            let invoice = Invoice {
                id: Uuid::new_v4(),
                invoice_number: self.identifiers.next(prefix, &period).await?,
                patient_name: patient_name.clone(),
                items: items.clone(),
                subtotal_cents: totals.subtotal_cents,
                tax_cents: totals.tax_cents,
                total_cents: totals.total_cents,
                status: "draft".to_string(),
                created_by,
                issued_at: self.clock.now(),
            };

            match self.repository.insert_invoice(&invoice).await {
                Ok(()) => {
                    tracing::info!(
                        invoice_number = %invoice.invoice_number,
                        created_by = %created_by,
                        total_cents = invoice.total_cents,
                        "Invoice created"
                    );
                    return Ok(invoice);
                }
                Err(e) if e.is_duplicate_identifier() && attempt < MAX_IDENTIFIER_ATTEMPTS => {
                    tracing::warn!(invoice_number = %invoice.invoice_number, attempt, "Invoice number collision");
                    if let Some(highest) = self
                        .repository
                        .max_invoice_number(&period_prefix(prefix, &period))
                        .await?
                    {
                        self.identifiers.resync(prefix, &period, &highest).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get(&self, invoice_number: &str) -> Result<Invoice, AppError> {
        self.repository
            .find_invoice_by_number(invoice_number)
            .await?
            .ok_or_else(|| {
                AppError::Database(DatabaseError::NotFound(format!("invoice {}", invoice_number)))
            })
    }
}
