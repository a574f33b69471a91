/// Patient booking requests, referenced as `APT-YYYY-NNNNN`.
///
/// A request is only recorded; slot allocation happens at the front desk.

use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::configuration::BillingSettings;
use crate::error::{AppError, ValidationError};
use crate::identifiers::{period_prefix, IdentifierGenerator, MAX_IDENTIFIER_ATTEMPTS};
use crate::models::AppointmentRequest;
use crate::storage::AppointmentRequestRepository;
use crate::validators::{is_valid_email, is_valid_name, is_valid_phone, is_valid_text};

const MAX_NOTES_LENGTH: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewAppointmentRequest {
    pub patient_name: String,
    pub email: String,
    pub phone: String,
    pub preferred_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct AppointmentRequestService {
    repository: Arc<dyn AppointmentRequestRepository>,
    identifiers: IdentifierGenerator,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl AppointmentRequestService {
    pub fn new(
        repository: Arc<dyn AppointmentRequestRepository>,
        identifiers: IdentifierGenerator,
        clock: Arc<dyn Clock>,
        settings: &BillingSettings,
    ) -> Self {
        Self {
            repository,
            identifiers,
            clock,
            prefix: settings.appointment_prefix.clone(),
        }
    }

    pub async fn submit(&self, request: NewAppointmentRequest) -> Result<AppointmentRequest, AppError> {
        let patient_name = is_valid_name("patient_name", &request.patient_name)?;
        let email = is_valid_email(&request.email)?;
        let phone = is_valid_phone(&request.phone)?;
        let notes = match request.notes.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(is_valid_text("notes", text, MAX_NOTES_LENGTH)?),
            _ => None,
        };

        let now = self.clock.now();
        if request.preferred_date < now.date_naive() {
            return Err(ValidationError::OutOfRange("preferred_date".to_string()).into());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let period = self.identifiers.current_period();
            let record = AppointmentRequest {
                id: Uuid::new_v4(),
                reference: self.identifiers.next(&self.prefix, &period).await?,
                patient_name: patient_name.clone(),
                email: email.clone(),
                phone: phone.clone(),
                preferred_date: request.preferred_date,
                notes: notes.clone(),
                created_at: now,
            };

            match self.repository.insert_appointment_request(&record).await {
                Ok(()) => {
                    tracing::info!(reference = %record.reference, "Appointment request received");
                    return Ok(record);
                }
                Err(e) if e.is_duplicate_identifier() && attempt < MAX_IDENTIFIER_ATTEMPTS => {
                    if let Some(highest) = self
                        .repository
                        .max_appointment_reference(&period_prefix(&self.prefix, &period))
                        .await?
                    {
                        self.identifiers.resync(&self.prefix, &period, &highest).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
