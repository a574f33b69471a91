use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::error::{AppError, ErrorContext};
use crate::records::{AppointmentRequestService, NewAppointmentRequest};

#[derive(Serialize)]
pub struct AppointmentRequestResponse {
    pub reference: String,
    pub preferred_date: String,
}

/// POST /appointment-requests
///
/// Public booking form. The reference is what the patient quotes when calling
/// the front desk.
pub async fn request_appointment(
    req: HttpRequest,
    form: web::Json<NewAppointmentRequest>,
    appointments: web::Data<AppointmentRequestService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "appointment_request");

    let request = appointments.submit(form.into_inner()).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;

    Ok(HttpResponse::Created().json(AppointmentRequestResponse {
        reference: request.reference,
        preferred_date: request.preferred_date.to_string(),
    }))
}
