use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::Claims;
use crate::error::{AppError, ErrorContext};
use crate::records::{InvoiceService, NewInvoice};

/// POST /api/invoices
///
/// Creates a draft invoice numbered `INV-YYYY-NNNNN`.
///
/// # Errors
/// - 400: Invalid patient name or line items
/// - 409: Number still colliding after the retry budget
pub async fn create_invoice(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    form: web::Json<NewInvoice>,
    invoices: web::Data<InvoiceService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "create_invoice").with_user_id(claims.sub.clone());

    match invoices.create(claims.user_id()?, form.into_inner()).await {
        Ok(invoice) => Ok(HttpResponse::Created().json(invoice)),
        Err(e) => {
            context.log_error(&e);
            Err(e)
        }
    }
}

/// GET /api/invoices/{invoice_number}
pub async fn get_invoice(
    path: web::Path<String>,
    invoices: web::Data<InvoiceService>,
) -> Result<HttpResponse, AppError> {
    let invoice = invoices.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(invoice))
}
