use actix_web::{web, HttpResponse};

use crate::auth::{AuthService, Claims};
use crate::error::AppError;
use crate::maintenance::run_cleanup;
use crate::models::StaffRole;

/// POST /api/maintenance/cleanup
///
/// Admin only. Runs both token cleanups and returns how many rows were removed.
pub async fn cleanup_tokens(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    claims.require_role(StaffRole::Admin)?;

    let report = run_cleanup(&auth).await?;
    tracing::info!(user_id = %claims.sub, "Manual token cleanup triggered");

    Ok(HttpResponse::Ok().json(report))
}
