/// Authentication Routes
///
/// Handles staff registration, login, token refresh, logout, password change
/// and current user information.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthService, Claims, NewAccount, TokenPair};
use crate::error::{AppError, ErrorContext};
use crate::middleware::AccessToken;
use crate::models::{Account, StaffRole};

/// Self-service registration request. Any `role` in the body is ignored.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

/// Staff account created by an admin
#[derive(Deserialize)]
pub struct CreateStaffRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
}

/// Staff login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub user_id: Uuid,
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Staff member information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: StaffRole,
    pub created_at: String,
}

impl From<Account> for UserResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id.to_string(),
            email: account.email,
            name: account.name,
            role: account.role,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct RevocationResponse {
    pub revoked_refresh_tokens: u64,
}

fn with_context<T>(context: &ErrorContext, result: Result<T, AppError>) -> Result<T, AppError> {
    if let Err(e) = &result {
        context.log_error(e);
    }
    result
}

/// POST /auth/register
///
/// Register a new receptionist account with email, password and name.
/// Returns access token and refresh token on success.
///
/// # Errors
/// - 400: Validation errors (invalid email/password/name)
/// - 409: Email already registered
pub async fn register(
    req: HttpRequest,
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "staff_registration");
    let form = form.into_inner();

    let (account, tokens) = with_context(
        &context,
        auth.register(form.email, form.name, form.password).await,
    )?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %account.id,
        "Registration completed"
    );

    Ok(HttpResponse::Created().json(tokens))
}

/// POST /api/staff
///
/// Admin only. Creates a staff account with any role
/// (`admin`, `dentist`, `receptionist`).
///
/// # Errors
/// - 400: Validation errors (invalid email/password/name/role)
/// - 403: Caller is not an admin
/// - 409: Email already registered
pub async fn create_staff(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    form: web::Json<CreateStaffRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    claims.require_role(StaffRole::Admin)?;
    let context = ErrorContext::for_request(&req, "create_staff").with_user_id(claims.sub.clone());
    let form = form.into_inner();

    let role = StaffRole::parse(&form.role)?;
    let account = with_context(
        &context,
        auth.create_account(NewAccount {
            email: form.email,
            name: form.name,
            password: form.password,
            role,
        })
        .await,
    )?;

    Ok(HttpResponse::Created().json(UserResponse::from(account)))
}

/// POST /auth/login
///
/// Authenticate with email and password.
///
/// # Errors
/// - 401: Invalid credentials. Unknown email, wrong password and inactive
///   account all produce the same response.
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "staff_login");
    let (_, tokens) = with_context(&context, auth.login(&form.email, &form.password).await)?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a new token pair. The presented token is
/// revoked; presenting it again revokes every session of the account.
///
/// # Errors
/// - 401: Token unknown, expired, revoked or reused
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "token_refresh").with_user_id(form.user_id.to_string());
    let tokens: TokenPair =
        with_context(&context, auth.refresh(form.user_id, &form.refresh_token).await)?;

    tracing::info!(request_id = %context.request_id, user_id = %tokens.user_id, "Tokens refreshed");
    Ok(HttpResponse::Ok().json(tokens))
}

/// GET /api/me
///
/// **Requires valid JWT access token** in Authorization header.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let account = auth.current_account(claims.user_id()?).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(account)))
}

/// POST /api/auth/logout
///
/// Blacklists the presented access token until it expires and revokes every
/// refresh token of the account.
pub async fn logout(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    token: web::ReqData<AccessToken>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "staff_logout").with_user_id(claims.sub.clone());
    let revoked = with_context(&context, auth.logout(&token.0, &claims).await)?;

    Ok(HttpResponse::Ok().json(RevocationResponse {
        revoked_refresh_tokens: revoked,
    }))
}

/// POST /api/auth/change-password
///
/// All refresh tokens of the account are revoked on success; the current
/// access token stays valid until it expires.
///
/// # Errors
/// - 400: New password too weak
/// - 401: Current password wrong
pub async fn change_password(
    req: HttpRequest,
    claims: web::ReqData<Claims>,
    form: web::Json<ChangePasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::for_request(&req, "change_password").with_user_id(claims.sub.clone());
    let revoked = with_context(
        &context,
        auth.change_password(claims.user_id()?, &form.current_password, &form.new_password)
            .await,
    )?;

    Ok(HttpResponse::Ok().json(RevocationResponse {
        revoked_refresh_tokens: revoked,
    }))
}
