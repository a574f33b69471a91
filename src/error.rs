/// Error Handling Module
///
/// Unified error handling for the back office:
/// 1. Domain-specific error types (validation, database, auth, config)
/// 2. A single `AppError` used for control flow with `?`
/// 3. HTTP response mapping with generic messages for auth failures
/// 4. Structured error logging with request context

use actix_web::{error::ResponseError, http::StatusCode, HttpMessage, HttpRequest, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

use crate::logger::RequestId;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    OutOfRange(String),
    SuspiciousContent(String),
    PossibleSQLInjection,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::OutOfRange(field) => write!(f, "{} is out of range", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::PossibleSQLInjection => {
                write!(f, "input contains potentially dangerous SQL patterns")
            }
        }
    }
}

impl StdError for ValidationError {}

/// Persistence backend errors
#[derive(Debug)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    /// A generated sequential identifier collided with one already persisted.
    /// The caller should generate a new identifier and retry.
    DuplicateIdentifier(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::DuplicateIdentifier(id) => {
                write!(f, "Identifier already issued: {}", id)
            }
            DatabaseError::NotFound(msg) => write!(f, "Not found: {}", msg),
            DatabaseError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication and authorization errors
#[derive(Debug)]
pub enum AuthError {
    /// Unknown account, wrong password or inactive account. Never more specific.
    InvalidCredentials,
    /// The stored password digest is not a bcrypt digest.
    HashFormat(String),
    /// No usable refresh token matched the presented secret.
    TokenNotFound,
    /// The presented refresh token was already rotated or revoked.
    TokenReuseDetected,
    TokenInvalid,
    TokenRevoked,
    MissingToken,
    Forbidden,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid credentials"),
            AuthError::HashFormat(msg) => write!(f, "Malformed password digest: {}", msg),
            AuthError::TokenNotFound => write!(f, "Refresh token not found"),
            AuthError::TokenReuseDetected => write!(f, "Refresh token reuse detected"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::TokenRevoked => write!(f, "Token has been revoked"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::Forbidden => write!(f, "Insufficient permissions"),
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl AppError {
    /// True when the error is a sequential identifier collision worth retrying.
    pub fn is_duplicate_identifier(&self) -> bool {
        matches!(self, AppError::Database(DatabaseError::DuplicateIdentifier(_)))
    }
}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

/// SQLSTATE for unique_violation
pub const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::Database(db_err)
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                AppError::Database(DatabaseError::UniqueConstraintViolation(
                    db_err.constraint().unwrap_or("unique constraint").to_string(),
                ))
            }
            sqlx::Error::Database(db_err) => {
                AppError::Database(DatabaseError::QueryExecution(db_err.message().to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            _ => AppError::Database(DatabaseError::UnexpectedError(err.to_string())),
        }
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                e.to_string(),
            ),

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_ENTRY",
                    "Resource already exists".to_string(),
                ),
                DatabaseError::DuplicateIdentifier(_) => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_IDENTIFIER",
                    "Identifier conflict, please retry".to_string(),
                ),
                DatabaseError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    e.to_string(),
                ),
                DatabaseError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                ),
            },

            // Credential failures stay generic so callers cannot enumerate accounts
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials | AuthError::HashFormat(_) => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS",
                    "Invalid credentials".to_string(),
                ),
                AuthError::TokenNotFound
                | AuthError::TokenReuseDetected
                | AuthError::TokenInvalid
                | AuthError::TokenRevoked => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID",
                    "Invalid or expired token".to_string(),
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN",
                    "Missing authentication token".to_string(),
                ),
                AuthError::Forbidden => (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Insufficient permissions".to_string(),
                ),
            },

            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                "Server configuration error".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        };

        let error_response = ErrorResponse::new(
            request_id.to_string(),
            message,
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_))
            | AppError::Database(DatabaseError::DuplicateIdentifier(_)) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Auth(AuthError::HashFormat(_)) => {
                tracing::error!(request_id = request_id, error = %self, "Stored password digest is malformed");
            }
            AppError::Auth(AuthError::TokenReuseDetected) => {
                tracing::warn!(request_id = request_id, error = %self, "Refresh token reuse");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        <Self as ErrorHandler>::error_response(self, "").0
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Reuse the request id assigned by `LoggerMiddleware` so the error log
    /// lines up with the `x-request-id` response header.
    pub fn for_request(req: &HttpRequest, operation: impl Into<String>) -> Self {
        let mut context = Self::new(operation);
        if let Some(id) = req.extensions().get::<RequestId>() {
            context.request_id = id.0.clone();
        }
        context
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) | AppError::Auth(_) => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            _ => {
                tracing::error!(error = %error, context = ?context, "Request failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_app_error_conversion() {
        let app_err: AppError = AuthError::TokenNotFound.into();
        match app_err {
            AppError::Auth(AuthError::TokenNotFound) => (),
            _ => panic!("Expected TokenNotFound"),
        }
    }

    #[test]
    fn test_auth_failures_are_generic() {
        let wrong_password = AppError::Auth(AuthError::InvalidCredentials);
        let bad_digest = AppError::Auth(AuthError::HashFormat("bad".to_string()));

        let (status_a, body_a) = ErrorHandler::error_response(&wrong_password, "a");
        let (status_b, body_b) = ErrorHandler::error_response(&bad_digest, "b");

        assert_eq!(status_a, StatusCode::UNAUTHORIZED);
        assert_eq!(status_a, status_b);
        assert_eq!(body_a.code, body_b.code);
        assert_eq!(body_a.message, body_b.message);
    }

    #[test]
    fn test_reuse_is_reported_as_invalid_token() {
        let reuse = AppError::Auth(AuthError::TokenReuseDetected);
        let (status, body) = ErrorHandler::error_response(&reuse, "req");

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "TOKEN_INVALID");
        assert!(!body.message.contains("reuse"));
    }

    #[test]
    fn test_duplicate_identifier_maps_to_conflict() {
        let err = AppError::Database(DatabaseError::DuplicateIdentifier("INV-2025-00001".into()));
        assert!(err.is_duplicate_identifier());
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert!(ctx.user_id.is_none());

        let ctx_with_user = ctx.with_user_id("user-123".to_string());
        assert_eq!(ctx_with_user.user_id, Some("user-123".to_string()));
    }

    #[test]
    fn test_error_context_uses_request_id_from_extensions() {
        let req = actix_web::test::TestRequest::default().to_http_request();
        req.extensions_mut().insert(RequestId("req-42".to_string()));

        let ctx = ErrorContext::for_request(&req, "create_invoice");
        assert_eq!(ctx.request_id, "req-42");

        let bare = actix_web::test::TestRequest::default().to_http_request();
        assert_ne!(ErrorContext::for_request(&bare, "create_invoice").request_id, "req-42");
    }

    #[test]
    fn test_missing_token_maps_to_unauthorized() {
        let (status, body) = ErrorHandler::error_response(&AppError::Auth(AuthError::MissingToken), "req");
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.code, "MISSING_TOKEN");
    }
}
