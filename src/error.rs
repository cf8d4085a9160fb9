use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    /// Container-runtime socket fault (Docker Engine API via `bollard`).
    #[error("Runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Pull failed: {0}")]
    PullFailed(String),

    #[error("Healthcheck failed: {0}")]
    HealthcheckFailed(String),

    #[error("ACME order invalid: {0}")]
    AcmeOrderInvalid(String),

    #[error("ACME timeout: {0}")]
    AcmeTimeout(String),

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, error_code) = match &self {
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error occurred".to_string(),
                "DATABASE_ERROR",
            ),
            AppError::Redis(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Cache error occurred".to_string(),
                "CACHE_ERROR",
            ),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), "AUTHENTICATION_ERROR"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed".to_string(), "VALIDATION_ERROR"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), "NOT_FOUND"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), "CONFLICT"),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "BAD_REQUEST"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), "FORBIDDEN"),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "INTERNAL_ERROR"),
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string(), "INVALID_TOKEN"),
            AppError::Bcrypt(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password hashing error".to_string(),
                "PASSWORD_HASH_ERROR",
            ),
            AppError::Runtime(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "RUNTIME_ERROR"),
            AppError::HttpClient(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "External service error".to_string(),
                "HTTP_CLIENT_ERROR",
            ),
            AppError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Data serialization error".to_string(),
                "SERIALIZATION_ERROR",
            ),
            AppError::InvalidDependency(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "INVALID_DEPENDENCY"),
            AppError::BuildFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), "BUILD_FAILED"),
            AppError::PullFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), "PULL_FAILED"),
            AppError::HealthcheckFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), "HEALTHCHECK_FAILED"),
            AppError::AcmeOrderInvalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), "ACME_ORDER_INVALID"),
            AppError::AcmeTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg.clone(), "ACME_TIMEOUT"),
            AppError::SignatureMismatch => (
                StatusCode::UNAUTHORIZED,
                "Webhook signature mismatch".to_string(),
                "SIGNATURE_MISMATCH",
            ),
            AppError::UpstreamUnreachable(msg) => (StatusCode::BAD_GATEWAY, msg.clone(), "UPSTREAM_UNREACHABLE"),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

// Convenience constructors
impl AppError {
    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(format!("{} not found", resource))
    }

    pub fn conflict(resource: &str) -> Self {
        AppError::Conflict(format!("{} already exists", resource))
    }

    pub fn bad_request(message: &str) -> Self {
        AppError::BadRequest(message.to_string())
    }

    pub fn forbidden(message: &str) -> Self {
        AppError::Forbidden(message.to_string())
    }

    pub fn internal(message: &str) -> Self {
        AppError::Internal(message.to_string())
    }

    pub fn auth(message: &str) -> Self {
        AppError::Auth(message.to_string())
    }

    pub fn invalid_dependency(message: impl Into<String>) -> Self {
        AppError::InvalidDependency(message.into())
    }
}
