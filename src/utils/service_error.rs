// Service error taxonomy shared across handlers
// Expected outcomes (authentication/entitlement) carry structured detail;
// storage and verification failures surface opaquely and log with context

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    AuthenticationFailure,

    #[error("Generation limit reached")]
    EntitlementDenied {
        usage: i64,
        limit: i64,
        plan: String,
        upgrade_url: String,
    },

    #[error("Account record missing")]
    AccountNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Webhook verification failed")]
    WebhookVerificationFailure,

    #[error("Document generation failed")]
    GenerationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            // Routine outcomes, structured for the caller
            ServiceError::AuthenticationFailure => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid credentials" }),
            ),
            ServiceError::EntitlementDenied {
                usage,
                limit,
                plan,
                upgrade_url,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "Generation limit reached",
                    "usage": usage,
                    "limit": limit,
                    "plan": plan,
                    "upgrade_url": upgrade_url,
                }),
            ),
            ServiceError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            },
            ServiceError::NotFound => {
                (StatusCode::NOT_FOUND, json!({ "error": "Resource not found" }))
            },
            ServiceError::Forbidden => (StatusCode::FORBIDDEN, json!({ "error": "Forbidden" })),
            ServiceError::WebhookVerificationFailure => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid webhook signature" }),
            ),

            // Unexpected failures: log detail, surface opaquely
            ServiceError::AccountNotFound => {
                tracing::error!("Authenticated identity has no account record");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            },
            ServiceError::GenerationFailed(detail) => {
                tracing::warn!("Generation failed: {}", detail);
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "error": "Document generation failed" }),
                )
            },
            ServiceError::DatabaseError(detail) => {
                tracing::error!("Storage failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            },
            ServiceError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            ),
        };

        let mut body = body;
        body["status"] = json!(status.as_u16());
        (status, Json(body)).into_response()
    }
}

// Conversion from various error types
impl From<diesel::result::Error> for ServiceError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => ServiceError::NotFound,
            _ => ServiceError::DatabaseError(error.to_string()),
        }
    }
}

impl From<crate::models::user::UserError> for ServiceError {
    fn from(error: crate::models::user::UserError) -> Self {
        match error {
            crate::models::user::UserError::NotFound => ServiceError::AccountNotFound,
            other => ServiceError::DatabaseError(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(error: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(error.to_string())
    }
}
