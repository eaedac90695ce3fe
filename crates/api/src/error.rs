//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use paygate_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Email is required")]
    EmailRequired,

    // Webhook errors (signature, parse, or unconfigured secret)
    #[error("Webhook rejected: {0}")]
    WebhookRejected(String),

    // Billing provider errors
    #[error("Billing provider error: {0}")]
    Provider(String),

    // Internal errors
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            // The verify endpoint's contract: a rejected check reports
            // paid:false alongside the error.
            ApiError::EmailRequired => (
                StatusCode::BAD_REQUEST,
                json!({ "error": self.to_string(), "paid": false }),
            ),
            ApiError::WebhookRejected(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Provider(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(msg) => ApiError::Validation(msg),
            BillingError::WebhookSignatureInvalid
            | BillingError::WebhookNotConfigured
            | BillingError::MalformedEvent(_) => ApiError::WebhookRejected(err.to_string()),
            BillingError::StripeApi(_) | BillingError::Timeout(_) => {
                tracing::error!(error = %err, "Billing provider call failed");
                ApiError::Provider(err.to_string())
            }
            BillingError::Config(_) => {
                tracing::error!(error = %err, "Billing misconfiguration surfaced at runtime");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
