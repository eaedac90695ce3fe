//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Stripe request timed out after {0}s")]
    Timeout(u64),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Webhook signing secret not configured")]
    WebhookNotConfigured,

    #[error("Malformed webhook payload: {0}")]
    MalformedEvent(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BillingError {
    /// True for failures of the upstream billing provider (transport, auth,
    /// timeout), as opposed to failures of the inbound request.
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, BillingError::StripeApi(_) | BillingError::Timeout(_))
    }
}

impl From<stripe::StripeError> for BillingError {
    fn from(err: stripe::StripeError) -> Self {
        BillingError::StripeApi(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
