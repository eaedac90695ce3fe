//! Hosted checkout sessions

use std::sync::Arc;

use serde::Serialize;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::provider::{BillingProvider, CreateSessionParams};

/// Response for starting a checkout session
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

/// Checkout service for starting hosted checkout flows
pub struct CheckoutService {
    provider: Arc<dyn BillingProvider>,
    default_price_id: String,
    app_base_url: String,
}

impl CheckoutService {
    pub fn new(provider: Arc<dyn BillingProvider>, config: &StripeConfig) -> Self {
        Self {
            provider,
            default_price_id: config.default_price_id.clone(),
            app_base_url: config.app_base_url.clone(),
        }
    }

    /// Start a checkout flow for `email`.
    ///
    /// An existing provider customer binds the session to their id; otherwise
    /// the session carries the raw email and the provider creates the
    /// customer as a side effect of successful payment. Session creation is
    /// never retried here: a blind retry could create duplicate sessions for
    /// the same intent, so the caller must re-initiate explicitly.
    pub async fn start_checkout(
        &self,
        email: &str,
        price_id: Option<&str>,
    ) -> BillingResult<CheckoutResponse> {
        validate_email(email)?;

        let price_id = price_id
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_price_id);

        let customer = self.provider.find_customer_by_email(email).await?;

        let success_url = format!(
            "{}/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.app_base_url
        );
        let cancel_url = format!("{}/", self.app_base_url);

        let session = self
            .provider
            .create_checkout_session(CreateSessionParams {
                customer_id: customer.as_ref().map(|c| c.id.as_str()),
                customer_email: if customer.is_some() { None } else { Some(email) },
                price_id,
                success_url: &success_url,
                cancel_url: &cancel_url,
            })
            .await?;

        tracing::info!(
            session_id = %session.id,
            existing_customer = customer.is_some(),
            "Created checkout session"
        );

        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        })
    }
}

/// Validate that `email` looks like a single contact address
fn validate_email(email: &str) -> BillingResult<()> {
    if email.is_empty() {
        return Err(BillingError::Validation("email is required".to_string()));
    }

    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();

    if local.is_empty()
        || domain.is_empty()
        || parts.next().is_some()
        || email.chars().any(|c| c.is_whitespace() || c == ',')
    {
        return Err(BillingError::Validation(format!(
            "invalid email address: {}",
            email
        )));
    }

    Ok(())
}
