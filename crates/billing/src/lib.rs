// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Paygate Billing Module
//!
//! Handles the Stripe integration for the subscription paywall: hosted
//! checkout, entitlement reconciliation, and webhook-driven cache updates.
//!
//! ## Components
//!
//! - **Checkout**: start hosted checkout sessions for an email
//! - **Entitlement**: decide whether an email currently has paid access
//! - **Store**: process-local entitlement cache, a projection of the
//!   provider's subscription event stream
//! - **Webhooks**: verify and apply subscription lifecycle events
//! - **Provider**: narrow adapter over the hosted billing provider

pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod provider;
pub mod store;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;


// Checkout
pub use checkout::{CheckoutResponse, CheckoutService};

// Client
pub use client::{StripeClient, StripeConfig};

// Entitlement
pub use entitlement::{EntitlementService, EntitlementStatus};

// Error
pub use error::{BillingError, BillingResult};

// Provider
pub use provider::{
    BillingProvider, CheckoutSessionData, CreateSessionParams, ProviderCustomer,
    ProviderSubscription, StripeProvider,
};

// Store
pub use store::{EntitlementRecord, EntitlementStore, SubscriptionStatus};

// Webhooks
pub use webhook::{EventVerifier, WebhookEvent, WebhookHandler};

use std::sync::Arc;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub entitlement: EntitlementService,
    pub webhooks: WebhookHandler,
    pub store: EntitlementStore,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Create a new billing service backed by Stripe with explicit config
    pub fn new(config: StripeConfig) -> Self {
        let provider: Arc<dyn BillingProvider> =
            Arc::new(StripeProvider::new(StripeClient::new(config.clone())));
        Self::with_provider(provider, &config)
    }

    /// Create a billing service with an injected provider.
    ///
    /// The entitlement store and the services sharing it are wired here so
    /// no component reaches for process-global state.
    pub fn with_provider(provider: Arc<dyn BillingProvider>, config: &StripeConfig) -> Self {
        let store = EntitlementStore::new();
        let verifier = EventVerifier::new(config.webhook_secret.clone());

        Self {
            checkout: CheckoutService::new(provider.clone(), config),
            entitlement: EntitlementService::new(provider.clone(), store.clone()),
            webhooks: WebhookHandler::new(provider, store.clone(), verifier),
            store,
        }
    }
}
