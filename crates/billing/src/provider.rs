//! Billing provider adapter
//!
//! A narrow seam over the hosted billing provider: checkout session creation,
//! customer lookup, and subscription listing. Implementations perform no
//! caching and no retries; callers treat every method as slow, fallible I/O.

use std::future::Future;

use async_trait::async_trait;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    Customer, CustomerId, ListCustomers, ListSubscriptions, Subscription, SubscriptionStatusFilter,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Customer record as reported by the billing provider
#[derive(Debug, Clone)]
pub struct ProviderCustomer {
    pub id: String,
    /// Email on file; a customer can exist without one
    pub email: Option<String>,
}

/// Subscription summary for a customer
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    /// Unix timestamp of the end of the current paid period
    pub current_period_end: i64,
}

/// Hosted checkout session handle returned by the provider
#[derive(Debug, Clone)]
pub struct CheckoutSessionData {
    pub id: String,
    pub url: Option<String>,
}

/// Parameters for creating a hosted checkout session.
///
/// Exactly one of `customer_id` / `customer_email` is set: an existing
/// customer binds the session to their id, otherwise the raw email rides
/// along and the provider creates the customer on successful payment.
#[derive(Debug, Clone)]
pub struct CreateSessionParams<'a> {
    pub customer_id: Option<&'a str>,
    pub customer_email: Option<&'a str>,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// The capabilities this service consumes from the hosted billing provider
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a hosted checkout session and return its redirect handle
    async fn create_checkout_session(
        &self,
        params: CreateSessionParams<'_>,
    ) -> BillingResult<CheckoutSessionData>;

    /// Limit-1 lookup by email. When the provider holds duplicate customers
    /// for an email the first result wins; duplicates are a provider-side
    /// data-quality assumption, not handled here.
    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<ProviderCustomer>>;

    /// First active subscription for a customer, if any (limit 1)
    async fn list_active_subscription(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<ProviderSubscription>>;

    /// Retrieve a customer by id
    async fn retrieve_customer(&self, customer_id: &str) -> BillingResult<ProviderCustomer>;
}

/// Production provider backed by the Stripe API
pub struct StripeProvider {
    stripe: StripeClient,
}

impl StripeProvider {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Bound an outbound Stripe call with the configured timeout
    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, stripe::StripeError>> + Send,
    ) -> BillingResult<T> {
        let timeout = self.stripe.config().request_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(BillingError::from),
            Err(_) => Err(BillingError::Timeout(timeout.as_secs())),
        }
    }

    fn parse_customer_id(customer_id: &str) -> BillingResult<CustomerId> {
        customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))
    }
}

#[async_trait]
impl BillingProvider for StripeProvider {
    async fn create_checkout_session(
        &self,
        params: CreateSessionParams<'_>,
    ) -> BillingResult<CheckoutSessionData> {
        let customer = match params.customer_id {
            Some(id) => Some(Self::parse_customer_id(id)?),
            None => None,
        };

        let create_params = CreateCheckoutSession {
            customer,
            customer_email: params.customer_email,
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(params.price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(params.success_url),
            cancel_url: Some(params.cancel_url),
            ..Default::default()
        };

        let session = self
            .bounded(CheckoutSession::create(self.stripe.inner(), create_params))
            .await?;

        Ok(CheckoutSessionData {
            id: session.id.to_string(),
            url: session.url,
        })
    }

    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<ProviderCustomer>> {
        let list_params = ListCustomers {
            email: Some(email),
            limit: Some(1),
            ..Default::default()
        };

        let customers = self
            .bounded(Customer::list(self.stripe.inner(), &list_params))
            .await?;

        Ok(customers.data.into_iter().next().map(|c| ProviderCustomer {
            id: c.id.to_string(),
            email: c.email,
        }))
    }

    async fn list_active_subscription(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<ProviderSubscription>> {
        let customer_id = Self::parse_customer_id(customer_id)?;

        let list_params = ListSubscriptions {
            customer: Some(customer_id),
            status: Some(SubscriptionStatusFilter::Active),
            limit: Some(1),
            ..Default::default()
        };

        let subscriptions = self
            .bounded(Subscription::list(self.stripe.inner(), &list_params))
            .await?;

        Ok(subscriptions
            .data
            .into_iter()
            .next()
            .map(|s| ProviderSubscription {
                id: s.id.to_string(),
                status: s.status.to_string(),
                current_period_end: s.current_period_end,
            }))
    }

    async fn retrieve_customer(&self, customer_id: &str) -> BillingResult<ProviderCustomer> {
        let customer_id = Self::parse_customer_id(customer_id)?;

        let customer = self
            .bounded(Customer::retrieve(self.stripe.inner(), &customer_id, &[]))
            .await?;

        Ok(ProviderCustomer {
            id: customer.id.to_string(),
            email: customer.email,
        })
    }
}
