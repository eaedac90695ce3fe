//! Test support: an in-memory stand-in for the billing provider plus
//! helpers for producing signed webhook deliveries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BillingError, BillingResult};
use crate::provider::{
    BillingProvider, CheckoutSessionData, CreateSessionParams, ProviderCustomer,
    ProviderSubscription,
};

/// Owned snapshot of a checkout session request seen by the stub
#[derive(Debug, Clone)]
pub(crate) struct RecordedSession {
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub price_id: String,
    pub success_url: String,
}

/// In-memory billing provider stub
#[derive(Default)]
pub(crate) struct StubProvider {
    customers: Mutex<Vec<ProviderCustomer>>,
    subscriptions: Mutex<HashMap<String, ProviderSubscription>>,
    pub sessions: Mutex<Vec<RecordedSession>>,
    pub find_customer_calls: AtomicUsize,
    pub list_subscription_calls: AtomicUsize,
    pub retrieve_customer_calls: AtomicUsize,
    fail: AtomicBool,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(self, id: &str, email: Option<&str>) -> Self {
        self.customers.lock().unwrap().push(ProviderCustomer {
            id: id.to_string(),
            email: email.map(String::from),
        });
        self
    }

    pub fn with_active_subscription(self, customer_id: &str, subscription_id: &str, period_end: i64) -> Self {
        self.subscriptions.lock().unwrap().insert(
            customer_id.to_string(),
            ProviderSubscription {
                id: subscription_id.to_string(),
                status: "active".to_string(),
                current_period_end: period_end,
            },
        );
        self
    }

    /// Make every provider call fail, simulating an outage
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    fn check_up(&self) -> BillingResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(BillingError::StripeApi("stub outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BillingProvider for StubProvider {
    async fn create_checkout_session(
        &self,
        params: CreateSessionParams<'_>,
    ) -> BillingResult<CheckoutSessionData> {
        self.check_up()?;

        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(RecordedSession {
            customer_id: params.customer_id.map(String::from),
            customer_email: params.customer_email.map(String::from),
            price_id: params.price_id.to_string(),
            success_url: params.success_url.to_string(),
        });

        Ok(CheckoutSessionData {
            id: format!("cs_test_{}", sessions.len()),
            url: Some("https://checkout.stripe.example/pay/cs_test".to_string()),
        })
    }

    async fn find_customer_by_email(&self, email: &str) -> BillingResult<Option<ProviderCustomer>> {
        self.find_customer_calls.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;

        Ok(self
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn list_active_subscription(
        &self,
        customer_id: &str,
    ) -> BillingResult<Option<ProviderSubscription>> {
        self.list_subscription_calls.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;

        Ok(self.subscriptions.lock().unwrap().get(customer_id).cloned())
    }

    async fn retrieve_customer(&self, customer_id: &str) -> BillingResult<ProviderCustomer> {
        self.retrieve_customer_calls.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;

        self.customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == customer_id)
            .cloned()
            .ok_or_else(|| BillingError::StripeApi(format!("No such customer: {}", customer_id)))
    }
}

/// Compute a valid `Stripe-Signature` header for `payload`
pub(crate) fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Build a subscription lifecycle event payload the way Stripe delivers it
pub(crate) fn subscription_event_payload(
    kind: &str,
    event_id: &str,
    subscription_id: &str,
    customer_id: &str,
    status: &str,
    period_end: i64,
) -> String {
    serde_json::json!({
        "id": event_id,
        "type": kind,
        "data": {
            "object": {
                "id": subscription_id,
                "customer": customer_id,
                "status": status,
                "current_period_end": period_end,
            }
        }
    })
    .to_string()
}
