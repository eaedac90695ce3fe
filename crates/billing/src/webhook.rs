//! Stripe webhook verification and event ingestion
//!
//! Verifies the `Stripe-Signature` header manually (HMAC-SHA256 over the
//! timestamped payload) and decodes only the fields this service consumes,
//! then projects subscription lifecycle events onto the entitlement cache.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::provider::BillingProvider;
use crate::store::{EntitlementRecord, EntitlementStore, SubscriptionStatus};

type HmacSha256 = Hmac<Sha256>;

/// Accepted clock skew between the signature timestamp and now
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A signature-verified, decoded webhook event
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    /// Raw event object; decoded per kind, so unhandled kinds never fail
    pub object: serde_json::Value,
}

/// Subscription payload fields consumed by the entitlement projection
#[derive(Debug, Clone, Deserialize)]
struct SubscriptionObject {
    id: String,
    customer: String,
    status: String,
    current_period_end: i64,
}

/// Verifies webhook payloads against the shared signing secret
#[derive(Clone)]
pub struct EventVerifier {
    signing_secret: Option<String>,
}

impl EventVerifier {
    pub fn new(signing_secret: Option<String>) -> Self {
        Self { signing_secret }
    }

    /// Verify `signature` against `payload` and decode the event.
    ///
    /// Fails closed when no signing secret is configured: unverified events
    /// are never accepted.
    pub fn verify_and_decode(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        let secret = self
            .signing_secret
            .as_deref()
            .ok_or(BillingError::WebhookNotConfigured)?;

        // Signature header format: t=<unix>,v1=<hex>[,v0=<hex>]
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<&str> = None;
        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1_signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
        let v1_signature = v1_signature.ok_or(BillingError::WebhookSignatureInvalid)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(
                timestamp = timestamp,
                now = now,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        serde_json::from_str(payload).map_err(|e| BillingError::MalformedEvent(e.to_string()))
    }
}

/// Applies verified provider events to the entitlement cache
pub struct WebhookHandler {
    provider: Arc<dyn BillingProvider>,
    store: EntitlementStore,
    verifier: EventVerifier,
}

impl WebhookHandler {
    pub fn new(
        provider: Arc<dyn BillingProvider>,
        store: EntitlementStore,
        verifier: EventVerifier,
    ) -> Self {
        Self {
            provider,
            store,
            verifier,
        }
    }

    /// Verify and parse a webhook delivery
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        self.verifier.verify_and_decode(payload, signature)
    }

    /// Apply a verified event to the entitlement cache.
    ///
    /// Events this system cannot action (unknown kinds, customers with no
    /// email on file) are acknowledged without a state change, so the
    /// provider does not redeliver them forever. Racing events for the same
    /// email resolve by arrival order here, not by event timestamp.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<()> {
        match event.kind.as_str() {
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.apply_subscription_change(&event).await
            }
            "customer.subscription.deleted" => self.apply_subscription_deleted(&event).await,
            other => {
                tracing::debug!(event_id = %event.id, kind = %other, "Ignoring unhandled event kind");
                Ok(())
            }
        }
    }

    async fn apply_subscription_change(&self, event: &WebhookEvent) -> BillingResult<()> {
        let subscription = decode_subscription(&event.data.object)?;

        let Some(email) = self.owner_email(&subscription.customer).await? else {
            tracing::warn!(
                event_id = %event.id,
                customer_id = %subscription.customer,
                "Subscription event for customer with no email; acknowledged without update"
            );
            return Ok(());
        };

        let expires_at = OffsetDateTime::from_unix_timestamp(subscription.current_period_end)
            .map_err(|e| {
                BillingError::MalformedEvent(format!("invalid current_period_end: {}", e))
            })?;

        let record = EntitlementRecord {
            subscription_id: subscription.id.clone(),
            status: SubscriptionStatus::from_provider(&subscription.status),
            expires_at,
        };

        tracing::info!(
            event_id = %event.id,
            email = %email,
            subscription_id = %subscription.id,
            status = %record.status,
            "Applying subscription update"
        );

        self.store.upsert(email, record).await;
        Ok(())
    }

    async fn apply_subscription_deleted(&self, event: &WebhookEvent) -> BillingResult<()> {
        let subscription = decode_subscription(&event.data.object)?;

        let Some(email) = self.owner_email(&subscription.customer).await? else {
            tracing::warn!(
                event_id = %event.id,
                customer_id = %subscription.customer,
                "Deletion event for customer with no email; acknowledged without update"
            );
            return Ok(());
        };

        // Removed outright rather than marked canceled: the next check for
        // this email must fall through to the provider.
        let removed = self.store.remove(&email).await;

        tracing::info!(
            event_id = %event.id,
            email = %email,
            removed = removed,
            "Applied subscription deletion"
        );

        Ok(())
    }

    async fn owner_email(&self, customer_id: &str) -> BillingResult<Option<String>> {
        let customer = self.provider.retrieve_customer(customer_id).await?;
        Ok(customer.email)
    }
}

fn decode_subscription(object: &serde_json::Value) -> BillingResult<SubscriptionObject> {
    serde_json::from_value(object.clone()).map_err(|e| BillingError::MalformedEvent(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{sign_payload, subscription_event_payload, StubProvider};

    const SECRET: &str = "whsec_test123secret456";

    fn handler(stub: Arc<StubProvider>, store: EntitlementStore) -> WebhookHandler {
        WebhookHandler::new(stub, store, EventVerifier::new(Some(SECRET.to_string())))
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    #[test]
    fn valid_signature_is_accepted() {
        let verifier = EventVerifier::new(Some(SECRET.to_string()));
        let payload =
            subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let signature = sign_payload(&payload, SECRET, now());

        let event = verifier.verify_and_decode(&payload, &signature).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.kind, "customer.subscription.created");
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let verifier = EventVerifier::new(Some(SECRET.to_string()));
        let payload =
            subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let signature = sign_payload(&payload, SECRET, now());
        let tampered = payload.replace("active", "trialing");

        let err = verifier.verify_and_decode(&tampered, &signature).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    #[test]
    fn signature_from_wrong_secret_is_rejected() {
        let verifier = EventVerifier::new(Some(SECRET.to_string()));
        let payload = subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let signature = sign_payload(&payload, "whsec_other", now());

        let err = verifier.verify_and_decode(&payload, &signature).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    #[test]
    fn header_without_v1_part_is_rejected() {
        let verifier = EventVerifier::new(Some(SECRET.to_string()));

        let err = verifier.verify_and_decode("{}", "t=12345").unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let verifier = EventVerifier::new(Some(SECRET.to_string()));
        let payload = subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let stale = now() - 600;
        let signature = sign_payload(&payload, SECRET, stale);

        let err = verifier.verify_and_decode(&payload, &signature).unwrap_err();
        assert!(matches!(err, BillingError::WebhookSignatureInvalid));
    }

    #[test]
    fn missing_secret_fails_closed() {
        let verifier = EventVerifier::new(None);
        let payload = subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let signature = sign_payload(&payload, SECRET, now());

        let err = verifier.verify_and_decode(&payload, &signature).unwrap_err();
        assert!(matches!(err, BillingError::WebhookNotConfigured));
    }

    #[tokio::test]
    async fn created_event_upserts_an_entitlement_record() {
        let stub = Arc::new(StubProvider::new().with_customer("cus_1", Some("a@x.com")));
        let store = EntitlementStore::new();
        let handler = handler(stub, store.clone());
        let period_end = now() + 3600;

        let payload = subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", period_end);
        let event = handler.verify_event(&payload, &sign_payload(&payload, SECRET, now())).unwrap();
        handler.handle_event(event).await.unwrap();

        let record = store.get("a@x.com").await.unwrap();
        assert_eq!(record.subscription_id, "sub_1");
        assert_eq!(record.status, SubscriptionStatus::Active);
        assert_eq!(record.expires_at.unix_timestamp(), period_end);
    }

    #[tokio::test]
    async fn reingesting_the_same_update_is_idempotent() {
        let stub = Arc::new(StubProvider::new().with_customer("cus_1", Some("a@x.com")));
        let store = EntitlementStore::new();
        let handler = handler(stub, store.clone());

        let payload = subscription_event_payload("customer.subscription.updated", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let event = handler.verify_event(&payload, &sign_payload(&payload, SECRET, now())).unwrap();

        handler.handle_event(event.clone()).await.unwrap();
        let first = store.get("a@x.com").await.unwrap();

        handler.handle_event(event).await.unwrap();
        let second = store.get("a@x.com").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn deletion_removes_the_record_entirely() {
        let stub = Arc::new(StubProvider::new().with_customer("cus_1", Some("a@x.com")));
        let store = EntitlementStore::new();
        let handler = handler(stub, store.clone());

        let created = subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let event = handler.verify_event(&created, &sign_payload(&created, SECRET, now())).unwrap();
        handler.handle_event(event).await.unwrap();
        assert!(store.contains("a@x.com").await);

        let deleted = subscription_event_payload("customer.subscription.deleted", "evt_2", "sub_1", "cus_1", "canceled", now() + 3600);
        let event = handler.verify_event(&deleted, &sign_payload(&deleted, SECRET, now())).unwrap();
        handler.handle_event(event).await.unwrap();

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_event_kind_is_acknowledged_without_mutation() {
        let stub = Arc::new(StubProvider::new());
        let store = EntitlementStore::new();
        let handler = handler(stub, store.clone());

        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "invoice.payment_succeeded",
            "data": { "object": { "id": "in_1", "amount_paid": 500 } }
        })
        .to_string();
        let event = handler.verify_event(&payload, &sign_payload(&payload, SECRET, now())).unwrap();

        handler.handle_event(event).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn customer_without_email_is_acknowledged_without_mutation() {
        let stub = Arc::new(StubProvider::new().with_customer("cus_1", None));
        let store = EntitlementStore::new();
        let handler = handler(stub, store.clone());

        let payload = subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let event = handler.verify_event(&payload, &sign_payload(&payload, SECRET, now())).unwrap();

        handler.handle_event(event).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_subscription_object_is_rejected() {
        let stub = Arc::new(StubProvider::new());
        let handler = handler(stub, EntitlementStore::new());

        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "customer.subscription.created",
            "data": { "object": { "id": "sub_1" } }
        })
        .to_string();
        let event = handler.verify_event(&payload, &sign_payload(&payload, SECRET, now())).unwrap();

        let err = handler.handle_event(event).await.unwrap_err();
        assert!(matches!(err, BillingError::MalformedEvent(_)));
    }

    #[tokio::test]
    async fn provider_failure_during_customer_resolution_propagates() {
        let stub = Arc::new(StubProvider::new().failing());
        let store = EntitlementStore::new();
        let handler = handler(stub, store.clone());

        let payload = subscription_event_payload("customer.subscription.created", "evt_1", "sub_1", "cus_1", "active", now() + 3600);
        let event = handler.verify_event(&payload, &sign_payload(&payload, SECRET, now())).unwrap();

        let err = handler.handle_event(event).await.unwrap_err();
        assert!(err.is_provider_failure());
        assert!(store.is_empty().await);
    }
}
