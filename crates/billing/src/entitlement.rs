//! Subscription reconciliation
//!
//! Decides whether an email currently has paid access by combining the
//! entitlement cache fast path with an authoritative lookup at the billing
//! provider.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::provider::BillingProvider;
use crate::store::{EntitlementRecord, EntitlementStore, SubscriptionStatus};

/// Outcome of an entitlement check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementStatus {
    pub paid: bool,
    pub expires_at: Option<OffsetDateTime>,
}

/// Entitlement service answering "does this email have paid access right now?"
pub struct EntitlementService {
    provider: Arc<dyn BillingProvider>,
    store: EntitlementStore,
}

impl EntitlementService {
    pub fn new(provider: Arc<dyn BillingProvider>, store: EntitlementStore) -> Self {
        Self { provider, store }
    }

    /// Check whether `email` currently has paid access.
    ///
    /// Strict short-circuit: a cache hit is trusted outright, since entries
    /// are only ever written from verified provider events. A miss can mean
    /// "never subscribed" or "event not delivered yet", so it falls through
    /// to the provider — and the answer is NOT written back to the cache.
    ///
    /// Provider failures surface as errors; a transient outage must read as
    /// "unknown" to the caller, never as a silent revocation of access.
    pub async fn check_entitlement(&self, email: &str) -> BillingResult<EntitlementStatus> {
        if email.is_empty() {
            return Err(BillingError::Validation("email is required".to_string()));
        }

        if let Some(record) = self.store.get(email).await {
            let paid = record.is_paid(OffsetDateTime::now_utc());
            tracing::debug!(email = %email, paid = paid, "Entitlement served from cache");
            return Ok(EntitlementStatus {
                paid,
                expires_at: Some(record.expires_at),
            });
        }

        let Some(customer) = self.provider.find_customer_by_email(email).await? else {
            return Ok(EntitlementStatus {
                paid: false,
                expires_at: None,
            });
        };

        match self.provider.list_active_subscription(&customer.id).await? {
            Some(subscription) => {
                let expires_at =
                    OffsetDateTime::from_unix_timestamp(subscription.current_period_end).map_err(
                        |e| BillingError::StripeApi(format!("Invalid subscription period end: {}", e)),
                    )?;

                tracing::debug!(
                    email = %email,
                    subscription_id = %subscription.id,
                    "Active subscription found at provider"
                );

                Ok(EntitlementStatus {
                    paid: true,
                    expires_at: Some(expires_at),
                })
            }
            None => Ok(EntitlementStatus {
                paid: false,
                expires_at: None,
            }),
        }
    }

    /// Manually grant `days` of access, bypassing the billing provider.
    ///
    /// Backs the test-only activation endpoint; deployments must not expose
    /// it in production.
    pub async fn grant_manual(&self, email: &str, days: i64) -> BillingResult<EntitlementStatus> {
        if email.is_empty() {
            return Err(BillingError::Validation("email is required".to_string()));
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = now + time::Duration::days(days);

        let record = EntitlementRecord {
            subscription_id: format!("test_{}", now.unix_timestamp()),
            status: SubscriptionStatus::Active,
            expires_at,
        };
        self.store.upsert(email.to_string(), record).await;

        tracing::info!(email = %email, days = days, "Manual test entitlement granted");

        Ok(EntitlementStatus {
            paid: true,
            expires_at: Some(expires_at),
        })
    }
}
