//! Entitlement cache
//!
//! Process-local projection of the billing provider's subscription event
//! stream, keyed by subscriber email. Entries are written only by verified
//! webhook events (and the test-only manual grant); entitlement checks never
//! write here, so a stale "not found" answer can never be cached.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Subscription standing as projected from provider events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Unknown,
}

impl SubscriptionStatus {
    /// Map a provider status string onto the cache's coarse states
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => SubscriptionStatus::Active,
            "canceled" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::Unknown,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
            SubscriptionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Cached entitlement state for one subscriber email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementRecord {
    /// Opaque subscription identifier from the billing provider
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    /// End of the current paid period
    pub expires_at: OffsetDateTime,
}

impl EntitlementRecord {
    /// Whether this record grants paid access at `now`
    pub fn is_paid(&self, now: OffsetDateTime) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at > now
    }
}

/// Shared in-memory entitlement cache.
///
/// Writers hold the exclusive lock only for the map mutation itself, never
/// across the provider calls that precede it. Racing writes for the same
/// email resolve by arrival order: last write wins.
#[derive(Clone, Default)]
pub struct EntitlementStore {
    inner: Arc<RwLock<HashMap<String, EntitlementRecord>>>,
}

impl EntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, email: &str) -> Option<EntitlementRecord> {
        self.inner.read().await.get(email).cloned()
    }

    pub async fn upsert(&self, email: String, record: EntitlementRecord) {
        self.inner.write().await.insert(email, record);
    }

    /// Remove the record for `email`, reporting whether one existed
    pub async fn remove(&self, email: &str) -> bool {
        self.inner.write().await.remove(email).is_some()
    }

    pub async fn contains(&self, email: &str) -> bool {
        self.inner.read().await.contains_key(email)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
