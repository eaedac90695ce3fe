//! Billing routes for the Stripe-backed paywall

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Days of access granted by the manual test activation
const TEST_GRANT_DAYS: i64 = 30;

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    #[serde(default)]
    pub email: String,
    #[serde(rename = "priceId")]
    pub price_id: Option<String>,
}

/// Response from creating a checkout session
#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub url: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Query for verifying a subscription
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub email: String,
}

/// Entitlement answer for a subscriber email
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub paid: bool,
    #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// Acknowledgement returned to the webhook sender
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

/// Request for the manual test activation
#[derive(Debug, Deserialize)]
pub struct TestSubscriptionRequest {
    #[serde(default)]
    pub email: String,
}

/// Response from the manual test activation
#[derive(Debug, Serialize)]
pub struct TestSubscriptionResponse {
    pub paid: bool,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<String>,
    pub message: String,
}

fn format_expiry(expires_at: Option<OffsetDateTime>) -> Option<String> {
    expires_at.and_then(|ts| ts.format(&Rfc3339).ok())
}

/// Create a hosted checkout session for an email
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CreateCheckoutResponse>> {
    let checkout = state
        .billing
        .checkout
        .start_checkout(&req.email, req.price_id.as_deref())
        .await?;

    Ok(Json(CreateCheckoutResponse {
        url: checkout.url,
        session_id: checkout.session_id,
    }))
}

/// Check whether an email currently has an active paid subscription
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> ApiResult<Json<VerifyResponse>> {
    if query.email.is_empty() {
        return Err(ApiError::EmailRequired);
    }

    let status = state
        .billing
        .entitlement
        .check_entitlement(&query.email)
        .await?;

    Ok(Json(VerifyResponse {
        paid: status.paid,
        expires_at: format_expiry(status.expires_at),
    }))
}

/// Receive a Stripe webhook event
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::WebhookRejected("Missing Stripe signature".to_string())
        })?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, "Stripe webhook rejected");
            ApiError::from(e)
        })?;

    tracing::info!(event_id = %event.id, kind = %event.kind, "Stripe webhook event verified");

    state.billing.webhooks.handle_event(event).await?;

    Ok(Json(WebhookAck { received: true }))
}

/// Manually activate a test subscription (non-production deployments only)
pub async fn test_subscription(
    State(state): State<AppState>,
    Json(req): Json<TestSubscriptionRequest>,
) -> ApiResult<Json<TestSubscriptionResponse>> {
    if req.email.is_empty() {
        return Err(ApiError::Validation("Email is required".to_string()));
    }

    let status = state
        .billing
        .entitlement
        .grant_manual(&req.email, TEST_GRANT_DAYS)
        .await?;

    Ok(Json(TestSubscriptionResponse {
        paid: status.paid,
        expires_at: format_expiry(status.expires_at),
        message: "Test subscription activated".to_string(),
    }))
}
