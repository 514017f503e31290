// Billing webhook verification and payload parsing
// Signature check is mandatory before any state mutation; an unverifiable
// event is rejected outright and never retried from this side.

use chrono::{DateTime, Utc};
use ring::hmac;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::services::plan_transition::PaymentEvent;

pub const SIGNATURE_HEADER: &str = "billing-signature";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Signature timestamp outside tolerance")]
    StaleTimestamp,

    #[error("Signature mismatch")]
    InvalidSignature,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

// =============================================================================
// SIGNATURE VERIFICATION
// =============================================================================

/// Verify a `t=<unix>,v1=<hex>` signature header over `"{t}.{payload}"`
/// with HMAC-SHA256. Comparison is constant-time via `ring::hmac::verify`.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => {
                timestamp = Some(value.parse().map_err(|_| WebhookError::MalformedHeader)?);
            },
            (Some("v1"), Some(value)) => {
                signatures.push(decode_hex(value).ok_or(WebhookError::MalformedHeader)?);
            },
            _ => {},
        }
    }

    let timestamp = timestamp.ok_or(WebhookError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedHeader);
    }

    if (now.timestamp() - timestamp).abs() > tolerance_secs {
        return Err(WebhookError::StaleTimestamp);
    }

    let mut signed_payload = timestamp.to_string().into_bytes();
    signed_payload.push(b'.');
    signed_payload.extend_from_slice(payload);

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    // The header may carry several v1 entries during secret rotation.
    for signature in &signatures {
        if hmac::verify(&key, &signed_payload, signature).is_ok() {
            return Ok(());
        }
    }

    Err(WebhookError::InvalidSignature)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

// =============================================================================
// PAYLOAD PARSING
// =============================================================================

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

/// The relevant fields of the event object. For checkout events the object
/// is the checkout session; for subscription events it is the subscription.
#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    client_reference_id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Parse a verified payload into a typed event. Event types this handler
/// does not consume parse to `None` and are acknowledged unprocessed.
pub fn parse_event(payload: &[u8]) -> Result<Option<PaymentEvent>, WebhookError> {
    let envelope: WebhookEnvelope = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let object = envelope.data.object;

    match envelope.event_type.as_str() {
        "checkout.session.completed" => {
            let customer_ref = object
                .customer
                .ok_or_else(|| WebhookError::InvalidPayload("missing customer".into()))?;
            let subscription_ref = object
                .subscription
                .ok_or_else(|| WebhookError::InvalidPayload("missing subscription".into()))?;
            let price_id = object
                .metadata
                .get("price_id")
                .cloned()
                .ok_or_else(|| WebhookError::InvalidPayload("missing price_id".into()))?;

            Ok(Some(PaymentEvent::CheckoutCompleted {
                customer_ref,
                subscription_ref,
                price_id,
                account_ref: object.client_reference_id,
            }))
        },
        "customer.subscription.deleted" => {
            let subscription_ref = object
                .id
                .ok_or_else(|| WebhookError::InvalidPayload("missing subscription id".into()))?;
            Ok(Some(PaymentEvent::SubscriptionDeleted { subscription_ref }))
        },
        "customer.subscription.updated" => {
            let subscription_ref = object
                .id
                .ok_or_else(|| WebhookError::InvalidPayload("missing subscription id".into()))?;
            let status = object
                .status
                .ok_or_else(|| WebhookError::InvalidPayload("missing status".into()))?;
            Ok(Some(PaymentEvent::SubscriptionUpdated {
                subscription_ref,
                status,
            }))
        },
        _ => Ok(None),
    }
}
