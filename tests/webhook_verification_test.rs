// Webhook pipeline tests
// Signature verification through event parsing, as the handler runs them

use chrono::{TimeZone, Utc};
use ring::hmac;

use docforge_backend::services::plan_transition::PaymentEvent;
use docforge_backend::services::webhook::{parse_event, verify_signature, WebhookError};

const SECRET: &str = "whsec_integration_secret";
const TOLERANCE: i64 = 300;

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn signature_header(payload: &[u8], timestamp: i64, secret: &str) -> String {
    let mut signed = timestamp.to_string().into_bytes();
    signed.push(b'.');
    signed.extend_from_slice(payload);

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, &signed);
    format!("t={},v1={}", timestamp, encode_hex(tag.as_ref()))
}

#[test]
fn test_signed_checkout_event_round_trip() {
    let payload = br#"{
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": "cs_roundtrip",
            "customer": "cus_roundtrip",
            "subscription": "sub_roundtrip",
            "client_reference_id": null,
            "metadata": { "price_id": "price_api_metered_monthly" }
        } }
    }"#;
    let now = Utc.timestamp_opt(1_735_000_000, 0).single().unwrap();
    let header = signature_header(payload, now.timestamp(), SECRET);

    verify_signature(payload, &header, SECRET, TOLERANCE, now).expect("signature should verify");

    let event = parse_event(payload).unwrap().unwrap();
    assert_eq!(
        event,
        PaymentEvent::CheckoutCompleted {
            customer_ref: "cus_roundtrip".to_string(),
            subscription_ref: "sub_roundtrip".to_string(),
            price_id: "price_api_metered_monthly".to_string(),
            account_ref: None,
        }
    );
}

#[test]
fn test_unverifiable_event_never_reaches_parsing() {
    // The handler's contract: verification precedes everything else, so a
    // bad signature means no state change regardless of payload content
    let payload = br#"{
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": "sub_forged" } }
    }"#;
    let now = Utc.timestamp_opt(1_735_000_000, 0).single().unwrap();
    let header = signature_header(payload, now.timestamp(), "whsec_attacker_guess");

    let result = verify_signature(payload, &header, SECRET, TOLERANCE, now);
    assert!(matches!(result, Err(WebhookError::InvalidSignature)));
}

#[test]
fn test_replayed_event_outside_tolerance_is_rejected() {
    let payload = br#"{"type":"customer.subscription.updated","data":{"object":{"id":"sub_1","status":"past_due"}}}"#;
    let signed_at = 1_735_000_000;
    let header = signature_header(payload, signed_at, SECRET);

    let replay_time = Utc
        .timestamp_opt(signed_at + TOLERANCE + 1, 0)
        .single()
        .unwrap();
    let result = verify_signature(payload, &header, SECRET, TOLERANCE, replay_time);
    assert!(matches!(result, Err(WebhookError::StaleTimestamp)));
}

#[test]
fn test_rotated_secret_verifies_against_second_signature() {
    // During rotation both the old and new secret sign the payload
    let payload = br#"{"type":"noop"}"#;
    let timestamp = 1_735_000_000;
    let now = Utc.timestamp_opt(timestamp, 0).single().unwrap();

    let old = signature_header(payload, timestamp, "whsec_old");
    let new = signature_header(payload, timestamp, SECRET);
    let new_sig = new.split("v1=").nth(1).unwrap();
    let combined = format!("{},v1={}", old, new_sig);

    verify_signature(payload, &combined, SECRET, TOLERANCE, now)
        .expect("either signature should satisfy verification");
}

#[test]
fn test_delinquency_statuses_parse_for_revocation() {
    for status in ["past_due", "canceled", "unpaid"] {
        let payload = format!(
            r#"{{ "type": "customer.subscription.updated",
                 "data": {{ "object": {{ "id": "sub_x", "status": "{}" }} }} }}"#,
            status
        );
        let event = parse_event(payload.as_bytes()).unwrap().unwrap();
        assert_eq!(
            event,
            PaymentEvent::SubscriptionUpdated {
                subscription_ref: "sub_x".to_string(),
                status: status.to_string(),
            }
        );
    }
}
