// Billing webhook handler
// Signature verification comes first; an unverifiable event is rejected
// with no state change. Verified events this service cannot apply are
// acknowledged so the payment provider does not redeliver them forever.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info};

use crate::{
    app::AppState,
    services::plan_transition::PlanTransitionError,
    services::webhook::{self, SIGNATURE_HEADER},
    utils::service_error::ServiceError,
};

/// Consume a payment lifecycle event
/// POST /v1/webhooks/billing
#[utoipa::path(
    post,
    path = "/v1/webhooks/billing",
    tag = "Webhooks",
    operation_id = "billingWebhook",
    request_body(content = String, description = "Raw signed webhook payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed or acknowledged"),
        (status = 400, description = "Signature verification failed")
    )
)]
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let config = crate::app_config::config();

    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return ServiceError::WebhookVerificationFailure.into_response();
    };

    if let Err(e) = webhook::verify_signature(
        &body,
        signature,
        &config.billing_webhook_secret,
        config.billing_webhook_tolerance_secs,
        Utc::now(),
    ) {
        tracing::warn!("Rejected billing webhook: {}", e);
        return ServiceError::WebhookVerificationFailure.into_response();
    }

    let event = match webhook::parse_event(&body) {
        Ok(Some(event)) => event,
        // Event types this handler does not consume are acknowledged as-is.
        Ok(None) => {
            return (StatusCode::OK, Json(json!({ "received": true }))).into_response();
        },
        Err(e) => {
            return ServiceError::ValidationError(e.to_string()).into_response();
        },
    };

    match state.plan_transition_service.handle_event(event).await {
        Ok(outcome) => {
            info!("Processed billing event: {:?}", outcome);
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        },
        // An unmapped price is an integration error on our side: log it,
        // change nothing, acknowledge so the provider stops retrying.
        Err(PlanTransitionError::UnmappedPlanIdentifier(price_id)) => {
            error!("Billing event references unmapped price: {}", price_id);
            (StatusCode::OK, Json(json!({ "received": true }))).into_response()
        },
        // Storage failures are surfaced; the provider redelivers later.
        Err(PlanTransitionError::Database(detail)) => {
            ServiceError::DatabaseError(detail).into_response()
        },
    }
}
