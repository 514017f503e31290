// HTTP handlers for the DocForge backend

pub mod api;
pub mod api_keys;
pub mod auth;
pub mod docs;
pub mod generations;
pub mod reports;
pub mod webhooks;

use crate::app::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

/// Routes reachable without a session (the OAuth gateway calls these)
pub fn session_routes() -> Router<AppState> {
    Router::new().route("/auth/session", post(auth::create_session))
}

/// Session-protected web-channel routes
pub fn web_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(auth::get_current_account))
        .route("/generations", post(generations::create_generation))
        .route("/generations/actions", post(generations::track_action_legacy))
        .route("/generations/{id}/actions", post(generations::track_action))
        .route(
            "/generations/{id}/pull-request",
            post(generations::open_pull_request),
        )
        .route("/usage", get(generations::get_usage))
        .route(
            "/api-keys",
            post(api_keys::create_api_key).get(api_keys::list_api_keys),
        )
        .route("/api-keys/{id}", delete(api_keys::delete_api_key))
        .route("/admin/usage-report", get(reports::usage_report))
}

/// Key-authenticated API-channel routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/generations", post(api::create_generation))
        .route("/usage", get(api::get_usage))
}

/// Webhook routes; authenticity is checked by signature, not session
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/billing", post(webhooks::billing_webhook))
}
