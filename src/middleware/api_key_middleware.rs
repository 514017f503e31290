// API-key authentication middleware for the programmatic channel
// Resolves the presented credential to an account; entitlement stays a
// separate evaluator call made by the handler

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::{app::AppState, middleware::auth::ApiAccount, services::api_key::ApiKeyError};

const API_KEY_HEADER: &str = "x-api-key";

fn extract_credential(request: &Request<Body>) -> Option<String> {
    if let Some(value) = request.headers().get(API_KEY_HEADER) {
        return value.to_str().ok().map(|s| s.to_string());
    }

    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

pub async fn api_key_middleware(
    State(app_state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(credential) = extract_credential(&request) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Missing API key" })),
        )
            .into_response();
    };

    match app_state.api_key_service.authenticate(&credential).await {
        Ok(account) => {
            request.extensions_mut().insert(ApiAccount {
                account_id: account.id,
            });
            next.run(request).await
        },
        // One generic response for every non-match; nothing to enumerate.
        Err(ApiKeyError::InvalidCredential) => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid API key" })),
        )
            .into_response(),
        Err(ApiKeyError::Database(detail)) => {
            tracing::error!("API key authentication storage failure: {}", detail);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        },
    }
}

/// Extractor for ApiAccount from request extensions
impl FromRequestParts<AppState> for ApiAccount {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ApiAccount>().cloned().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Authentication required" })),
            )
        })
    }
}
