// Authentication middleware for protected routes
// Validates session tokens and injects AuthenticatedUser into request extensions

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use uuid::Uuid;

use crate::{app::AppState, middleware::auth::AuthenticatedUser};

/// Middleware function that validates session tokens and adds
/// AuthenticatedUser to extensions
pub async fn auth_middleware(
    State(app_state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // Extract the Authorization header
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Missing or invalid authorization header"
                })),
            )
                .into_response();
        },
    };

    match app_state.jwt_service.validate_access_token(token) {
        Ok(claims) => {
            let account_id = match Uuid::parse_str(&claims.sub) {
                Ok(id) => id,
                Err(_) => {
                    tracing::warn!("Token subject is not a valid account id");
                    return (
                        StatusCode::UNAUTHORIZED,
                        Json(json!({ "error": "Invalid or expired token" })),
                    )
                        .into_response();
                },
            };

            let auth_user = AuthenticatedUser {
                account_id,
                token_id: claims.jti,
                username: claims.username,
                plan: claims.plan,
                is_admin: claims.is_admin,
                exp: claims.exp,
            };

            request.extensions_mut().insert(auth_user);
            next.run(request).await
        },
        Err(e) => {
            tracing::debug!("Session token validation failed: {}", e);
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid or expired token" })),
            )
                .into_response()
        },
    }
}

/// Extractor for AuthenticatedUser from request extensions
/// This allows handlers to use AuthenticatedUser in their parameters
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Authentication required" })),
                )
            })
    }
}
