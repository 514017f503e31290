// Session handlers
// The OAuth callback layer posts a verified profile here; account creation
// is idempotent and token exchange with the provider never touches this
// service

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use subtle::ConstantTimeEq;
use validator::Validate;

use crate::{
    app::AppState,
    middleware::auth::AuthenticatedUser,
    models::auth::{SessionResponse, VerifiedIdentity},
    models::generation_event::Channel,
    models::user::{NewUser, Plan, User},
    utils::service_error::ServiceError,
};

const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";

fn gateway_authorized(headers: &HeaderMap) -> bool {
    let expected = crate::app_config::config().auth_gateway_secret.as_bytes();
    headers
        .get(GATEWAY_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|presented| bool::from(presented.as_bytes().ct_eq(expected)))
        .unwrap_or(false)
}

/// Exchange a verified identity for a session token
/// POST /v1/auth/session
#[utoipa::path(
    post,
    path = "/v1/auth/session",
    tag = "Auth",
    operation_id = "createSession",
    request_body = VerifiedIdentity,
    responses(
        (status = 200, description = "Session issued", body = SessionResponse),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - gateway secret missing or wrong")
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(identity): Json<VerifiedIdentity>,
) -> impl IntoResponse {
    if !gateway_authorized(&headers) {
        return ServiceError::AuthenticationFailure.into_response();
    }

    if let Err(e) = identity.validate() {
        return ServiceError::from(e).into_response();
    }

    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => return ServiceError::DatabaseError(e.to_string()).into_response(),
    };

    let account = match User::find_or_create(
        &mut conn,
        NewUser {
            github_id: identity.github_id,
            username: identity.username,
            display_name: identity.display_name,
            email: identity.email,
            avatar_url: identity.avatar_url,
            plan: Plan::Free.as_str().to_string(),
        },
    )
    .await
    {
        Ok(account) => account,
        Err(e) => return ServiceError::from(e).into_response(),
    };

    let token = match state.jwt_service.issue_access_token(&account) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to issue session token: {}", e);
            return ServiceError::InternalError.into_response();
        },
    };

    Json(SessionResponse {
        access_token: token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.expiry_secs(),
        account_id: account.id,
        plan: account.plan,
    })
    .into_response()
}

/// Current account with live usage figures
/// GET /v1/auth/me
#[utoipa::path(
    get,
    path = "/v1/auth/me",
    tag = "Auth",
    operation_id = "getCurrentAccount",
    responses(
        (status = 200, description = "Current account"),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_current_account(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
) -> impl IntoResponse {
    let mut conn = match state.diesel_pool.get().await {
        Ok(conn) => conn,
        Err(e) => return ServiceError::DatabaseError(e.to_string()).into_response(),
    };

    let account = match User::find_by_id(&mut conn, auth_user.account_id).await {
        Ok(account) => account,
        Err(e) => return ServiceError::from(e).into_response(),
    };

    let web = match state.generation_service.evaluate(account.id, Channel::Web).await {
        Ok(entitlement) => entitlement,
        Err(e) => return e.into_response(),
    };
    let api = match state.generation_service.evaluate(account.id, Channel::Api).await {
        Ok(entitlement) => entitlement,
        Err(e) => return e.into_response(),
    };

    Json(serde_json::json!({
        "account_id": account.id,
        "github_id": account.github_id,
        "username": account.username,
        "display_name": account.display_name,
        "email": account.email,
        "avatar_url": account.avatar_url,
        "plan": account.plan,
        "is_pro": account.is_pro,
        "is_admin": account.is_admin,
        "survey_completed": account.survey_completed,
        "usage": { "web": web, "api": api },
    }))
    .into_response()
}
