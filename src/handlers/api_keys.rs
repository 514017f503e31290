// API key management handlers (web session)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    middleware::auth::AuthenticatedUser,
    models::generation_event::Channel,
    services::api_key::{ApiKeyError, IssuedKey},
    utils::service_error::ServiceError,
};

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
}

/// Key listing entry; the secret is never retrievable after creation
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiKeyInfo {
    pub id: Uuid,
    pub key_prefix: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Create an API key. The full secret appears in this response only.
/// POST /v1/api-keys
#[utoipa::path(
    post,
    path = "/v1/api-keys",
    tag = "ApiKeys",
    operation_id = "createApiKey",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "Key created", body = IssuedKey),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 402, description = "Payment required - plan has no API access")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Json(request): Json<CreateApiKeyRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return ServiceError::from(e).into_response();
    }

    // Keys are only issued to accounts whose plan includes the API channel.
    let entitlement = match state
        .generation_service
        .evaluate(auth_user.account_id, Channel::Api)
        .await
    {
        Ok(entitlement) => entitlement,
        Err(e) => return e.into_response(),
    };
    if entitlement.limit == 0 {
        return state.generation_service.denial(&entitlement).into_response();
    }

    match state
        .api_key_service
        .issue(auth_user.account_id, &request.label)
        .await
    {
        Ok(issued) => (StatusCode::CREATED, Json(issued)).into_response(),
        Err(ApiKeyError::Database(detail)) => ServiceError::DatabaseError(detail).into_response(),
        Err(ApiKeyError::InvalidCredential) => ServiceError::InternalError.into_response(),
    }
}

/// List the account's API keys
/// GET /v1/api-keys
#[utoipa::path(
    get,
    path = "/v1/api-keys",
    tag = "ApiKeys",
    operation_id = "listApiKeys",
    responses(
        (status = 200, description = "Keys", body = [ApiKeyInfo]),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
) -> impl IntoResponse {
    match state.api_key_service.list(auth_user.account_id).await {
        Ok(keys) => {
            let infos: Vec<ApiKeyInfo> = keys
                .into_iter()
                .map(|key| ApiKeyInfo {
                    id: key.id,
                    key_prefix: key.key_prefix,
                    label: key.label,
                    created_at: key.created_at,
                    last_used_at: key.last_used_at,
                })
                .collect();
            Json(infos).into_response()
        },
        Err(ApiKeyError::Database(detail)) => ServiceError::DatabaseError(detail).into_response(),
        Err(ApiKeyError::InvalidCredential) => ServiceError::InternalError.into_response(),
    }
}

/// Delete an API key the account owns
/// DELETE /v1/api-keys/{id}
#[utoipa::path(
    delete,
    path = "/v1/api-keys/{id}",
    tag = "ApiKeys",
    operation_id = "deleteApiKey",
    params(("id" = Uuid, Path, description = "API key ID")),
    responses(
        (status = 204, description = "Key deleted"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 404, description = "Key not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_api_key(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(key_id): Path<Uuid>,
) -> impl IntoResponse {
    match state
        .api_key_service
        .revoke(key_id, auth_user.account_id)
        .await
    {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => ServiceError::NotFound.into_response(),
        Err(ApiKeyError::Database(detail)) => ServiceError::DatabaseError(detail).into_response(),
        Err(ApiKeyError::InvalidCredential) => ServiceError::InternalError.into_response(),
    }
}
