// API-channel generation handlers
// Authenticated by API key; usage is metered against the persisted counter

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    app::AppState,
    handlers::generations::CreateGenerationRequest,
    middleware::auth::ApiAccount,
    models::generation_event::Channel,
    services::entitlement::Entitlement,
    services::generation::GenerationOutput,
    utils::service_error::ServiceError,
};

/// Generate a document on the API channel
/// POST /api/v1/generations
#[utoipa::path(
    post,
    path = "/api/v1/generations",
    tag = "API",
    operation_id = "apiCreateGeneration",
    request_body = CreateGenerationRequest,
    responses(
        (status = 201, description = "Document generated", body = GenerationOutput),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - invalid API key"),
        (status = 402, description = "Payment required - API call limit reached"),
        (status = 502, description = "Bad gateway - generation failed upstream")
    ),
    security(("apiKeyAuth" = []))
)]
pub async fn create_generation(
    State(state): State<AppState>,
    api_account: ApiAccount,
    Json(request): Json<CreateGenerationRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return ServiceError::from(e).into_response();
    }

    match state
        .generation_service
        .generate(
            api_account.account_id,
            Channel::Api,
            request.doc_type,
            &request.target_ref,
        )
        .await
    {
        Ok(output) => (StatusCode::CREATED, Json(output)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Current API usage figures for the authenticated key's account
/// GET /api/v1/usage
#[utoipa::path(
    get,
    path = "/api/v1/usage",
    tag = "API",
    operation_id = "apiGetUsage",
    responses(
        (status = 200, description = "Usage figures", body = Entitlement),
        (status = 401, description = "Unauthorized - invalid API key")
    ),
    security(("apiKeyAuth" = []))
)]
pub async fn get_usage(
    State(state): State<AppState>,
    api_account: ApiAccount,
) -> impl IntoResponse {
    match state
        .generation_service
        .evaluate(api_account.account_id, Channel::Api)
        .await
    {
        Ok(entitlement) => Json(entitlement).into_response(),
        Err(e) => e.into_response(),
    }
}
