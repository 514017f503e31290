// Web-channel generation handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    middleware::auth::AuthenticatedUser,
    models::generation_event::{Channel, DocType, PostAction},
    services::generation::GenerationOutput,
    services::pull_request::PullRequestRef,
    utils::service_error::ServiceError,
};

// =============================================================================
// REQUEST TYPES
// =============================================================================

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateGenerationRequest {
    pub doc_type: DocType,

    /// Target repository (`owner/repo`), optionally scoped to a file path
    #[validate(length(min = 3, max = 512))]
    pub target_ref: String,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct TrackActionRequest {
    pub action: PostAction,
    pub doc_type: DocType,

    #[validate(length(min = 3, max = 512))]
    pub target_ref: String,
}

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct OpenPullRequestRequest {
    pub doc_type: DocType,

    #[validate(length(min = 3, max = 512))]
    pub target_ref: String,

    /// The generated document to commit
    #[validate(length(min = 1))]
    pub content: String,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Generate a document on the web channel
/// POST /v1/generations
#[utoipa::path(
    post,
    path = "/v1/generations",
    tag = "Generations",
    operation_id = "createGeneration",
    request_body = CreateGenerationRequest,
    responses(
        (status = 201, description = "Document generated", body = GenerationOutput),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 402, description = "Payment required - generation limit reached"),
        (status = 502, description = "Bad gateway - generation failed upstream")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_generation(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Json(request): Json<CreateGenerationRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return ServiceError::from(e).into_response();
    }

    match state
        .generation_service
        .generate(
            auth_user.account_id,
            Channel::Web,
            request.doc_type,
            &request.target_ref,
        )
        .await
    {
        Ok(output) => (StatusCode::CREATED, Json(output)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Current usage figures for both channels
/// GET /v1/usage
#[utoipa::path(
    get,
    path = "/v1/usage",
    tag = "Generations",
    operation_id = "getUsage",
    responses(
        (status = 200, description = "Usage figures"),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_usage(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
) -> impl IntoResponse {
    let web = match state
        .generation_service
        .evaluate(auth_user.account_id, Channel::Web)
        .await
    {
        Ok(entitlement) => entitlement,
        Err(e) => return e.into_response(),
    };
    let api = match state
        .generation_service
        .evaluate(auth_user.account_id, Channel::Api)
        .await
    {
        Ok(entitlement) => entitlement,
        Err(e) => return e.into_response(),
    };

    Json(serde_json::json!({ "web": web, "api": api })).into_response()
}

/// Track a post-generation action against a specific event
/// POST /v1/generations/{id}/actions
#[utoipa::path(
    post,
    path = "/v1/generations/{id}/actions",
    tag = "Generations",
    operation_id = "trackAction",
    params(("id" = Uuid, Path, description = "Generation event ID")),
    request_body = TrackActionRequest,
    responses(
        (status = 200, description = "Action recorded (tracked=false on a benign miss)"),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn track_action(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(event_id): Path<Uuid>,
    Json(request): Json<TrackActionRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return ServiceError::from(e).into_response();
    }

    match state
        .usage_service
        .track_post_action(
            auth_user.account_id,
            Some(event_id),
            &request.target_ref,
            request.doc_type,
            request.action,
        )
        .await
    {
        Ok(tracked) => Json(serde_json::json!({ "tracked": tracked })).into_response(),
        Err(e) => ServiceError::DatabaseError(e.to_string()).into_response(),
    }
}

/// Track an action without an event id (older clients). Resolves to the
/// most recent matching event; a miss is a success with tracked=false.
/// POST /v1/generations/actions
#[utoipa::path(
    post,
    path = "/v1/generations/actions",
    tag = "Generations",
    operation_id = "trackActionLegacy",
    request_body = TrackActionRequest,
    responses(
        (status = 200, description = "Action recorded (tracked=false on a benign miss)"),
        (status = 401, description = "Unauthorized - invalid or missing token")
    ),
    security(("bearerAuth" = []))
)]
pub async fn track_action_legacy(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Json(request): Json<TrackActionRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return ServiceError::from(e).into_response();
    }

    match state
        .usage_service
        .track_post_action(
            auth_user.account_id,
            None,
            &request.target_ref,
            request.doc_type,
            request.action,
        )
        .await
    {
        Ok(tracked) => Json(serde_json::json!({ "tracked": tracked })).into_response(),
        Err(e) => ServiceError::DatabaseError(e.to_string()).into_response(),
    }
}

/// Open a pull request carrying a generated document
/// POST /v1/generations/{id}/pull-request
#[utoipa::path(
    post,
    path = "/v1/generations/{id}/pull-request",
    tag = "Generations",
    operation_id = "openPullRequest",
    params(("id" = Uuid, Path, description = "Generation event ID")),
    request_body = OpenPullRequestRequest,
    responses(
        (status = 201, description = "Pull request opened", body = PullRequestRef),
        (status = 400, description = "Bad request - validation failed"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 502, description = "Bad gateway - pull request creation failed")
    ),
    security(("bearerAuth" = []))
)]
pub async fn open_pull_request(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Path(event_id): Path<Uuid>,
    Json(request): Json<OpenPullRequestRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        return ServiceError::from(e).into_response();
    }

    match state
        .generation_service
        .open_docs_pull_request(
            auth_user.account_id,
            event_id,
            request.doc_type,
            &request.target_ref,
            &request.content,
        )
        .await
    {
        Ok(pr) => (StatusCode::CREATED, Json(pr)).into_response(),
        Err(e) => e.into_response(),
    }
}
