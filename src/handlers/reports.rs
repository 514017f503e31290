// Admin reporting handlers
// A read-only client over the ledger, gated on the admin flag

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::{
    app::AppState,
    middleware::auth::AuthenticatedUser,
    services::reporting::{ReportingError, UsageReport},
    utils::service_error::ServiceError,
};

const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub days: Option<i64>,
}

/// Aggregate generation activity over a trailing window
/// GET /v1/admin/usage-report
#[utoipa::path(
    get,
    path = "/v1/admin/usage-report",
    tag = "Admin",
    operation_id = "usageReport",
    params(("days" = Option<i64>, Query, description = "Trailing window in days (default 30)")),
    responses(
        (status = 200, description = "Usage report", body = UsageReport),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Forbidden - admin only")
    ),
    security(("bearerAuth" = []))
)]
pub async fn usage_report(
    State(state): State<AppState>,
    auth_user: AuthenticatedUser,
    Query(params): Query<ReportParams>,
) -> impl IntoResponse {
    if !auth_user.is_admin {
        return ServiceError::Forbidden.into_response();
    }

    let days = params
        .days
        .unwrap_or(DEFAULT_WINDOW_DAYS)
        .clamp(1, MAX_WINDOW_DAYS);

    match state.reporting_service.usage_report(days).await {
        Ok(report) => Json(report).into_response(),
        Err(ReportingError::Database(e)) => {
            ServiceError::DatabaseError(e.to_string()).into_response()
        },
        Err(ReportingError::Pool(detail)) => ServiceError::DatabaseError(detail).into_response(),
    }
}
