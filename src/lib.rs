// Library exports for the DocForge backend
// This file exposes modules and functions for library consumers

pub mod app;
pub mod app_config;
pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use app::AppState;
pub use app_config::{AppConfig, CONFIG};
pub use config::plans::{PlanCatalog, PlanLimits};
pub use db::{DieselDatabaseConfig, DieselPool};
pub use middleware::{api_key_middleware, auth_middleware, ApiAccount, AuthenticatedUser};
pub use models::{Channel, DocType, Plan, PostAction};
pub use services::{
    ApiKeyService, Entitlement, EntitlementService, GenerationService, JwtConfig, JwtService,
    PlanTransitionService, ReportingService, UsageService,
};
pub use utils::service_error::ServiceError;

use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

// Library initialization function for external consumers
pub async fn initialize_app_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // Load environment
    dotenv::dotenv().ok();

    // Initialize config
    let config = app_config::config();

    // Initialize database pool
    info!("Initializing database pool...");
    let db_config = db::DieselDatabaseConfig::default();
    let max_connections = db_config.max_connections;
    let diesel_pool = db::create_diesel_pool(db_config).await?;

    // Run migrations if enabled
    if migrations::should_run_migrations() {
        info!("Running embedded migrations...");
        let migration_config = migrations::MigrationConfig::default();
        migrations::run_all_migrations(&diesel_pool, migration_config)
            .await
            .map_err(|e| format!("Migration failed: {}", e))?;
    }

    // Plan economics are injected configuration, never baked into services
    let plan_catalog = Arc::new(PlanCatalog::from_env(config.plan_catalog_json.as_deref())?);

    // Initialize services
    let jwt_service = Arc::new(JwtService::new(JwtConfig::from_app_config(config)));
    let entitlement_service = Arc::new(EntitlementService::new(
        diesel_pool.clone(),
        plan_catalog.clone(),
        config.api_window_days,
    ));
    let usage_service = Arc::new(UsageService::new(diesel_pool.clone()));
    let api_key_service = Arc::new(ApiKeyService::new(diesel_pool.clone()));
    let plan_transition_service = Arc::new(PlanTransitionService::new(
        diesel_pool.clone(),
        plan_catalog.clone(),
    ));
    let reporting_service = Arc::new(ReportingService::new(diesel_pool.clone()));

    // External collaborators
    let content_provider = Arc::new(services::GitHubContentProvider::new(
        config.github_api_url.clone(),
        config.github_token.clone(),
    ));
    let generator = Arc::new(services::AnthropicGenerator::new(
        config.llm_api_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
        config.llm_max_tokens,
    ));
    let pr_opener = Arc::new(services::GitHubPullRequestClient::new(
        config.github_api_url.clone(),
        config.github_token.clone(),
    ));

    let generation_service = Arc::new(GenerationService::new(
        entitlement_service,
        usage_service.clone(),
        content_provider,
        generator,
        pr_opener,
        format!("{}/billing", config.dashboard_url),
    ));

    Ok(AppState {
        diesel_pool,
        plan_catalog,
        jwt_service,
        api_key_service,
        usage_service,
        generation_service,
        plan_transition_service,
        reporting_service,
        max_connections,
    })
}

/// Assemble the full application router
pub fn build_router(state: AppState) -> Router {
    let config = app_config::config();

    let web = handlers::web_routes().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::auth_middleware,
    ));
    let api = handlers::api_routes().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::api_key_middleware,
    ));

    let v1 = handlers::session_routes()
        .merge(handlers::webhook_routes())
        .merge(web);

    let mut router = Router::new()
        .route("/health", get(health_check))
        .nest("/v1", v1)
        .nest("/api/v1", api);

    if config.enable_swagger_ui {
        router = router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", handlers::docs::ApiDoc::openapi()),
        );
    }

    router
        .layer(axum::middleware::from_fn(middleware::dynamic_cors_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// Health check handler
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    use axum::http::StatusCode;
    use axum::Json;

    let timestamp = chrono::Utc::now().to_rfc3339();

    let (overall_healthy, postgres_health) = match db::check_diesel_health(&state.diesel_pool).await
    {
        Ok(_) => (
            true,
            serde_json::json!({
                "status": "healthy",
                "max_connections": state.max_connections,
                "error": null
            }),
        ),
        Err(e) => (
            false,
            serde_json::json!({
                "status": "unhealthy",
                "error": format!("Database connection failed: {}", e)
            }),
        ),
    };

    let response = serde_json::json!({
        "status": if overall_healthy { "healthy" } else { "degraded" },
        "service": "docforge-backend",
        "timestamp": timestamp,
        "components": {
            "postgresql": postgres_health
        }
    });

    if overall_healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
