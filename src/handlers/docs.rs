// OpenAPI document for the HTTP surface

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::auth::create_session,
        crate::handlers::auth::get_current_account,
        crate::handlers::generations::create_generation,
        crate::handlers::generations::get_usage,
        crate::handlers::generations::track_action,
        crate::handlers::generations::track_action_legacy,
        crate::handlers::generations::open_pull_request,
        crate::handlers::api::create_generation,
        crate::handlers::api::get_usage,
        crate::handlers::api_keys::create_api_key,
        crate::handlers::api_keys::list_api_keys,
        crate::handlers::api_keys::delete_api_key,
        crate::handlers::webhooks::billing_webhook,
        crate::handlers::reports::usage_report,
    ),
    components(schemas(
        crate::models::auth::VerifiedIdentity,
        crate::models::auth::SessionResponse,
        crate::models::generation_event::Channel,
        crate::models::generation_event::DocType,
        crate::models::generation_event::PostAction,
        crate::models::user::Plan,
        crate::services::entitlement::Entitlement,
        crate::services::generation::GenerationOutput,
        crate::services::api_key::IssuedKey,
        crate::services::pull_request::PullRequestRef,
        crate::services::reporting::CountRow,
        crate::services::reporting::UsageReport,
        crate::handlers::generations::CreateGenerationRequest,
        crate::handlers::generations::TrackActionRequest,
        crate::handlers::generations::OpenPullRequestRequest,
        crate::handlers::api_keys::CreateApiKeyRequest,
        crate::handlers::api_keys::ApiKeyInfo,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Session issuance"),
        (name = "Generations", description = "Web-channel generation"),
        (name = "API", description = "Programmatic generation"),
        (name = "ApiKeys", description = "API key management"),
        (name = "Webhooks", description = "Billing webhooks"),
        (name = "Admin", description = "Reporting"),
    ),
    info(
        title = "DocForge API",
        description = "Documentation generation for GitHub repositories",
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "apiKeyAuth",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-api-key"))),
            );
        }
    }
}
