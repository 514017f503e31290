// Application state shared across handlers
use std::sync::Arc;

use crate::{
    config::plans::PlanCatalog,
    db::DieselPool,
    services::{
        ApiKeyService, GenerationService, JwtService, PlanTransitionService, ReportingService,
        UsageService,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub diesel_pool: DieselPool,
    pub plan_catalog: Arc<PlanCatalog>,
    pub jwt_service: Arc<JwtService>,
    pub api_key_service: Arc<ApiKeyService>,
    pub usage_service: Arc<UsageService>,
    pub generation_service: Arc<GenerationService>,
    pub plan_transition_service: Arc<PlanTransitionService>,
    pub reporting_service: Arc<ReportingService>,
    pub max_connections: u32,
}
