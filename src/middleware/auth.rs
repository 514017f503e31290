// Authenticated principals injected into request extensions

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Web-session principal extracted from a validated access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub account_id: Uuid,
    pub token_id: String,
    pub username: String,
    pub plan: String,
    pub is_admin: bool,
    pub exp: u64,
}

/// API-channel principal resolved from an API key
#[derive(Debug, Clone)]
pub struct ApiAccount {
    pub account_id: Uuid,
}
