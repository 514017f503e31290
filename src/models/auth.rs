// Session token claims and auth payloads

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Access token claims for web sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Account ID (subject)
    pub sub: String,

    /// Token ID (UUID format)
    pub jti: String,

    /// GitHub username, for display
    pub username: String,

    /// Plan at issuance time. Display only; entitlement decisions always
    /// read live account state.
    pub plan: String,

    /// Whether the account can see the reporting surface
    pub is_admin: bool,

    /// Audience
    pub aud: String,

    /// Issuer
    pub iss: String,

    /// Issued at timestamp (Unix epoch seconds)
    pub iat: u64,

    /// Expires at timestamp (Unix epoch seconds)
    pub exp: u64,
}

/// Verified identity profile posted by the OAuth callback layer.
/// Token exchange with the provider happens upstream; by the time this
/// payload arrives the identity has already been verified.
#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct VerifiedIdentity {
    #[validate(length(min = 1, max = 64))]
    pub github_id: String,

    #[validate(length(min = 1, max = 255))]
    pub username: String,

    pub display_name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(url)]
    pub avatar_url: Option<String>,
}

/// Session issuance response
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub account_id: uuid::Uuid,
    pub plan: String,
}
