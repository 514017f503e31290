// Session token service
// Issues and validates short-lived HS256 access tokens for the web channel.
// Token exchange with the identity provider happens upstream; these tokens
// only identify an account to this backend.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::AccessTokenClaims;
use crate::models::user::User;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    Encoding(jsonwebtoken::errors::Error),

    #[error("Token validation failed: {0}")]
    Validation(jsonwebtoken::errors::Error),
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiry_secs: u64,
    pub audience: String,
    pub issuer: String,
}

impl JwtConfig {
    pub fn from_app_config(config: &crate::app_config::AppConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            expiry_secs: config.jwt_expiry,
            audience: config.jwt_audience.clone(),
            issuer: config.jwt_issuer.clone(),
        }
    }
}

pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: JwtConfig,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            config,
        }
    }

    /// Issue an access token for an account
    pub fn issue_access_token(&self, user: &User) -> Result<String, JwtError> {
        let now = Utc::now().timestamp() as u64;

        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            jti: Uuid::new_v4().to_string(),
            username: user.username.clone(),
            plan: user.plan.clone(),
            is_admin: user.is_admin,
            aud: self.config.audience.clone(),
            iss: self.config.issuer.clone(),
            iat: now,
            exp: now + self.config.expiry_secs,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Validate an access token and return its claims
    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[&self.config.issuer]);

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::Validation)
    }

    pub fn expiry_secs(&self) -> u64 {
        self.config.expiry_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_service() -> JwtService {
        JwtService::new(JwtConfig {
            secret: "test-secret-that-is-at-least-32-characters".to_string(),
            expiry_secs: 3600,
            audience: "docforge.test".to_string(),
            issuer: "docforge.test".to_string(),
        })
    }

    fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            github_id: "42".to_string(),
            username: "octocat".to_string(),
            display_name: None,
            email: None,
            avatar_url: None,
            plan: "free".to_string(),
            is_pro: false,
            is_admin: false,
            survey_completed: false,
            api_calls_used: 0,
            api_calls_limit: 0,
            api_calls_reset_at: now,
            billing_customer_id: None,
            billing_subscription_id: None,
            upgraded_at: None,
            downgraded_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_validate_round_trip() {
        let service = test_service();
        let user = test_user();

        let token = service.issue_access_token(&user).unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.username, "octocat");
        assert_eq!(claims.plan, "free");
        assert!(!claims.is_admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_rejects_token_from_other_issuer() {
        let service = test_service();
        let other = JwtService::new(JwtConfig {
            secret: "another-secret-that-is-at-least-32-chars!".to_string(),
            expiry_secs: 3600,
            audience: "docforge.test".to_string(),
            issuer: "docforge.test".to_string(),
        });

        let token = other.issue_access_token(&test_user()).unwrap();
        assert!(service.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        let service = test_service();
        assert!(service.validate_access_token("not-a-token").is_err());
    }
}
