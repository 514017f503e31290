// Centralized configuration management for the DocForge backend
// Load ALL env vars ONCE at startup

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    // For tests, load .env file first
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Server
    pub bind_address: String,
    pub port: u16,
    pub environment: Environment,
    pub rust_log: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_min_connections: u32,
    pub database_connect_timeout: u64,
    pub database_idle_timeout: u64,
    pub database_max_lifetime: u64,

    // Session tokens
    pub jwt_secret: String,
    pub jwt_expiry: u64,
    pub jwt_audience: String,
    pub jwt_issuer: String,

    // OAuth callback gateway (the layer that completes the provider flow)
    pub auth_gateway_secret: String,

    // Billing webhooks
    pub billing_webhook_secret: String,
    pub billing_webhook_tolerance_secs: i64,

    // Entitlements
    pub api_window_days: i64,
    pub plan_catalog_json: Option<String>,

    // External collaborators
    pub github_api_url: String,
    pub github_token: String,
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,

    // Application URLs
    pub dashboard_url: String,

    // Security
    pub cors_allowed_origins: Vec<String>,

    // Features
    pub enable_swagger_ui: bool,
    pub disable_embedded_migrations: bool,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Helper function to get required env var
        let get_required = |key: &str| -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        };

        // Helper function to get optional env var with default
        let get_or_default = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let parse_u32_or_default = |key: &str, default: &str| -> Result<u32, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u32".to_string())
            })
        };

        let parse_u64_or_default = |key: &str, default: &str| -> Result<u64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u64".to_string())
            })
        };

        let parse_i64_or_default = |key: &str, default: &str| -> Result<i64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid i64".to_string())
            })
        };

        let parse_bool_or_default = |key: &str, default: &str| -> bool {
            get_or_default(key, default).to_lowercase() == "true"
        };

        // Parse bind address to extract port
        let bind_address = get_or_default("BIND_ADDRESS", "0.0.0.0:8080");
        let port = bind_address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let environment = Environment::from(get_or_default("ENVIRONMENT", "development"));

        let database_url = get_required("DATABASE_URL")?;
        let database_max_connections = parse_u32_or_default("DATABASE_MAX_CONNECTIONS", "100")?;
        let database_min_connections = parse_u32_or_default("DATABASE_MIN_CONNECTIONS", "10")?;
        let database_connect_timeout = parse_u64_or_default("DATABASE_CONNECT_TIMEOUT", "30")?;
        let database_idle_timeout = parse_u64_or_default("DATABASE_IDLE_TIMEOUT", "600")?;
        let database_max_lifetime = parse_u64_or_default("DATABASE_MAX_LIFETIME", "1800")?;

        let jwt_secret = get_required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                "Secret must be at least 32 characters long".to_string(),
            ));
        }
        let jwt_expiry = parse_u64_or_default("JWT_EXPIRY", "86400")?;
        let jwt_audience = get_or_default("JWT_AUDIENCE", "docforge.dev");
        let jwt_issuer = get_or_default("JWT_ISSUER", "docforge.dev");

        let auth_gateway_secret = get_required("AUTH_GATEWAY_SECRET")?;

        let billing_webhook_secret = get_required("BILLING_WEBHOOK_SECRET")?;
        let billing_webhook_tolerance_secs =
            parse_i64_or_default("BILLING_WEBHOOK_TOLERANCE_SECS", "300")?;

        let api_window_days = parse_i64_or_default("API_WINDOW_DAYS", "30")?;
        let plan_catalog_json = env::var("PLAN_CATALOG_JSON").ok();

        let github_api_url = get_or_default("GITHUB_API_URL", "https://api.github.com");
        let github_token = get_or_default("GITHUB_TOKEN", "");
        let llm_api_url = get_or_default("LLM_API_URL", "https://api.anthropic.com");
        let llm_api_key = get_or_default("LLM_API_KEY", "");
        let llm_model = get_or_default("LLM_MODEL", "claude-opus-5");
        let llm_max_tokens = parse_u32_or_default("LLM_MAX_TOKENS", "16000")?;

        let dashboard_url = get_or_default("DASHBOARD_URL", "http://localhost:3000");

        let cors_allowed_origins: Vec<String> = get_or_default("CORS_ALLOWED_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let enable_swagger_ui = parse_bool_or_default("ENABLE_SWAGGER_UI", "false");
        let disable_embedded_migrations =
            parse_bool_or_default("DISABLE_EMBEDDED_MIGRATIONS", "false");

        let rust_log = get_or_default("RUST_LOG", "info");

        Ok(Self {
            bind_address,
            port,
            environment,
            rust_log,
            database_url,
            database_max_connections,
            database_min_connections,
            database_connect_timeout,
            database_idle_timeout,
            database_max_lifetime,
            jwt_secret,
            jwt_expiry,
            jwt_audience,
            jwt_issuer,
            auth_gateway_secret,
            billing_webhook_secret,
            billing_webhook_tolerance_secs,
            api_window_days,
            plan_catalog_json,
            github_api_url,
            github_token,
            llm_api_url,
            llm_api_key,
            llm_model,
            llm_max_tokens,
            dashboard_url,
            cors_allowed_origins,
            enable_swagger_ui,
            disable_embedded_migrations,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

/// Get the global configuration instance
/// This is the primary way to access configuration throughout the app
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_string() {
        assert_eq!(
            Environment::from("development".to_string()),
            Environment::Development
        );
        assert_eq!(
            Environment::from("prod".to_string()),
            Environment::Production
        );
        assert_eq!(Environment::from("test".to_string()), Environment::Test);
        assert_eq!(
            Environment::from("staging".to_string()),
            Environment::Staging
        );
        assert_eq!(
            Environment::from("anything-else".to_string()),
            Environment::Development
        );
    }
}
