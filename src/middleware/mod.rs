pub mod api_key_middleware;
pub mod auth;
pub mod auth_middleware;
pub mod cors;

pub use api_key_middleware::api_key_middleware;
pub use auth::{ApiAccount, AuthenticatedUser};
pub use auth_middleware::auth_middleware;
pub use cors::dynamic_cors_middleware;
