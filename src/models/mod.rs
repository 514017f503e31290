// Database models for the DocForge backend

pub mod api_key;
pub mod auth;
pub mod generation_event;
pub mod user;

pub use api_key::{ApiKey, NewApiKey};
pub use generation_event::{Channel, DocType, GenerationEvent, NewGenerationEvent, PostAction};
pub use user::{NewUser, Plan, PlanUpdate, User, UserError};
