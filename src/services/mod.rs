// Services module for the DocForge backend
// Business logic layer for the application

pub mod api_key;
pub mod entitlement;
pub mod generation;
pub mod jwt;
pub mod llm;
pub mod plan_transition;
pub mod pull_request;
pub mod repo_content;
pub mod reporting;
pub mod usage;
pub mod webhook;

// Re-export commonly used services
pub use api_key::{ApiKeyError, ApiKeyService, IssuedKey};
pub use entitlement::{Entitlement, EntitlementError, EntitlementService};
pub use generation::{GenerationOutput, GenerationService};
pub use jwt::{JwtConfig, JwtError, JwtService};
pub use llm::{AnthropicGenerator, DocumentGenerator, GeneratorError};
pub use plan_transition::{
    PaymentEvent, PlanTransitionError, PlanTransitionService, TransitionOutcome,
};
pub use pull_request::{GitHubPullRequestClient, PullRequestOpener, PullRequestRef};
pub use repo_content::{ContentError, GitHubContentProvider, RepoContentProvider, RepoRef};
pub use reporting::{ReportingService, UsageReport};
pub use usage::{UsageError, UsageService};
pub use webhook::{parse_event, verify_signature, WebhookError, SIGNATURE_HEADER};
