// Generation orchestrator
// Entitlement check, collaborator calls, then usage recording - in that
// order. Quota consumption is strictly gated on confirmed success: a
// failed or aborted generation writes nothing.

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::generation_event::{Channel, DocType, PostAction};
use crate::services::entitlement::{Entitlement, EntitlementService};
use crate::services::llm::{DocumentGenerator, GenerationPrompt};
use crate::services::pull_request::{
    PullRequestOpener, PullRequestRef, PullRequestSpec,
};
use crate::services::repo_content::{RepoContentProvider, RepoContext, RepoRef};
use crate::services::usage::UsageService;
use crate::utils::service_error::ServiceError;
use crate::utils::validation::is_valid_repo_ref;

/// A completed generation: the artifact, its ledger id for action
/// tracking, and the refreshed usage figures.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct GenerationOutput {
    pub event_id: Uuid,
    pub doc_type: DocType,
    pub target_ref: String,
    pub content: String,
    pub duration_ms: i32,
    pub entitlement: Entitlement,
}

pub struct GenerationService {
    entitlements: Arc<EntitlementService>,
    usage: Arc<UsageService>,
    content_provider: Arc<dyn RepoContentProvider>,
    generator: Arc<dyn DocumentGenerator>,
    pr_opener: Arc<dyn PullRequestOpener>,
    upgrade_url: String,
}

impl GenerationService {
    pub fn new(
        entitlements: Arc<EntitlementService>,
        usage: Arc<UsageService>,
        content_provider: Arc<dyn RepoContentProvider>,
        generator: Arc<dyn DocumentGenerator>,
        pr_opener: Arc<dyn PullRequestOpener>,
        upgrade_url: String,
    ) -> Self {
        Self {
            entitlements,
            usage,
            content_provider,
            generator,
            pr_opener,
            upgrade_url,
        }
    }

    /// Build the structured denial callers render as an upgrade prompt.
    pub fn denial(&self, entitlement: &Entitlement) -> ServiceError {
        ServiceError::EntitlementDenied {
            usage: entitlement.usage,
            limit: entitlement.limit,
            plan: entitlement.plan.as_str().to_string(),
            upgrade_url: self.upgrade_url.clone(),
        }
    }

    pub async fn evaluate(
        &self,
        account_id: Uuid,
        channel: Channel,
    ) -> Result<Entitlement, ServiceError> {
        self.entitlements
            .evaluate(account_id, channel)
            .await
            .map_err(|_| ServiceError::AccountNotFound)
    }

    /// Run one generation end to end.
    pub async fn generate(
        &self,
        account_id: Uuid,
        channel: Channel,
        doc_type: DocType,
        target_ref: &str,
    ) -> Result<GenerationOutput, ServiceError> {
        if !is_valid_repo_ref(target_ref) {
            return Err(ServiceError::ValidationError(
                "target must be a well-formed owner/repo reference".to_string(),
            ));
        }
        let repo = RepoRef::parse(target_ref).ok_or_else(|| {
            ServiceError::ValidationError("target must include owner and repository".to_string())
        })?;

        // Deny before any external call or ledger write.
        let entitlement = self.evaluate(account_id, channel).await?;
        if !entitlement.allowed {
            return Err(self.denial(&entitlement));
        }

        let started = Instant::now();

        let context = self
            .content_provider
            .fetch_context(&repo, doc_type)
            .await
            .map_err(|e| ServiceError::GenerationFailed(e.to_string()))?;

        let document = self
            .generator
            .generate_document(build_prompt(doc_type, &context))
            .await
            .map_err(|e| ServiceError::GenerationFailed(e.to_string()))?;

        if doc_type == DocType::ClassDiagram && !is_well_formed_class_diagram(&document.content) {
            return Err(ServiceError::GenerationFailed(
                "generated diagram failed the well-formedness check".to_string(),
            ));
        }

        let duration_ms = started.elapsed().as_millis().min(i32::MAX as u128) as i32;

        // The generation genuinely succeeded; now, and only now, record it.
        let event = self
            .usage
            .record_generation(account_id, doc_type, target_ref, channel, Some(duration_ms))
            .await
            .map_err(|e| ServiceError::DatabaseError(e.to_string()))?;

        info!(
            "Generated {} for {} on {} in {}ms",
            doc_type.as_str(),
            target_ref,
            channel.as_str(),
            duration_ms
        );

        // Refresh so the response shows post-consumption figures. This read
        // fails closed like any other; the artifact is still returned.
        let refreshed = self.evaluate(account_id, channel).await?;

        Ok(GenerationOutput {
            event_id: event.id,
            doc_type,
            target_ref: target_ref.to_string(),
            content: document.content,
            duration_ms,
            entitlement: refreshed,
        })
    }

    /// Open a pull request carrying a generated document, then mark the
    /// ledger row. The marking is best-effort analytics; the PR result wins.
    pub async fn open_docs_pull_request(
        &self,
        account_id: Uuid,
        event_id: Uuid,
        doc_type: DocType,
        target_ref: &str,
        content: &str,
    ) -> Result<PullRequestRef, ServiceError> {
        let repo = RepoRef::parse(target_ref).ok_or_else(|| {
            ServiceError::ValidationError("target must include owner and repository".to_string())
        })?;

        let file_path = repo
            .path
            .clone()
            .unwrap_or_else(|| default_file_name(doc_type).to_string());
        let branch_name = format!(
            "docforge/{}-{}",
            doc_type.as_str().replace('_', "-"),
            &event_id.simple().to_string()[..8]
        );

        let spec = PullRequestSpec {
            repo,
            branch_name,
            file_path: file_path.clone(),
            content: content.to_string(),
            title: format!("Add generated {}", file_path),
            body: "Documentation generated with DocForge.".to_string(),
        };

        let pr = self
            .pr_opener
            .open_docs_pull_request(&spec)
            .await
            .map_err(|e| ServiceError::GenerationFailed(e.to_string()))?;

        if let Err(e) = self
            .usage
            .track_post_action(
                account_id,
                Some(event_id),
                target_ref,
                doc_type,
                PostAction::PrCreated,
            )
            .await
        {
            warn!("Failed to mark pr_created on event {}: {}", event_id, e);
        }

        Ok(pr)
    }
}

// =============================================================================
// PROMPT BUILDING
// =============================================================================

fn build_prompt(doc_type: DocType, context: &RepoContext) -> GenerationPrompt {
    let instruction = match doc_type {
        DocType::Readme => "Write a complete README.md for this repository.",
        DocType::Changelog => {
            "Write a CHANGELOG.md for this repository based on its recent commit history."
        },
        DocType::Contributing => "Write a CONTRIBUTING.md guide for this repository.",
        DocType::License => {
            "Suggest and write out an appropriate open-source LICENSE file for this repository."
        },
        DocType::CodeOfConduct => "Write a CODE_OF_CONDUCT.md for this repository.",
        DocType::CodeComments => {
            "Write documentation comments for the referenced source file in its language's \
             native doc-comment style."
        },
        DocType::ClassDiagram => {
            "Produce a Mermaid class diagram of this repository's main types. Respond with \
             the diagram only, starting with the classDiagram keyword."
        },
    };

    let mut prompt = format!(
        "Repository: {}\nDescription: {}\nPrimary language: {}\nLicense: {}\n",
        context.full_name,
        context.description.as_deref().unwrap_or("(none)"),
        context.language.as_deref().unwrap_or("(unknown)"),
        context.license.as_deref().unwrap_or("(none)"),
    );

    if !context.file_tree.is_empty() {
        prompt.push_str("\nFiles:\n");
        for path in &context.file_tree {
            prompt.push_str(path);
            prompt.push('\n');
        }
    }

    if let Some(readme) = &context.readme {
        prompt.push_str("\nExisting README:\n");
        prompt.push_str(readme);
        prompt.push('\n');
    }

    if !context.recent_commits.is_empty() {
        prompt.push_str("\nRecent commits:\n");
        for message in &context.recent_commits {
            prompt.push_str("- ");
            prompt.push_str(message.lines().next().unwrap_or(""));
            prompt.push('\n');
        }
    }

    prompt.push('\n');
    prompt.push_str(instruction);

    GenerationPrompt {
        system: "You are a technical writer producing documentation for software \
                 repositories. Respond with the requested document only, in Markdown \
                 unless the request says otherwise."
            .to_string(),
        prompt,
    }
}

fn default_file_name(doc_type: DocType) -> &'static str {
    match doc_type {
        DocType::Readme => "README.md",
        DocType::Changelog => "CHANGELOG.md",
        DocType::Contributing => "CONTRIBUTING.md",
        DocType::License => "LICENSE",
        DocType::CodeOfConduct => "CODE_OF_CONDUCT.md",
        DocType::CodeComments => "COMMENTS.md",
        DocType::ClassDiagram => "docs/class-diagram.md",
    }
}

/// Basic well-formedness check for generated class diagrams: a Mermaid
/// classDiagram header with at least one body line, optionally fenced.
pub fn is_well_formed_class_diagram(text: &str) -> bool {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```mermaid") {
        body = rest.trim_start();
        body = body.strip_suffix("```").unwrap_or(body).trim_end();
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest.trim_start();
        body = body.strip_suffix("```").unwrap_or(body).trim_end();
    }

    let mut lines = body.lines();
    let Some(header) = lines.next() else {
        return false;
    };

    header.trim() == "classDiagram" && lines.any(|line| !line.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_minimal_class_diagram() {
        assert!(is_well_formed_class_diagram(
            "classDiagram\n    Animal <|-- Duck"
        ));
    }

    #[test]
    fn test_accepts_fenced_class_diagram() {
        assert!(is_well_formed_class_diagram(
            "```mermaid\nclassDiagram\n    class Account\n```"
        ));
    }

    #[test]
    fn test_rejects_other_text() {
        assert!(!is_well_formed_class_diagram("Here is your diagram!"));
        assert!(!is_well_formed_class_diagram("flowchart TD\n  A --> B"));
        assert!(!is_well_formed_class_diagram("classDiagram"));
        assert!(!is_well_formed_class_diagram(""));
    }

    #[test]
    fn test_prompt_includes_repo_context() {
        let context = RepoContext {
            full_name: "octo/cat".to_string(),
            description: Some("A feline repository".to_string()),
            default_branch: "main".to_string(),
            language: Some("Rust".to_string()),
            license: None,
            readme: None,
            file_tree: vec!["src/lib.rs".to_string()],
            recent_commits: vec![],
        };

        let prompt = build_prompt(DocType::Readme, &context);
        assert!(prompt.prompt.contains("octo/cat"));
        assert!(prompt.prompt.contains("A feline repository"));
        assert!(prompt.prompt.contains("src/lib.rs"));
        assert!(prompt.prompt.contains("README.md"));
    }

    #[test]
    fn test_changelog_prompt_lists_commit_subjects() {
        let context = RepoContext {
            full_name: "octo/cat".to_string(),
            recent_commits: vec!["Fix the flux capacitor\n\nLong body".to_string()],
            ..Default::default()
        };

        let prompt = build_prompt(DocType::Changelog, &context);
        assert!(prompt.prompt.contains("- Fix the flux capacitor"));
        assert!(!prompt.prompt.contains("Long body"));
    }
}
