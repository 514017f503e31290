// Source repository content provider
// Collects the repository context a generation prompt is built from.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header;
use serde::Deserialize;
use thiserror::Error;

use crate::models::generation_event::DocType;

/// Paths beyond this are noise for prompt-building purposes
const MAX_TREE_ENTRIES: usize = 200;
const CHANGELOG_COMMIT_COUNT: u32 = 50;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Repository not found")]
    NotFound,

    #[error("Content fetch failed: {0}")]
    Fetch(String),
}

/// Parsed `owner/repo` target, optionally scoped to a file path
#[derive(Debug, Clone, PartialEq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub path: Option<String>,
}

impl RepoRef {
    pub fn parse(target: &str) -> Option<Self> {
        let mut parts = target.splitn(3, '/');
        let owner = parts.next().filter(|s| !s.is_empty())?.to_string();
        let repo = parts.next().filter(|s| !s.is_empty())?.to_string();
        let path = parts.next().map(|s| s.to_string());
        Some(Self { owner, repo, path })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Everything the prompt builder needs about a repository
#[derive(Debug, Clone, Default)]
pub struct RepoContext {
    pub full_name: String,
    pub description: Option<String>,
    pub default_branch: String,
    pub language: Option<String>,
    pub license: Option<String>,
    pub readme: Option<String>,
    pub file_tree: Vec<String>,
    pub recent_commits: Vec<String>,
}

#[async_trait]
pub trait RepoContentProvider: Send + Sync {
    async fn fetch_context(
        &self,
        target: &RepoRef,
        doc_type: DocType,
    ) -> Result<RepoContext, ContentError>;
}

// =============================================================================
// GITHUB REST IMPLEMENTATION
// =============================================================================

#[derive(Debug, Deserialize)]
struct RepoMetadata {
    full_name: String,
    description: Option<String>,
    default_branch: String,
    language: Option<String>,
    license: Option<LicenseInfo>,
}

#[derive(Debug, Deserialize)]
struct LicenseInfo {
    spdx_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    entry_type: String,
}

#[derive(Debug, Deserialize)]
struct ReadmeResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
}

pub struct GitHubContentProvider {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitHubContentProvider {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(header::USER_AGENT, "docforge-backend")
            .header(header::ACCEPT, "application/vnd.github+json");
        if !self.token.is_empty() {
            builder = builder.bearer_auth(&self.token);
        }
        builder
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ContentError> {
        let response = self
            .request(path)
            .send()
            .await
            .map_err(|e| ContentError::Fetch(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(ContentError::NotFound),
            status if !status.is_success() => {
                Err(ContentError::Fetch(format!("GitHub returned {}", status)))
            },
            _ => response
                .json::<T>()
                .await
                .map_err(|e| ContentError::Fetch(e.to_string())),
        }
    }
}

#[async_trait]
impl RepoContentProvider for GitHubContentProvider {
    async fn fetch_context(
        &self,
        target: &RepoRef,
        doc_type: DocType,
    ) -> Result<RepoContext, ContentError> {
        let repo_path = format!("/repos/{}/{}", target.owner, target.repo);

        let metadata: RepoMetadata = self.get_json(&repo_path).await?;

        let tree: TreeResponse = self
            .get_json(&format!(
                "{}/git/trees/{}?recursive=1",
                repo_path, metadata.default_branch
            ))
            .await?;
        let file_tree: Vec<String> = tree
            .tree
            .into_iter()
            .filter(|entry| entry.entry_type == "blob")
            .map(|entry| entry.path)
            .take(MAX_TREE_ENTRIES)
            .collect();

        // The README is context for most doc types but absent repos are fine.
        let readme = match self.get_json::<ReadmeResponse>(&format!("{}/readme", repo_path)).await {
            Ok(body) => {
                let cleaned: String = body.content.split_whitespace().collect();
                STANDARD
                    .decode(cleaned)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            },
            Err(ContentError::NotFound) => None,
            Err(e) => return Err(e),
        };

        // Commit history only matters for changelog generation.
        let recent_commits = if doc_type == DocType::Changelog {
            let commits: Vec<CommitEntry> = self
                .get_json(&format!(
                    "{}/commits?per_page={}",
                    repo_path, CHANGELOG_COMMIT_COUNT
                ))
                .await?;
            commits
                .into_iter()
                .map(|entry| entry.commit.message)
                .collect()
        } else {
            Vec::new()
        };

        Ok(RepoContext {
            full_name: metadata.full_name,
            description: metadata.description,
            default_branch: metadata.default_branch,
            language: metadata.language,
            license: metadata.license.and_then(|l| l.spdx_id),
            readme,
            file_tree,
            recent_commits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_ref_parse() {
        assert_eq!(
            RepoRef::parse("rust-lang/rust"),
            Some(RepoRef {
                owner: "rust-lang".to_string(),
                repo: "rust".to_string(),
                path: None,
            })
        );
        assert_eq!(
            RepoRef::parse("owner/repo/src/main.rs"),
            Some(RepoRef {
                owner: "owner".to_string(),
                repo: "repo".to_string(),
                path: Some("src/main.rs".to_string()),
            })
        );
        assert_eq!(RepoRef::parse("just-an-owner"), None);
        assert_eq!(RepoRef::parse(""), None);
    }

    #[test]
    fn test_repo_ref_full_name() {
        let repo = RepoRef::parse("octo/cat").unwrap();
        assert_eq!(repo.full_name(), "octo/cat");
    }
}
