// Pull-request sub-flow
// A bounded linear workflow: branch off the default branch, commit the
// generated document, open the pull request. No state is retained between
// calls; each step is one request against the code-hosting API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::services::repo_content::RepoRef;

#[derive(Debug, Error)]
pub enum PullRequestError {
    #[error("Repository not found")]
    NotFound,

    #[error("Pull request creation failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone)]
pub struct PullRequestSpec {
    pub repo: RepoRef,
    pub branch_name: String,
    pub file_path: String,
    pub content: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

#[async_trait]
pub trait PullRequestOpener: Send + Sync {
    async fn open_docs_pull_request(
        &self,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestRef, PullRequestError>;
}

// =============================================================================
// GITHUB IMPLEMENTATION
// =============================================================================

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Debug, Deserialize)]
struct GitObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
}

pub struct GitHubPullRequestClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GitHubPullRequestClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::USER_AGENT, "docforge-backend")
            .header(header::ACCEPT, "application/vnd.github+json")
            .bearer_auth(&self.token)
    }

    async fn expect_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PullRequestError> {
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Err(PullRequestError::NotFound),
            status if !status.is_success() => {
                let detail = response.text().await.unwrap_or_default();
                Err(PullRequestError::Request(format!(
                    "GitHub returned {}: {}",
                    status, detail
                )))
            },
            _ => response
                .json::<T>()
                .await
                .map_err(|e| PullRequestError::Request(e.to_string())),
        }
    }
}

#[async_trait]
impl PullRequestOpener for GitHubPullRequestClient {
    async fn open_docs_pull_request(
        &self,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestRef, PullRequestError> {
        let repo_path = format!("/repos/{}/{}", spec.repo.owner, spec.repo.repo);

        // 1. Resolve the default branch and its head commit.
        let info: RepoInfo = Self::expect_json(
            self.request(reqwest::Method::GET, &repo_path)
                .send()
                .await
                .map_err(|e| PullRequestError::Request(e.to_string()))?,
        )
        .await?;

        let head: GitRef = Self::expect_json(
            self.request(
                reqwest::Method::GET,
                &format!("{}/git/ref/heads/{}", repo_path, info.default_branch),
            )
            .send()
            .await
            .map_err(|e| PullRequestError::Request(e.to_string()))?,
        )
        .await?;

        // 2. Create the docs branch.
        let _: serde_json::Value = Self::expect_json(
            self.request(reqwest::Method::POST, &format!("{}/git/refs", repo_path))
                .json(&json!({
                    "ref": format!("refs/heads/{}", spec.branch_name),
                    "sha": head.object.sha,
                }))
                .send()
                .await
                .map_err(|e| PullRequestError::Request(e.to_string()))?,
        )
        .await?;

        // 3. Commit the generated file onto the branch.
        let _: serde_json::Value = Self::expect_json(
            self.request(
                reqwest::Method::PUT,
                &format!("{}/contents/{}", repo_path, spec.file_path),
            )
            .json(&json!({
                "message": spec.title,
                "content": STANDARD.encode(spec.content.as_bytes()),
                "branch": spec.branch_name,
            }))
            .send()
            .await
            .map_err(|e| PullRequestError::Request(e.to_string()))?,
        )
        .await?;

        // 4. Open the pull request against the default branch.
        let pr: PullRequestResponse = Self::expect_json(
            self.request(reqwest::Method::POST, &format!("{}/pulls", repo_path))
                .json(&json!({
                    "title": spec.title,
                    "body": spec.body,
                    "head": spec.branch_name,
                    "base": info.default_branch,
                }))
                .send()
                .await
                .map_err(|e| PullRequestError::Request(e.to_string()))?,
        )
        .await?;

        Ok(PullRequestRef {
            number: pr.number,
            url: pr.html_url,
        })
    }
}
