// Text generation collaborator
// Prompt in, markdown out. The backend treats the model service as a black
// box; only the request/response contract lives here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generation request failed: {0}")]
    Request(String),

    #[error("Generation was refused by the model service")]
    Refused,

    #[error("Model service returned no text")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct GenerationPrompt {
    pub system: String,
    pub prompt: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedDocument {
    pub content: String,
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate_document(
        &self,
        request: GenerationPrompt,
    ) -> Result<GeneratedDocument, GeneratorError>;
}

// =============================================================================
// ANTHROPIC MESSAGES API IMPLEMENTATION
// =============================================================================

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

pub struct AnthropicGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    pub fn new(base_url: String, api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl DocumentGenerator for AnthropicGenerator {
    async fn generate_document(
        &self,
        request: GenerationPrompt,
    ) -> Result<GeneratedDocument, GeneratorError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Request(format!(
                "model service returned {}: {}",
                status, detail
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Request(e.to_string()))?;

        // Check the stop reason before reading content: a refusal arrives
        // as a successful response with empty or partial content.
        if parsed.stop_reason.as_deref() == Some("refusal") {
            return Err(GeneratorError::Refused);
        }

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(GeneratorError::Empty);
        }

        Ok(GeneratedDocument { content })
    }
}
