use std::time::Duration;

use async_trait::async_trait;
use quill_core::{LlmConfig, QuillError};
use serde::{Deserialize, Serialize};

/// Azure OpenAI REST API version used for deployment endpoints.
pub const AZURE_API_VERSION: &str = "2024-02-01";

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Anything that turns a system prompt and a user message into generated text.
///
/// The dispatcher only sees this trait, so tests substitute scripted
/// generators for the HTTP client.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for one unit.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Llm`] when the service call fails or the
    /// response has no text.
    async fn generate(&self, system: &str, user: &str, max_tokens: u32)
        -> Result<String, QuillError>;
}

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use quill_generate::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage {
///     role: Role::User,
///     content: "# Name\nsrc/A.cs\n".into(),
/// };
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use quill_generate::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Chat completions client for OpenAI-compatible and Azure OpenAI endpoints.
///
/// With `use_azure` unset, requests go to `{base_url}/v1/chat/completions`
/// (default base `https://api.openai.com`) with bearer authentication.
/// With `use_azure` set, the model name is the deployment name and requests
/// go to `{base_url}/openai/deployments/{model}/chat/completions` with an
/// `api-key` header.
///
/// # Examples
///
/// ```
/// use quill_core::LlmConfig;
/// use quill_generate::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: "test-key".into(),
///     model: "gpt-4o".into(),
///     max_tokens: 1000,
///     use_azure: false,
///     base_url: None,
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, QuillError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| QuillError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Return the model (or deployment) name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// The chat completions URL requests are sent to.
    pub fn endpoint(&self) -> String {
        let base_url = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        if self.config.use_azure {
            format!(
                "{base_url}/openai/deployments/{}/chat/completions?api-version={AZURE_API_VERSION}",
                self.config.model
            )
        } else {
            format!("{base_url}/v1/chat/completions")
        }
    }

    /// Send a chat completion request and return the text response.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Llm`] on HTTP errors or response parsing failures.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        max_tokens: u32,
    ) -> Result<String, QuillError> {
        let url = self.endpoint();

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });

        let mut request = self.client.post(&url);
        request = if self.config.use_azure {
            request.header("api-key", &self.config.api_key)
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        };
        request = request.header("Content-Type", "application/json");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| QuillError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(QuillError::Llm(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QuillError::Llm(format!("failed to parse response: {e}")))?;

        extract_content(&response_body)
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, QuillError> {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: system.to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: user.to_string(),
            },
        ];
        self.chat(messages, max_tokens).await
    }
}

fn extract_content(response_body: &serde_json::Value) -> Result<String, QuillError> {
    let content = response_body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            QuillError::Llm(format!("unexpected response structure: {response_body}"))
        })?;

    Ok(content.to_string())
}
