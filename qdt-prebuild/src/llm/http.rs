//! Chat-completions HTTP client
//!
//! Minimal client for OpenAI-compatible `/chat/completions` endpoints. One user
//! message per prompt; an attached image is sent inline as a base64 data URL.

use super::LlmService;
use async_trait::async_trait;
use base64::Engine;
use qdt_common::config::LlmConfig;
use qdt_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::debug;

const USER_AGENT: &str = concat!("qdt-prebuild/", env!("CARGO_PKG_VERSION"));

/// Chat client errors
#[derive(Debug, ThisError)]
pub enum ChatClientError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Empty response")]
    EmptyResponse,

    #[error("Cannot read image {0}: {1}")]
    ImageError(String, String),
}

impl From<ChatClientError> for Error {
    fn from(err: ChatClientError) -> Self {
        Error::External(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

pub struct ChatCompletionsClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> std::result::Result<Self, ChatClientError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ChatClientError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        })
    }

    /// Build a client from `[llm]` configuration, reading the API key from the environment
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Ok(Self::new(
            &config.base_url,
            &config.model,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )?)
    }

    async fn image_part(image: &Path) -> std::result::Result<ContentPart, ChatClientError> {
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|e| ChatClientError::ImageError(image.display().to_string(), e.to_string()))?;
        let mime = match image.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
            Some(ext) if ext == "png" => "image/png",
            Some(ext) if ext == "gif" => "image/gif",
            Some(ext) if ext == "webp" => "image/webp",
            _ => "image/jpeg",
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", mime, encoded),
            },
        })
    }

    async fn complete(
        &self,
        prompt: &str,
        image: Option<&Path>,
    ) -> std::result::Result<String, ChatClientError> {
        let mut content = vec![ContentPart::Text {
            text: prompt.to_string(),
        }];
        if let Some(image) = image {
            content.push(Self::image_part(image).await?);
        }
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        };

        debug!(model = %self.model, with_image = image.is_some(), "Sending chat completion request");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatClientError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ChatClientError::ApiError(status.as_u16(), error_text));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ChatClientError::ParseError(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ChatClientError::EmptyResponse)
    }
}

#[async_trait]
impl LlmService for ChatCompletionsClient {
    async fn send_prompt(&self, prompt: &str, image: Option<&Path>) -> Result<String> {
        Ok(self.complete(prompt, image).await?)
    }
}
