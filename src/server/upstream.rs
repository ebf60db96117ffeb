//! OpenAI-compatible provider the proxy endpoints forward to

use crate::llm::{UpstreamConfig, FALLBACK_REPLY};
use crate::messages::{AudioClip, ContextMessage};
use crate::{ParleyError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hosted model behind the proxy endpoints
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Complete `message` after `system_prompt` and `context`
    async fn chat(
        &self,
        system_prompt: &str,
        context: &[ContextMessage],
        message: &str,
    ) -> Result<String>;

    /// Transcribe an audio clip to text
    async fn transcribe(&self, audio: AudioClip) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderError,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: String,
}

/// Client for `{base}/chat/completions` and `{base}/audio/transcriptions`
///
/// Does not derive Debug so the API key never ends up in logs.
pub struct OpenAiCompatProvider {
    client: Client,
    config: UpstreamConfig,
    api_key: String,
}

impl OpenAiCompatProvider {
    /// Create a provider, reading the API key from the configured environment variable
    pub fn from_env(config: UpstreamConfig) -> Result<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            ParleyError::Config(format!("Missing API key: set {}", config.api_key_env))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: UpstreamConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            api_key: api_key.into(),
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn format_api_error(status: StatusCode, body: &str) -> String {
        match status {
            StatusCode::UNAUTHORIZED => "Invalid API key for the model provider.".to_string(),
            StatusCode::TOO_MANY_REQUESTS => "Rate limited, retry later.".to_string(),
            _ => match serde_json::from_str::<ProviderErrorBody>(body) {
                Ok(parsed) => parsed.error.message,
                Err(_) if !body.trim().is_empty() => body.trim().to_string(),
                Err(_) => format!("Provider returned HTTP {}", status),
            },
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ParleyError::Upstream(Self::format_api_error(status, &body)))
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        context: &[ContextMessage],
        message: &str,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(WireMessage {
            role: "system",
            content: system_prompt,
        });
        messages.extend(context.iter().map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));
        messages.push(WireMessage {
            role: "user",
            content: message,
        });

        let request = ChatCompletionRequest {
            model: &self.config.chat_model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(
            "Requesting completion from {} with {} context messages",
            self.config.chat_model,
            context.len()
        );

        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ParleyError::Upstream(format!("Completion request failed: {}", e)))?;

        let body: ChatCompletionResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ParleyError::Upstream(format!("Unexpected completion response: {}", e)))?;

        let reply = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_REPLY.to_string());

        Ok(reply)
    }

    async fn transcribe(&self, audio: AudioClip) -> Result<String> {
        debug!(
            "Requesting transcription of {} bytes from {}",
            audio.len(),
            self.config.transcription_model
        );

        let part = Part::bytes(audio.data)
            .file_name(audio.file_name)
            .mime_str(&audio.mime_type)
            .map_err(|e| ParleyError::InvalidInput(format!("Invalid audio mime type: {}", e)))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.config.transcription_model.clone())
            .text("response_format", "json")
            .text("language", self.config.language.clone());

        let response = self
            .client
            .post(self.config.endpoint("audio/transcriptions"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ParleyError::Upstream(format!("Transcription request failed: {}", e)))?;

        let body: TranscriptionResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ParleyError::Upstream(format!("Unexpected transcription response: {}", e))
            })?;

        Ok(body.text)
    }
}
