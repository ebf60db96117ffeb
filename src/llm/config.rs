//! Configuration for the upstream OpenAI-compatible provider

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the hosted model provider the proxy server forwards to
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the OpenAI-compatible API
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Chat completion model
    pub chat_model: String,

    /// Speech-to-text model
    pub transcription_model: String,

    /// Language hint for transcription
    pub language: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate per reply
    pub max_tokens: u32,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            chat_model: "llama-3.3-70b-versatile".to_string(),
            transcription_model: "whisper-large-v3".to_string(),
            language: "en".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 60,
        }
    }
}

impl UpstreamConfig {
    /// Create a configuration for another OpenAI-compatible endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the chat model
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the transcription model
    pub fn with_transcription_model(mut self, model: impl Into<String>) -> Self {
        self.transcription_model = model.into();
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the environment variable the API key is read from
    pub fn with_api_key_env(mut self, name: impl Into<String>) -> Self {
        self.api_key_env = name.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    /// Full URL of an endpoint below the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
