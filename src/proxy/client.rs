//! reqwest client for the proxy endpoints

use super::{
    ChatRequest, ChatResponse, CompletionProxy, ErrorBody, TranscribeResponse, Transcription,
    TranscriptionProxy,
};
use crate::messages::{AudioClip, ContextMessage};
use crate::{ParleyError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Where the proxy endpoints live
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyClientConfig {
    /// Base URL of the proxy server, without the `/api` suffix
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ProxyClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ProxyClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Talks to `/api/chat` and `/api/transcribe`
#[derive(Clone, Debug)]
pub struct HttpProxyClient {
    client: Client,
    config: ProxyClientConfig,
}

impl HttpProxyClient {
    pub fn new(config: ProxyClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ParleyError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProxyClientConfig {
        &self.config
    }

    /// Turn a non-2xx response into an `Upstream` error carrying the proxy's message
    async fn error_from(response: Response) -> ParleyError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        ParleyError::Upstream(Self::format_error(status, &text))
    }

    fn format_error(status: StatusCode, body: &str) -> String {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) if !parsed.error.trim().is_empty() => parsed.error,
            _ => format!("Proxy returned HTTP {}", status),
        }
    }

    fn request_error(e: reqwest::Error) -> ParleyError {
        if e.is_timeout() {
            ParleyError::Upstream("Request to proxy timed out".to_string())
        } else {
            ParleyError::Upstream(format!("Request to proxy failed: {}", e))
        }
    }
}

#[async_trait]
impl CompletionProxy for HttpProxyClient {
    async fn complete(&self, message: &str, context: &[ContextMessage]) -> Result<String> {
        let url = self.config.url("/api/chat");
        debug!("POST {} with {} context messages", url, context.len());

        let body = ChatRequest {
            message: message.to_string(),
            context: context.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(Self::request_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let reply: ChatResponse = response.json().await.map_err(|e| {
            ParleyError::Upstream(format!("Unexpected response from proxy: {}", e))
        })?;
        Ok(reply.response)
    }
}

#[async_trait]
impl TranscriptionProxy for HttpProxyClient {
    async fn transcribe(
        &self,
        audio: &AudioClip,
        context: &[ContextMessage],
    ) -> Result<Transcription> {
        let url = self.config.url("/api/transcribe");
        debug!("POST {} with {} bytes of audio", url, audio.len());

        let part = Part::bytes(audio.data.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .map_err(|e| ParleyError::InvalidInput(format!("Invalid audio mime type: {}", e)))?;
        let form = Form::new()
            .part("audio", part)
            .text("context", serde_json::to_string(context)?);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(Self::request_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let reply: TranscribeResponse = response.json().await.map_err(|e| {
            ParleyError::Upstream(format!("Unexpected response from proxy: {}", e))
        })?;
        Ok(Transcription {
            text: reply.transcription,
            response: reply.response,
        })
    }
}
