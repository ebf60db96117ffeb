//! The two hosted proxies a session talks to
//!
//! A [`CompletionProxy`] turns a message plus recent context into a reply. A
//! [`TranscriptionProxy`] turns recorded audio into text, and may also return
//! the completion for that text in the same round trip.
//!
//! [`HttpProxyClient`] implements both against the `/api/chat` and
//! `/api/transcribe` endpoints served by [`crate::server`].

pub mod client;

use crate::messages::{AudioClip, ContextMessage};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use client::{HttpProxyClient, ProxyClientConfig};

/// Generates a reply for a message given the recent context
#[async_trait]
pub trait CompletionProxy: Send + Sync {
    async fn complete(&self, message: &str, context: &[ContextMessage]) -> Result<String>;
}

/// Transcribes recorded audio
///
/// `context` is forwarded so that a proxy which also completes the
/// transcript can use it; it plays no part in the transcription itself.
#[async_trait]
pub trait TranscriptionProxy: Send + Sync {
    async fn transcribe(&self, audio: &AudioClip, context: &[ContextMessage])
        -> Result<Transcription>;
}

/// Result of a transcription round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    /// Completion for `text`, when the proxy produced one
    pub response: Option<String>,
}

impl Transcription {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response: None,
        }
    }

    pub fn with_response(text: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            response: Some(response.into()),
        }
    }
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Vec<ContextMessage>,
}

/// Success body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Success body of `POST /api/transcribe`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub transcription: String,
    #[serde(default)]
    pub response: Option<String>,
}

/// Failure body of both endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_context_defaults_to_empty() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.context.is_empty());
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let req = ChatRequest {
            message: "and then?".to_string(),
            context: vec![ContextMessage::user("hi"), ContextMessage::assistant("hello")],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "message": "and then?",
                "context": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"}
                ]
            })
        );
    }

    #[test]
    fn test_transcribe_response_without_completion() {
        let body: TranscribeResponse =
            serde_json::from_str(r#"{"transcription":"hello"}"#).unwrap();
        assert_eq!(body.transcription, "hello");
        assert!(body.response.is_none());
    }
}
