use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Label used when rendering a transcript
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// The `{role, content}` pair sent to the proxies as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One message in the displayed conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_audio: bool,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>, sequence: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            sequence,
            timestamp: Utc::now(),
            is_audio: false,
        }
    }

    pub fn audio_sourced(mut self) -> Self {
        self.is_audio = true;
        self
    }

    pub fn to_context(&self) -> ContextMessage {
        ContextMessage::new(self.role, self.content.clone())
    }
}

/// A recorded audio blob awaiting transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

impl AudioClip {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            mime_type: "audio/webm".to_string(),
            file_name: "recording.webm".to_string(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Guess the mime type from a file extension, falling back to octet-stream
    pub fn mime_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "webm" => "audio/webm",
            "wav" => "audio/wav",
            "mp3" | "mpga" | "mpeg" => "audio/mpeg",
            "m4a" | "mp4" => "audio/mp4",
            "ogg" | "oga" => "audio/ogg",
            "flac" => "audio/flac",
            _ => "application/octet-stream",
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
