pub mod integration;
pub mod llm;
pub mod messages;
pub mod proxy;
pub mod server;

use thiserror::Error;

pub use integration::{Exchange, ParleyConfig, Session, SessionConfig};
pub use messages::{AudioClip, ContextMessage, ConversationHistory, Role, Turn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParleyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("A request is already in flight")]
    Busy,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ParleyError {
    fn from(e: std::io::Error) -> Self {
        ParleyError::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for ParleyError {
    fn from(e: serde_json::Error) -> Self {
        ParleyError::Serialization(e.to_string())
    }
}

impl ParleyError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The caller can fix the input and resubmit
            ParleyError::InvalidInput(_) => true,
            // Network and provider failures are typically transient
            ParleyError::Upstream(_) => true,
            // Resolves once the in-flight request finishes
            ParleyError::Busy => true,
            ParleyError::Storage(_) => false,
            ParleyError::Serialization(_) => false,
            ParleyError::Config(_) => false,
            ParleyError::IoError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::InvalidInput(_) => {
                "Nothing to send. Please type a message or record some audio.".to_string()
            }
            ParleyError::Upstream(msg) => msg.clone(),
            ParleyError::Busy => {
                "Still waiting for the previous reply. Please wait.".to_string()
            }
            ParleyError::Storage(_) => {
                "Failed to save the conversation.".to_string()
            }
            ParleyError::Serialization(_) => {
                "Conversation data is corrupted.".to_string()
            }
            ParleyError::Config(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ParleyError::IoError(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_is_passed_through() {
        let err = ParleyError::Upstream("model overloaded".to_string());
        assert_eq!(err.user_message(), "model overloaded");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ParleyError = io.into();
        assert!(matches!(err, ParleyError::IoError(_)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<Vec<String>>("not json").unwrap_err();
        let err: ParleyError = parse.into();
        assert!(matches!(err, ParleyError::Serialization(_)));
    }
}
