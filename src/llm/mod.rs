//! Conversation context and upstream model settings
//!
//! - **config**: settings for the hosted OpenAI-compatible provider
//! - **context**: the bounded rolling window sent along with each message
//! - **prompts**: system prompts used by the proxy server

pub mod config;
pub mod context;
pub mod prompts;

pub use config::UpstreamConfig;
pub use context::{ContextStore, DEFAULT_CONTEXT_MESSAGES};
pub use prompts::{build_system_prompt, FALLBACK_REPLY};
