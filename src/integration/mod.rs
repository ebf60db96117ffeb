//! Session orchestration
//!
//! Connects user input to the proxies and records the results:
//! input -> context window -> proxy -> history + context window

mod config;
mod session;

pub use config::{default_data_dir, ParleyConfig, SessionConfig, CONFIG_FILE_NAME};
pub use session::{Exchange, Session};
