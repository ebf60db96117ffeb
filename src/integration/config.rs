//! Configuration for the integration layer
//!
//! Provides centralized configuration for the session, the proxy client, the
//! proxy server and the upstream provider. Every field is optional in the TOML
//! file; missing sections fall back to their defaults.

use crate::llm::context::DEFAULT_CONTEXT_MESSAGES;
use crate::llm::UpstreamConfig;
use crate::proxy::ProxyClientConfig;
use crate::server::ServerConfig;
use crate::{ParleyError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the config file looked up inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration for a single conversation session
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of messages kept in the rolling context window
    pub context_window: usize,

    /// Timeout applied to each proxy call, in seconds
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_window: DEFAULT_CONTEXT_MESSAGES,
            request_timeout_secs: 60,
        }
    }
}

impl SessionConfig {
    /// Set the context window size
    pub fn with_context_window(mut self, context_window: usize) -> Self {
        self.context_window = context_window;
        self
    }

    /// Set the per-request timeout
    ///
    /// The timeout is kept in whole seconds; a fractional part rounds up, so
    /// 500 ms becomes 1 s and 1.5 s becomes 2 s.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let round_up = u64::from(timeout.subsec_nanos() > 0);
        self.request_timeout_secs = timeout.as_secs().saturating_add(round_up).max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Complete application configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Directory holding the persisted session; defaults to the platform data dir
    pub data_dir: Option<PathBuf>,

    pub session: SessionConfig,

    pub proxy: ProxyClientConfig,

    pub server: ServerConfig,

    pub upstream: UpstreamConfig,
}

impl ParleyConfig {
    /// Load a configuration file, failing if it cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ParleyError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| ParleyError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load `config.toml` from `data_dir`, using defaults when it is missing or invalid
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!("No {} found, using defaults", path.display());
            return Self::default();
        }

        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ParleyError::Config(e.to_string()))
    }

    /// Resolve the data directory: explicit setting, then `<platform data dir>/parley`
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the session configuration
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.context_window == 0 {
            return Err(ParleyError::Config(
                "session.context_window must be at least 1".to_string(),
            ));
        }
        if self.session.request_timeout_secs == 0 {
            return Err(ParleyError::Config(
                "session.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.proxy.base_url.trim().is_empty() {
            return Err(ParleyError::Config("proxy.base_url is required".to_string()));
        }
        if self.proxy.timeout_secs == 0 {
            return Err(ParleyError::Config(
                "proxy.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(ParleyError::Config("upstream.base_url is required".to_string()));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ParleyError::Config(
                "upstream.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<platform data dir>/parley`, or `./.parley` when the platform has none
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("parley"))
        .unwrap_or_else(|| PathBuf::from(".parley"))
}
