//! Engine configuration loaded from TOML.
//!
//! The default location follows the XDG Base Directory specification:
//! `$XDG_CONFIG_HOME/remedy/config.toml` or `~/.config/remedy/config.toml`.
//! A missing default file is not an error; every field has a default.
//!
//! ```toml
//! executor_url = "https://executor.internal/api"
//! analysis_url = "https://analysis.internal/api"
//! api_key = "..."
//! stall_timeout_secs = 120
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result, ResultExt};

const DEFAULT_EXECUTOR_URL: &str = "http://127.0.0.1:8080/api";

/// Settings shared by the controller and its remote collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the remote executor HTTP API
    pub executor_url: String,
    /// Base URL for event streams; derived from `executor_url` when unset
    pub stream_url: Option<String>,
    /// Base URL of the analysis service; falls back to `executor_url`
    pub analysis_url: Option<String>,
    /// Sent as a bearer token to every remote endpoint
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Silence on a running deployment's stream before it is flagged stalled
    pub stall_timeout_secs: u64,
    pub reconnect_delay_ms: u64,
    /// Capacity of the controller's input channel
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executor_url: DEFAULT_EXECUTOR_URL.to_string(),
            stream_url: None,
            analysis_url: None,
            api_key: None,
            request_timeout_secs: 30,
            stall_timeout_secs: 300,
            reconnect_delay_ms: 1000,
            channel_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `path`, or from the XDG default location
    /// when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::FileSystem` if an explicit path cannot be read,
    /// `EngineError::Configuration` if the TOML is invalid and
    /// `EngineError::InvalidInput` if it fails [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&path).map_err(|e| EngineError::FileSystem {
            path: path.clone(),
            source: e,
        })?;
        let config = Self::from_toml(&contents).map_err(|e| match e {
            EngineError::Configuration { message } => EngineError::Configuration {
                message: format!("{}: {message}", path.display()),
            },
            other => other,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).with_context("invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Existing config file at the XDG location, if any.
    pub fn default_path() -> Option<PathBuf> {
        xdg::BaseDirectories::with_prefix("remedy").find_config_file("config.toml")
    }

    /// Rejects empty URLs and zero timeouts.
    pub fn validate(&self) -> Result<()> {
        require_url("executor_url", &self.executor_url)?;
        if let Some(url) = &self.stream_url {
            require_url("stream_url", url)?;
        }
        if let Some(url) = &self.analysis_url {
            require_url("analysis_url", url)?;
        }
        for (field, value) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("stall_timeout_secs", self.stall_timeout_secs),
        ] {
            if value == 0 {
                return Err(EngineError::invalid_input(field).with_reason("must be greater than zero"));
            }
        }
        if self.channel_capacity == 0 {
            return Err(EngineError::invalid_input("channel_capacity")
                .with_reason("must be greater than zero"));
        }
        Ok(())
    }

    /// Event stream base URL. Derived from the executor URL by swapping the
    /// scheme (`http` to `ws`, `https` to `wss`) when not set explicitly.
    pub fn stream_url(&self) -> String {
        if let Some(url) = &self.stream_url {
            return url.clone();
        }
        if let Some(rest) = self.executor_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.executor_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.executor_url.clone()
        }
    }

    pub fn analysis_url(&self) -> &str {
        self.analysis_url.as_deref().unwrap_or(&self.executor_url)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

fn require_url(field: &str, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::invalid_input(field).with_reason("URL cannot be empty"));
    }
    if !value.contains("://") {
        return Err(EngineError::invalid_input(field)
            .with_reason(format!("'{value}' is missing a scheme")));
    }
    Ok(())
}
