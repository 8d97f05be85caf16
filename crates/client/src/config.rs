//! Client configuration.
//!
//! Loaded from TOML; every field has a default so a partial file is fine.
//! `MAXGAMMON_*` environment variables override file values.

use std::path::Path;
use std::time::Duration;

use maxgammon_board::AI_IDENTITY;
use serde::{Deserialize, Serialize};

/// Response deadline for a single command.
pub const RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Guard on consecutive computer turns in one settle pass.
pub const MAX_AI_ROUNDS: u32 = 64;

/// Guard on chained automatic transitions after one user action.
pub const MAX_SETTLE_STEPS: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid value in {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub response_timeout_ms: u64,
    /// Turn-owner name the server uses for the computer.
    pub ai_identity: String,
    pub max_ai_rounds: u32,
    pub max_settle_steps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: RESPONSE_TIMEOUT_MS,
            ai_identity: AI_IDENTITY.to_string(),
            max_ai_rounds: MAX_AI_ROUNDS,
            max_settle_steps: MAX_SETTLE_STEPS,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("MAXGAMMON_RESPONSE_TIMEOUT_MS") {
            self.response_timeout_ms = value.parse().map_err(|_| ConfigError::Env {
                var: "MAXGAMMON_RESPONSE_TIMEOUT_MS",
                value,
            })?;
        }
        if let Ok(value) = std::env::var("MAXGAMMON_AI_IDENTITY") {
            self.ai_identity = value;
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}
