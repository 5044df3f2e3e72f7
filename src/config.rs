//! Configuration Management
//!
//! Persistent settings for stackwire, read from the user's config directory.

use crate::resolve::{EngineOptions, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the configured token
pub const TOKEN_ENV: &str = "STACKWIRE_TOKEN";

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider API endpoint
    pub endpoint: Option<String>,
    /// Bearer token for the provider API
    pub token: Option<String>,
    /// Retry policy for transient provider failures
    pub retry: RetryPolicy,
    /// Nodes realized at once
    pub max_concurrency: usize,
    /// Stop scheduling new nodes after the first failure
    pub fail_fast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            retry: RetryPolicy::default(),
            max_concurrency: 1,
            fail_fast: true,
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("stackwire").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_json(&content),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    /// Parse configuration, falling back to defaults on malformed input
    pub fn from_json(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_else(|e| {
            tracing::warn!("Invalid config file: {}, using defaults", e);
            Self::default()
        })
    }

    /// Get effective token (environment > config)
    pub fn effective_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.token.clone())
    }

    /// Get effective endpoint (CLI > config)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string).or_else(|| self.endpoint.clone())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            retry: self.retry.clone(),
            max_concurrency: self.max_concurrency.max(1),
            fail_fast: self.fail_fast,
        }
    }
}
