//! Configuration Management
//!
//! Handles persistent configuration storage for slcloud.

use crate::poll::PollSettings;
use crate::resource::Timeouts;
use crate::softlayer::{auth, request::DEFAULT_ENDPOINT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Poll budgets in seconds; unset values keep the built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PollingConfig {
    #[serde(default)]
    pub order_timeout_secs: Option<u64>,
    #[serde(default)]
    pub order_interval_secs: Option<u64>,
    #[serde(default)]
    pub cancellation_timeout_secs: Option<u64>,
    #[serde(default)]
    pub cancellation_interval_secs: Option<u64>,
    #[serde(default)]
    pub activation_timeout_secs: Option<u64>,
}

fn override_settings(
    base: PollSettings,
    timeout: Option<u64>,
    interval: Option<u64>,
) -> PollSettings {
    PollSettings {
        timeout: timeout.map(Duration::from_secs).unwrap_or(base.timeout),
        min_interval: interval.map(Duration::from_secs).unwrap_or(base.min_interval),
        ..base
    }
}

impl PollingConfig {
    pub fn timeouts(&self) -> Timeouts {
        let defaults = Timeouts::default();
        Timeouts {
            order: override_settings(
                defaults.order,
                self.order_timeout_secs,
                self.order_interval_secs,
            ),
            cancellation: override_settings(
                defaults.cancellation,
                self.cancellation_timeout_secs,
                self.cancellation_interval_secs,
            ),
            activation: override_settings(defaults.activation, self.activation_timeout_secs, None),
        }
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// REST endpoint, e.g. the private network endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("slcloud").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", path, e);
                Self::default()
            },
        }
    }

    fn parse(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config file: {}", e);
            Self::default()
        })
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get effective username (config > environment > ~/.softlayer)
    pub fn effective_username(&self) -> Option<String> {
        self.username.clone().or_else(auth::get_default_username)
    }

    /// Get effective API key (config > environment > ~/.softlayer)
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(auth::get_default_api_key)
    }

    /// Get effective endpoint (config > environment > ~/.softlayer > public endpoint)
    pub fn effective_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .or_else(auth::get_default_endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }
}
