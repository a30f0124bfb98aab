//! SoftLayer Authentication
//!
//! The REST API uses HTTP basic auth with the account username and an API key.
//! Credentials are read from explicit values, the environment, or the
//! `~/.softlayer` configuration file shared with the SoftLayer CLI.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;

/// Username + API key pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Resolve credentials, falling back to the environment and `~/.softlayer`
    pub fn resolve(username: Option<String>, api_key: Option<String>) -> Result<Self> {
        let username = username
            .or_else(get_default_username)
            .context("No SoftLayer username configured. Set SL_USERNAME or use --username")?;
        let api_key = api_key
            .or_else(get_default_api_key)
            .context("No SoftLayer API key configured. Set SL_API_KEY or use --api-key")?;
        Ok(Self::new(username, api_key))
    }
}

/// Path of the SoftLayer CLI configuration file
pub fn get_softlayer_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SL_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|p| p.join(".softlayer"))
}

/// API keys are 64 hex characters
fn validate_api_key(key: &str) -> bool {
    key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit())
}

/// First non-empty value among the named environment variables
fn env_value(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Read `key` from the `[softlayer]` section of an INI document
fn read_softlayer_section(content: &str, key: &str) -> Option<String> {
    let mut in_section = false;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = line == "[softlayer]";
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((name, value)) = line.split_once('=') {
            if name.trim() == key {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn read_config_file_value(key: &str) -> Option<String> {
    let path = get_softlayer_config_path()?;
    let content = std::fs::read_to_string(&path).ok()?;
    read_softlayer_section(&content, key)
}

pub fn get_default_username() -> Option<String> {
    env_value(&["SL_USERNAME", "SOFTLAYER_USERNAME"]).or_else(|| read_config_file_value("username"))
}

/// Default API key. Values with the wrong format are ignored with a warning.
pub fn get_default_api_key() -> Option<String> {
    if let Some(key) = env_value(&["SL_API_KEY", "SOFTLAYER_API_KEY"]) {
        if validate_api_key(&key) {
            return Some(key);
        }
        tracing::warn!("Invalid API key format in environment");
    }
    let key = read_config_file_value("api_key")?;
    if validate_api_key(&key) {
        return Some(key);
    }
    tracing::warn!("Invalid API key format in SoftLayer config file");
    None
}

pub fn get_default_endpoint() -> Option<String> {
    env_value(&["SL_ENDPOINT_URL", "SOFTLAYER_ENDPOINT_URL"])
        .or_else(|| read_config_file_value("endpoint_url"))
}
