//! Application configuration management.
//!
//! This module handles loading and saving the configuration: the API base
//! URL, token staleness threshold, retry budget, request timeout and where
//! default credentials for auto-login come from.
//!
//! Configuration is stored at `~/.config/freightdesk/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::api::retry::MAX_RATE_LIMIT_RETRIES;
use crate::auth::{
    ChainedCredentials, CredentialStore, DefaultCredentials, EnvCredentials, NoDefaultCredentials,
    DEFAULT_MAX_TOKEN_AGE_MINUTES,
};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "freightdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Overrides `api_base_url` when set
pub const API_URL_ENV: &str = "FREIGHTDESK_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";

/// Where full auto-login looks for default credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Environment first, then the keychain (`login --remember`)
    #[default]
    Auto,
    Env,
    Keyring,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub max_token_age_minutes: u32,
    pub max_retries: u32,
    pub request_timeout_secs: u64,
    pub credential_source: CredentialSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            max_token_age_minutes: DEFAULT_MAX_TOKEN_AGE_MINUTES,
            max_retries: MAX_RATE_LIMIT_RETRIES,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            credential_source: CredentialSource::default(),
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&Self::config_path()?)?;
        Ok(config.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url;
        }
        self
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn default_credentials(&self) -> Arc<dyn DefaultCredentials> {
        match self.credential_source {
            CredentialSource::Auto => Arc::new(ChainedCredentials::new(vec![
                Arc::new(EnvCredentials),
                Arc::new(CredentialStore),
            ])),
            CredentialSource::Env => Arc::new(EnvCredentials),
            CredentialSource::Keyring => Arc::new(CredentialStore),
            CredentialSource::None => Arc::new(NoDefaultCredentials),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_token_age_minutes, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.credential_source, CredentialSource::Auto);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_base_url": "https://ops.example.com", "credential_source": "keyring"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_base_url, "https://ops.example.com");
        assert_eq!(config.credential_source, CredentialSource::Keyring);
        assert_eq!(config.request_timeout_secs, REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            max_token_age_minutes: 5,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_api_url_override() {
        let config = Config::default().with_api_url_override(Some("https://staging".to_string()));
        assert_eq!(config.api_base_url, "https://staging");

        let config = Config::default().with_api_url_override(Some("  ".to_string()));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_credential_source_names() {
        for (name, source) in [
            ("auto", CredentialSource::Auto),
            ("env", CredentialSource::Env),
            ("keyring", CredentialSource::Keyring),
            ("none", CredentialSource::None),
        ] {
            let json = format!(r#"{{"credential_source": "{}"}}"#, name);
            let config: Config = serde_json::from_str(&json).unwrap();
            assert_eq!(config.credential_source, source);
        }
    }
}
