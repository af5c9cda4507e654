//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend origin, where durable credentials live, and
//! the last email used to log in.
//!
//! Configuration is stored at `~/.config/resourcehub/config.json`.
//! `RESOURCEHUB_API_URL` overrides the configured backend origin.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{CredentialStore, FileArea, KeyringArea, MemoryArea};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "resourcehub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Durable credential file name in the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

/// Environment variable that overrides `api_base_url`
pub const API_URL_ENV: &str = "RESOURCEHUB_API_URL";

/// Backend origin used when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";

/// Where "remember me" credentials are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurableStore {
    /// JSON file in the user data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub durable_store: DurableStore,
    /// Unset means reqwest's defaults apply
    pub request_timeout_secs: Option<u64>,
    pub last_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Backend origin: environment, then config file, then the default.
    pub fn api_base_url(&self) -> Result<String> {
        let env_url = std::env::var(API_URL_ENV).ok().filter(|u| !u.trim().is_empty());
        let raw = env_url
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        Self::validate_base_url(&raw)
    }

    /// Check that `raw` is an http(s) origin and strip any trailing slash.
    pub fn validate_base_url(raw: &str) -> Result<String> {
        let raw = raw.trim();
        let url = Url::parse(raw).with_context(|| format!("Invalid API base URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("API base URL must use http or https: {}", raw);
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    pub fn http_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(secs) = self.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build().context("Failed to build HTTP client")
    }

    /// Credential store with the configured durable area and an in-process
    /// ephemeral area.
    pub fn credential_store(&self) -> Result<CredentialStore> {
        let store = match self.durable_store {
            DurableStore::File => {
                let path = self.data_dir()?.join(CREDENTIALS_FILE);
                CredentialStore::new(FileArea::new(path), MemoryArea::new())
            }
            DurableStore::Keyring => CredentialStore::new(KeyringArea::new(APP_NAME), MemoryArea::new()),
        };
        Ok(store)
    }
}
