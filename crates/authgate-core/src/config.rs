//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! backend URL, timeouts, which durable token tier to use, the guard's
//! landing page and the last account used to log in.
//!
//! Configuration is stored at `~/.config/authgate/config.json`.
//! `AUTHGATE_BASE_URL` and `AUTHGATE_DURABLE_STORE` override the file.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::CredentialStore;
use crate::guard::GuardPolicy;

/// Application name used for config/data directory paths
const APP_NAME: &str = "authgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Verification (`/me`) timeout in seconds.
const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;

const ENV_BASE_URL: &str = "AUTHGATE_BASE_URL";
const ENV_DURABLE_STORE: &str = "AUTHGATE_DURABLE_STORE";

/// Backend for the durable token tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurableStore {
    /// JSON file in the data directory.
    #[default]
    File,
    /// OS keychain.
    Keyring,
}

impl FromStr for DurableStore {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(DurableStore::File),
            "keyring" => Ok(DurableStore::Keyring),
            other => Err(anyhow::anyhow!("Unknown durable store: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// `0` disables the verification timeout.
    pub verify_timeout_secs: u64,
    pub durable_store: DurableStore,
    pub landing_path: Option<String>,
    pub last_account: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            durable_store: DurableStore::default(),
            landing_path: None,
            last_account: None,
        }
    }
}

impl Config {
    /// Load the config file (defaults when missing), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
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

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(store) = lookup(ENV_DURABLE_STORE) {
            match store.parse() {
                Ok(store) => self.durable_store = store,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_DURABLE_STORE),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the durable token file.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Option<Duration> {
        (self.verify_timeout_secs > 0).then(|| Duration::from_secs(self.verify_timeout_secs))
    }

    /// Credential store for the configured durable tier.
    pub fn credential_store(&self) -> Result<CredentialStore> {
        Ok(match self.durable_store {
            DurableStore::File => CredentialStore::with_file(&self.data_dir()?),
            DurableStore::Keyring => CredentialStore::with_keyring(),
        })
    }

    pub fn guard_policy(&self) -> GuardPolicy {
        let mut policy = GuardPolicy::default();
        if let Some(ref landing) = self.landing_path {
            policy.landing_path = landing.clone();
        }
        policy
    }
}
