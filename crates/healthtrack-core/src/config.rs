//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! service base URL, endpoint paths, request timeout, where credentials are
//! kept and how the user's identity is resolved.
//!
//! Configuration is stored at `~/.config/healthtrack/config.json`.
//! `HEALTHTRACK_BASE_URL` overrides the stored base URL.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialBackend, FileBackend, KeyringBackend, MemoryBackend};

/// Application name used for config/data directory paths
const APP_NAME: &str = "healthtrack";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Encrypted credential file name, in the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const BASE_URL_ENV: &str = "HEALTHTRACK_BASE_URL";

/// Passphrase for the credential file
pub const STORE_KEY_ENV: &str = "HEALTHTRACK_STORE_KEY";

/// Paths of the authentication endpoints, relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub register: String,
    pub refresh: String,
    /// Only consulted with [`IdentitySource::ProfileEndpoint`]
    pub profile: Option<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "api/token/".to_string(),
            register: "api/users/register/".to_string(),
            refresh: "api/token/refresh/".to_string(),
            profile: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Encrypted file in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing persisted
    Memory,
}

/// Where the logged-in user's identity comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Email plus the part before `@` as display name
    #[default]
    EmailLocalPart,
    /// GET `endpoints.profile` after login
    ProfileEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub endpoints: Endpoints,
    pub request_timeout_secs: u64,
    pub credential_backend: BackendKind,
    pub identity: IdentitySource,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            endpoints: Endpoints::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            credential_backend: BackendKind::default(),
            identity: IdentitySource::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
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

    /// Record `email` as the last one used, leaving every other stored
    /// setting (and any environment override) untouched.
    pub fn remember_last_email(email: &str) -> Result<()> {
        let path = Self::config_path()?;
        let mut stored = Self::load_from(&path)?;
        stored.last_email = Some(email.to_string());
        stored.save_to(&path)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url.trim().to_string();
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the configured credential backend.
    pub fn credential_backend(&self) -> Result<Arc<dyn CredentialBackend>> {
        let backend: Arc<dyn CredentialBackend> = match self.credential_backend {
            BackendKind::File => Arc::new(FileBackend::new(
                self.data_dir()?.join(CREDENTIALS_FILE),
                store_passphrase(),
            )),
            BackendKind::Keyring => Arc::new(KeyringBackend::new()),
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(backend)
    }
}

/// Passphrase for the credential file: `HEALTHTRACK_STORE_KEY`, else a
/// per-user value derived from the home directory.
fn store_passphrase() -> String {
    match std::env::var(STORE_KEY_ENV) {
        Ok(key) if !key.is_empty() => key,
        _ => {
            let home = dirs::home_dir().unwrap_or_default();
            format!("{}:{}", APP_NAME, home.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.endpoints.refresh, "api/token/refresh/");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.credential_backend, BackendKind::File);
        assert_eq!(config.identity, IdentitySource::EmailLocalPart);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"base_url": "https://tracker.example", "credential_backend": "keyring",
                "identity": "profile_endpoint", "endpoints": {"profile": "api/users/me/"}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.base_url, "https://tracker.example");
        assert_eq!(config.credential_backend, BackendKind::Keyring);
        assert_eq!(config.identity, IdentitySource::ProfileEndpoint);
        assert_eq!(config.endpoints.profile.as_deref(), Some("api/users/me/"));
        assert_eq!(config.endpoints.login, "api/token/");
    }

    #[test]
    fn test_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            last_email: Some("a@x.com".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.last_email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
