//! Uploader settings.
//!
//! Stored as TOML:
//! - Linux: `~/.config/psyhub/uploader.toml`
//! - Windows: `%APPDATA%/psyhub/uploader.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use psyhub_storage_client::ClientConfig;
use psyhub_storage_client::config::{DEFAULT_CHECK_PATH, DEFAULT_MERGE_PATH, DEFAULT_UPLOAD_PATH};
use psyhub_upload::options::DEFAULT_CONCURRENCY;
use psyhub_upload::{RetryPolicy, UploadOptions};

/// Errors produced while reading or writing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid settings file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Complete settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub upload: UploadSettings,
}

/// `[api]`: where the storage endpoints live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_check_path")]
    pub check_path: String,
    #[serde(default = "default_upload_path")]
    pub upload_path: String,
    #[serde(default = "default_merge_path")]
    pub merge_path: String,
    /// Bearer token; omitted from the file when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// `[upload]`: chunking and retry behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts per chunk (0 = retry forever).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080".into()
}

fn default_check_path() -> String {
    DEFAULT_CHECK_PATH.into()
}

fn default_upload_path() -> String {
    DEFAULT_UPLOAD_PATH.into()
}

fn default_merge_path() -> String {
    DEFAULT_MERGE_PATH.into()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_chunk_size() -> u64 {
    UploadOptions::default().chunk_size
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_max_attempts() -> u32 {
    RetryPolicy::default().max_attempts.unwrap_or(0)
}

fn default_retry_initial_ms() -> u64 {
    RetryPolicy::default().initial_delay.as_millis() as u64
}

fn default_retry_max_ms() -> u64 {
    RetryPolicy::default().max_delay.as_millis() as u64
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            check_path: default_check_path(),
            upload_path: default_upload_path(),
            merge_path: default_merge_path(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

impl Settings {
    /// Loads settings from the default path, creating the file if missing.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&config_path())
    }

    /// Loads settings from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "settings loaded");
            Ok(settings)
        } else {
            let settings = Settings::default();
            settings.save_to(path)?;
            Ok(settings)
        }
    }

    /// Saves to the default path.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source: std::io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(io_err)?;

        // The file may hold a bearer token.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }

        tracing::debug!(path = %path.display(), "settings saved");
        Ok(())
    }

    /// HTTP client configuration from `[api]`.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            check_path: self.api.check_path.clone(),
            upload_path: self.api.upload_path.clone(),
            merge_path: self.api.merge_path.clone(),
            token: self.api.token.clone().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(self.api.timeout_secs),
        }
    }

    /// Upload manager options from `[upload]`.
    pub fn upload_options(&self) -> UploadOptions {
        let upload = &self.upload;
        UploadOptions {
            chunk_size: upload.chunk_size,
            concurrency: upload.concurrency,
            retry: RetryPolicy {
                max_attempts: (upload.max_attempts > 0).then_some(upload.max_attempts),
                initial_delay: Duration::from_millis(upload.retry_initial_ms),
                max_delay: Duration::from_millis(upload.retry_max_ms),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Returns the platform-specific settings file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("psyhub")
            .join("uploader.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("psyhub").join("uploader.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/psyhub/uploader.toml")
    }
}
