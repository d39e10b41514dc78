//! Configuration management for the file server
//!
//! Settings come from a TOML file (`config.toml`, or the path in
//! `FILEVAULT_CONFIG`) with environment overrides such as
//! `FILEVAULT__SERVER__PORT=9000`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::storage::UploadPolicy;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_VAR: &str = "FILEVAULT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub server: NetworkConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    /// Session tokens issued by the external identity provider.
    #[serde(default)]
    pub identities: Vec<IdentityEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// IP address to bind the listener to
    pub bind_address: String,
    pub port: u16,
    /// Maximum concurrent authenticated sessions
    pub max_clients: usize,
    /// Maximum length of one request line in bytes
    pub max_request_length: usize,
    /// Chunk size for streaming downloads
    pub buffer_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Base directory that holds every user's root
    pub root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub max_file_size_mb: u64,
    /// Accepted extensions; empty accepts any file
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdentityEntry {
    pub token: String,
    pub user: String,
}

impl ServerConfig {
    /// Load configuration from the default location with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Load configuration from an explicit file with environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FILEVAULT").separator("__"))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port cannot be 0".into()));
        }

        if self.server.max_clients == 0 {
            return Err(ConfigError::Message(
                "server.max_clients must be greater than 0".into(),
            ));
        }

        if self.server.max_request_length < 64 {
            return Err(ConfigError::Message(
                "server.max_request_length must be at least 64".into(),
            ));
        }

        if self.server.buffer_size == 0 {
            return Err(ConfigError::Message(
                "server.buffer_size must be greater than 0".into(),
            ));
        }

        if self.storage.root.trim().is_empty() {
            return Err(ConfigError::Message("storage.root cannot be empty".into()));
        }

        if self.upload.max_file_size_mb == 0 {
            return Err(ConfigError::Message(
                "upload.max_file_size_mb must be greater than 0".into(),
            ));
        }

        if self.upload.max_file_size_mb.checked_mul(BYTES_PER_MB).is_none() {
            return Err(ConfigError::Message(
                "upload.max_file_size_mb is too large".into(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.identities {
            if entry.token.trim().is_empty() || entry.user.is_empty() {
                return Err(ConfigError::Message(
                    "identities need a non-empty token and user".into(),
                ));
            }
            if !seen.insert(entry.token.as_str()) {
                return Err(ConfigError::Message(format!(
                    "duplicate token for user {}",
                    entry.user
                )));
            }
        }

        Ok(())
    }

    /// Bind address and port as a socket address string
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    pub fn storage_root(&self) -> PathBuf {
        PathBuf::from(&self.storage.root)
    }

    /// Upload limits derived from the `[upload]` section
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_bytes: Some(self.upload.max_file_size_mb.saturating_mul(BYTES_PER_MB)),
            allowed_extensions: self
                .upload
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}
