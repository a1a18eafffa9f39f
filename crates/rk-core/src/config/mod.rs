//! Configuration management for rk-chat

mod client;
pub mod serde_utils;
mod server;

pub use client::{BackoffConfig, ClientConfig};
pub use server::ServerConfig;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rk-chat")
}

/// Get the default server configuration file path
pub fn default_server_config_path() -> PathBuf {
    default_config_dir().join("server.toml")
}

/// Get the default client configuration file path
pub fn default_client_config_path() -> PathBuf {
    default_config_dir().join("client.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load configuration from `path` if given, else from `default_path` when it
/// exists, else fall back to defaults.
///
/// An explicitly requested file must exist; a broken default file is logged
/// and ignored.
pub fn load_or_default<T>(path: Option<&Path>, default_path: &Path) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if let Some(path) = path {
        return load_config(path);
    }

    if default_path.exists() {
        return Ok(load_config(default_path).unwrap_or_else(|e| {
            tracing::warn!(path = %default_path.display(), error = %e, "Ignoring unreadable config");
            T::default()
        }));
    }

    tracing::debug!("Using default configuration");
    Ok(T::default())
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Locations of the PEM material for one end of a mutual-TLS connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsPaths {
    /// Own certificate chain
    pub cert: PathBuf,
    /// Own private key
    pub key: PathBuf,
    /// Certificates trusted to sign the peer's certificate
    pub ca: PathBuf,
}

impl TlsPaths {
    /// Paths for files living in the default configuration directory
    pub fn in_config_dir(cert: &str, key: &str, ca: &str) -> Self {
        let dir = default_config_dir();
        Self {
            cert: dir.join(cert),
            key: dir.join(key),
            ca: dir.join(ca),
        }
    }

    /// Replace any path given on the command line
    pub fn override_with(
        &mut self,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
        ca: Option<PathBuf>,
    ) {
        if let Some(cert) = cert {
            self.cert = cert;
        }
        if let Some(key) = key {
            self.key = key;
        }
        if let Some(ca) = ca {
            self.ca = ca;
        }
    }
}
