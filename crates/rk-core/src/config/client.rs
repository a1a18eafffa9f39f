//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};
use super::TlsPaths;
use crate::error::ConfigError;

/// Configuration for the chat client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Router address, `host:port`
    pub server_address: String,

    /// Name the server certificate must be valid for
    pub server_name: String,

    /// Client certificate/key and the CA bundle the server must chain to
    pub tls: TlsPaths,

    /// Timeout for TCP connect plus TLS handshake
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Delay schedule between failed connection attempts
    pub backoff: BackoffConfig,

    /// Give up after this many failed attempts; 0 retries forever
    pub max_connect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "localhost:1234".to_string(),
            server_name: "localhost".to_string(),
            tls: TlsPaths::in_config_dir("client.pem", "client.key", "server.pem"),
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            max_connect_attempts: 5,
        }
    }
}

impl ClientConfig {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_address.trim().is_empty() {
            return Err(ConfigError::Invalid("server_address is empty".to_string()));
        }
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::Invalid("server_name is empty".to_string()));
        }
        self.backoff.validate()
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Upper bound on any delay
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "backoff.multiplier must be >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(
                "backoff.jitter must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.initial > self.max {
            return Err(ConfigError::Invalid(
                "backoff.initial exceeds backoff.max".to_string(),
            ));
        }
        Ok(())
    }
}
