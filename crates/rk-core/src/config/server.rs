//! Server configuration

use serde::{Deserialize, Serialize};

use super::TlsPaths;
use crate::error::ConfigError;

/// Configuration for the chat router
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TLS listener binds to
    pub bind_address: String,

    /// Server certificate/key and the CA bundle client certificates must chain to
    pub tls: TlsPaths,

    /// Packets buffered per connection before routing calls wait on that peer
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1234".to_string(),
            tls: TlsPaths::in_config_dir("server.pem", "server.key", "clients.pem"),
            outbound_queue: 256,
        }
    }
}

impl ServerConfig {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_address is empty".to_string()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(r#"bind_address = "0.0.0.0:9000""#).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.outbound_queue, 256);
        assert!(config.tls.ca.ends_with("clients.pem"));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let config = ServerConfig {
            outbound_queue: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(ServerConfig::default().validate().is_ok());
    }
}
