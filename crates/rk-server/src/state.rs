//! Shared server state

use std::sync::Arc;

use rk_core::ServerConfig;

use crate::connection::Registry;

/// State shared by the listener and every connection worker
pub struct ServerState {
    /// Configuration
    pub config: ServerConfig,
    /// Admitted participants
    pub registry: Arc<Registry>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(Registry::new()),
        }
    }
}
