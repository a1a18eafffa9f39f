//! rk-core: Configuration, trust material and identity for rk-chat
//!
//! Shared by the router and the client: TOML configuration, rustls setup for
//! mutual TLS, and the mapping from a verified certificate to a username.

pub mod config;
pub mod error;
pub mod identity;
pub mod tls;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{BackoffConfig, ClientConfig, ServerConfig, TlsPaths};
pub use error::{ConfigError, IdentityError, TlsError};
pub use identity::{common_name, common_name_of_pem, CommonNameIdentity, IdentityProvider};
pub use tls::{client_tls_config, load_certs, load_private_key, load_root_store, server_tls_config};
