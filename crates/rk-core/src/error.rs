//! Core error types for rk-chat

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors loading certificates and keys or building TLS configs
#[derive(Error, Debug)]
pub enum TlsError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PEM file held no certificates
    #[error("No certificates found in {0}")]
    NoCertificates(PathBuf),

    /// PEM file held no private key
    #[error("No private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// Client certificate verifier could not be built
    #[error("Invalid trust store: {0}")]
    Verifier(String),

    /// rustls rejected the material
    #[error("rustls: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Errors deriving a participant name from a certificate
#[derive(Error, Debug)]
pub enum IdentityError {
    /// No certificate, or no usable commonName in it
    #[error("Peer presented no verifiable identity")]
    MissingIdentity,

    /// Name collides with a room name
    #[error("Reserved name cannot identify a participant: {0}")]
    ReservedName(String),

    /// Certificate bytes could not be parsed
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Certificate file could not be loaded
    #[error(transparent)]
    Tls(#[from] TlsError),
}
