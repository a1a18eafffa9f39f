//! Participant identity derived from verified peer certificates

use std::path::Path;

use rk_protocol::PUBLIC_ROOM;
use rustls::pki_types::CertificateDer;
use x509_parser::prelude::*;

use crate::error::IdentityError;
use crate::tls::load_certs;

/// Produces the participant name bound to an authenticated connection
pub trait IdentityProvider: Send + Sync {
    /// `peer_certs` is the verified chain, end-entity first, or `None` when
    /// the peer presented nothing.
    fn derive_identity(
        &self,
        peer_certs: Option<&[CertificateDer<'_>]>,
    ) -> Result<String, IdentityError>;
}

/// Uses the subject commonName of the end-entity certificate
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonNameIdentity;

impl IdentityProvider for CommonNameIdentity {
    fn derive_identity(
        &self,
        peer_certs: Option<&[CertificateDer<'_>]>,
    ) -> Result<String, IdentityError> {
        let leaf = peer_certs
            .and_then(|chain| chain.first())
            .ok_or(IdentityError::MissingIdentity)?;
        common_name(leaf.as_ref())
    }
}

/// Subject commonName of a DER certificate
pub fn common_name(der: &[u8]) -> Result<String, IdentityError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| IdentityError::InvalidCertificate(e.to_string()))?;

    let name = cert
        .subject()
        .iter_common_name()
        .next()
        .ok_or(IdentityError::MissingIdentity)?
        .as_str()
        .map_err(|e| IdentityError::InvalidCertificate(e.to_string()))?
        .trim();

    if name.is_empty() {
        return Err(IdentityError::MissingIdentity);
    }
    // "public" names the broadcast room and cannot be a direct recipient
    if name == PUBLIC_ROOM {
        return Err(IdentityError::ReservedName(name.to_string()));
    }
    Ok(name.to_string())
}

/// Username carried by the first certificate in a PEM file
pub fn common_name_of_pem(path: &Path) -> Result<String, IdentityError> {
    let certs = load_certs(path)?;
    let leaf = certs.first().ok_or(IdentityError::MissingIdentity)?;
    common_name(leaf.as_ref())
}
