//! Throwaway certificate authority for tests
//!
//! Every issued certificate is valid for `localhost` and usable for both
//! client and server authentication, so one CA bundle serves both ends.

use std::path::Path;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::CertificateDer;

use crate::config::TlsPaths;

/// A certificate and its key in PEM and DER form
pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: String,
    pub der: CertificateDer<'static>,
}

/// Self-signed CA able to issue leaf certificates
pub struct TestPki {
    ca_cert: Certificate,
    ca_key: KeyPair,
}

impl TestPki {
    pub fn generate() -> Self {
        let mut params = CertificateParams::new(Vec::<String>::new()).expect("ca params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::CrlSign,
        ];
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, "rk-chat test CA");

        let ca_key = KeyPair::generate().expect("ca key");
        let ca_cert = params.self_signed(&ca_key).expect("ca cert");
        Self { ca_cert, ca_key }
    }

    pub fn ca_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// Leaf certificate with the given subject commonName
    pub fn issue(&self, common_name: &str) -> IssuedCert {
        self.issue_with_subject(Some(common_name))
    }

    pub fn issue_without_common_name(&self) -> IssuedCert {
        self.issue_with_subject(None)
    }

    fn issue_with_subject(&self, common_name: Option<&str>) -> IssuedCert {
        let mut params =
            CertificateParams::new(vec!["localhost".to_string()]).expect("leaf params");
        params.distinguished_name = DistinguishedName::new();
        if let Some(name) = common_name {
            params.distinguished_name.push(DnType::CommonName, name);
        }
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let key = KeyPair::generate().expect("leaf key");
        let cert = params
            .signed_by(&key, &self.ca_cert, &self.ca_key)
            .expect("leaf cert");

        IssuedCert {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
            der: cert.der().clone(),
        }
    }

    /// Issue a certificate for `common_name` and write `<name>.pem`,
    /// `<name>.key` and `ca.pem` into `dir`
    pub fn write_identity(&self, dir: &Path, common_name: &str) -> TlsPaths {
        let issued = self.issue(common_name);
        let file_stem = common_name.trim().replace(' ', "_");
        let paths = TlsPaths {
            cert: dir.join(format!("{}.pem", file_stem)),
            key: dir.join(format!("{}.key", file_stem)),
            ca: dir.join("ca.pem"),
        };

        std::fs::write(&paths.cert, issued.cert_pem).expect("write cert");
        std::fs::write(&paths.key, issued.key_pem).expect("write key");
        std::fs::write(&paths.ca, self.ca_pem()).expect("write ca");
        paths
    }
}
