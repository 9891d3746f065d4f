// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Root CA and on-demand leaf certificates
//!
//! The proxy owns a root CA generated once and persisted as PEM under its
//! configuration directory. Per-host leaf certificates are minted on demand,
//! signed by that CA, and cached as ready-to-use rustls server configs. The
//! operator installs the CA certificate in the client's trust store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose,
};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tracing::{debug, info};

use crate::error::{Error, Result};

const CA_CERT_FILE: &str = "remora-ca.pem";
const CA_KEY_FILE: &str = "remora-ca-key.pem";
const CA_COMMON_NAME: &str = "Remora Proxy CA";

/// The proxy's certificate authority
pub struct CertificateAuthority {
    ca_cert: Certificate,
    ca_key: KeyPair,
    ca_pem: String,
    cache: DashMap<String, Arc<ServerConfig>>,
    dir: PathBuf,
}

impl CertificateAuthority {
    /// Load the CA from `dir`, generating and persisting a fresh one when
    /// no usable material is on disk
    pub fn load_or_create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let cert_path = dir.join(CA_CERT_FILE);
        let key_path = dir.join(CA_KEY_FILE);

        if cert_path.exists() && key_path.exists() {
            let cert_pem = fs::read_to_string(&cert_path)?;
            let key_pem = fs::read_to_string(&key_path)?;
            match Self::from_pem(&cert_pem, &key_pem, &dir) {
                Ok(ca) => {
                    debug!("Loaded proxy CA from {}", cert_path.display());
                    return Ok(ca);
                }
                Err(e) => {
                    info!("Stored CA unusable ({e}), generating a new one");
                }
            }
        }

        let ca = Self::generate(&dir)?;
        fs::create_dir_all(&dir)?;
        fs::write(&cert_path, &ca.ca_pem)?;
        fs::write(&key_path, ca.ca_key.serialize_pem())?;
        info!("Generated proxy CA at {}", cert_path.display());
        Ok(ca)
    }

    /// Rebuild the CA from persisted PEM material
    fn from_pem(cert_pem: &str, key_pem: &str, dir: &Path) -> Result<Self> {
        let ca_key = KeyPair::from_pem(key_pem).map_err(|e| Error::tls(format!("CA key: {e}")))?;
        let params = CertificateParams::from_ca_cert_pem(cert_pem)
            .map_err(|e| Error::tls(format!("CA certificate: {e}")))?;
        let ca_cert = params
            .self_signed(&ca_key)
            .map_err(|e| Error::tls(format!("CA rebuild: {e}")))?;
        Ok(Self {
            ca_pem: ca_cert.pem(),
            ca_cert,
            ca_key,
            cache: DashMap::new(),
            dir: dir.to_path_buf(),
        })
    }

    /// Generate a fresh root CA
    fn generate(dir: &Path) -> Result<Self> {
        let mut params = CertificateParams::default();
        params
            .distinguished_name
            .push(DnType::CommonName, CA_COMMON_NAME);
        params
            .distinguished_name
            .push(DnType::OrganizationName, "Remora");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];

        let ca_key = KeyPair::generate().map_err(|e| Error::tls(format!("CA keygen: {e}")))?;
        let ca_cert = params
            .self_signed(&ca_key)
            .map_err(|e| Error::tls(format!("CA generation: {e}")))?;

        Ok(Self {
            ca_pem: ca_cert.pem(),
            ca_cert,
            ca_key,
            cache: DashMap::new(),
            dir: dir.to_path_buf(),
        })
    }

    /// The CA certificate as PEM, served to clients for installation
    pub fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    /// Directory holding the persisted CA material
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// TLS server config presenting a leaf certificate for `host`.
    ///
    /// Leaves are cached; generation happens once per host per process.
    pub fn server_config_for(&self, host: &str) -> Result<Arc<ServerConfig>> {
        let host = host.to_lowercase();
        if let Some(cached) = self.cache.get(&host) {
            return Ok(cached.clone());
        }

        let mut params = CertificateParams::new(vec![host.clone()])
            .map_err(|e| Error::tls(format!("leaf params for {host}: {e}")))?;
        params.distinguished_name.push(DnType::CommonName, &host);

        let leaf_key = KeyPair::generate().map_err(|e| Error::tls(format!("leaf keygen: {e}")))?;
        let leaf = params
            .signed_by(&leaf_key, &self.ca_cert, &self.ca_key)
            .map_err(|e| Error::tls(format!("leaf signing for {host}: {e}")))?;

        let key: PrivateKeyDer<'static> =
            PrivatePkcs8KeyDer::from(leaf_key.serialize_der()).into();
        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![leaf.der().clone()], key)
            .map_err(|e| Error::tls(format!("server config for {host}: {e}")))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        let config = Arc::new(config);
        self.cache.insert(host.clone(), config.clone());
        debug!("Minted leaf certificate for {host}");
        Ok(config)
    }

    /// Number of cached leaf configs
    pub fn cached_leaves(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_and_reload() {
        let dir = tempdir().unwrap();

        let first = CertificateAuthority::load_or_create(dir.path()).unwrap();
        assert!(first.ca_pem().contains("BEGIN CERTIFICATE"));
        assert!(dir.path().join(CA_CERT_FILE).exists());
        assert!(dir.path().join(CA_KEY_FILE).exists());

        let second = CertificateAuthority::load_or_create(dir.path()).unwrap();
        // Same key material is reused across restarts
        assert_eq!(
            second.ca_key.serialize_pem(),
            first.ca_key.serialize_pem()
        );
    }

    #[test]
    fn test_leaf_cached_per_host() {
        let dir = tempdir().unwrap();
        let ca = CertificateAuthority::load_or_create(dir.path()).unwrap();

        let a = ca.server_config_for("example.com").unwrap();
        let b = ca.server_config_for("EXAMPLE.com").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(ca.cached_leaves(), 1);

        ca.server_config_for("other.net").unwrap();
        assert_eq!(ca.cached_leaves(), 2);
    }

    #[test]
    fn test_corrupt_ca_regenerated() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join(CA_CERT_FILE), "garbage").unwrap();
        std::fs::write(dir.path().join(CA_KEY_FILE), "garbage").unwrap();

        let ca = CertificateAuthority::load_or_create(dir.path()).unwrap();
        assert!(ca.ca_pem().contains("BEGIN CERTIFICATE"));
    }
}
