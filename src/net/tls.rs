//! TLS termination.
//!
//! # Responsibilities
//! - Load PEM certificates and private keys from the transport config
//! - Assemble the rustls server config with the requested version bounds
//! - Advertise `h2` and `http/1.1` over ALPN
//!
//! # Design Decisions
//! - rustls only; no OpenSSL dependency
//! - ALPN assists protocol selection but the preface sniff stays
//!   authoritative, so a mismatch cannot misroute a connection
//! - The default provider covers the mixed certificate algorithms the
//!   gateway must serve (RSA, ECDSA P-256/P-384, Ed25519)

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::rustls::{self, version};
use tokio_rustls::TlsAcceptor;

use crate::config::TransportConfig;

/// TLS protocol versions the transport accepts in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// Parse a version string such as `TLSv1.2` (case-insensitive).
    pub fn parse(raw: &str) -> Result<Self, TlsError> {
        match raw.to_uppercase().as_str() {
            "TLSV1.2" | "TLS1.2" => Ok(TlsVersion::Tls12),
            "TLSV1.3" | "TLS1.3" => Ok(TlsVersion::Tls13),
            "SSLV3" | "SSL3" | "TLSV1" | "TLS1" | "TLSV1.0" | "TLS1.0" | "TLSV1.1"
            | "TLS1.1" => Err(TlsError::UnsupportedVersion(raw.to_string())),
            _ => Err(TlsError::InvalidVersion(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TlsVersion::Tls12 => "TLSv1.2",
            TlsVersion::Tls13 => "TLSv1.3",
        }
    }
}

/// Error type for TLS setup.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("reading TLS material failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("TLS material is incomplete; both key and cert are required")]
    IncompleteMaterial,

    #[error("unknown TLS version '{0}'")]
    InvalidVersion(String),

    #[error("TLS version '{0}' is below the supported floor (TLSv1.2)")]
    UnsupportedVersion(String),

    #[error("TLS version bounds select no protocol version")]
    EmptyVersionRange,

    #[error("TLS configuration rejected: {0}")]
    Rejected(#[from] rustls::Error),
}

/// Build the rustls acceptor from the transport config.
pub(crate) fn build_acceptor(config: &TransportConfig) -> Result<TlsAcceptor, TlsError> {
    let (key_path, cert_path) = match (&config.key, &config.cert) {
        (Some(key), Some(cert)) => (key, cert),
        _ => return Err(TlsError::IncompleteMaterial),
    };

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;
    let versions = protocol_versions(config)?;

    let mut server = rustls::ServerConfig::builder_with_protocol_versions(&versions)
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    server.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::info!(
        cert = %cert_path.display(),
        versions = versions.len(),
        "TLS acceptor assembled"
    );

    Ok(TlsAcceptor::from(Arc::new(server)))
}

fn load_certs(path: &Path) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader).collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<rustls::pki_types::PrivateKeyDer<'static>, TlsError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Select the protocol versions inside the configured bounds.
fn protocol_versions(
    config: &TransportConfig,
) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, TlsError> {
    let min = config
        .min_version
        .as_deref()
        .map(TlsVersion::parse)
        .transpose()?
        .unwrap_or(TlsVersion::Tls12);
    let max = config
        .max_version
        .as_deref()
        .map(TlsVersion::parse)
        .transpose()?
        .unwrap_or(TlsVersion::Tls13);

    let all = [
        (TlsVersion::Tls12, &version::TLS12),
        (TlsVersion::Tls13, &version::TLS13),
    ];
    let versions: Vec<_> = all
        .into_iter()
        .filter(|(version, _)| *version >= min && *version <= max)
        .map(|(_, supported)| supported)
        .collect();

    if versions.is_empty() {
        return Err(TlsError::EmptyVersionRange);
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_versions() {
        assert_eq!(TlsVersion::parse("TLSv1.2").unwrap(), TlsVersion::Tls12);
        assert_eq!(TlsVersion::parse("tlsv1.3").unwrap(), TlsVersion::Tls13);
        assert_eq!(TlsVersion::parse("TLS1.2").unwrap(), TlsVersion::Tls12);
    }

    #[test]
    fn legacy_versions_are_rejected() {
        assert!(matches!(
            TlsVersion::parse("TLSv1.1"),
            Err(TlsError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            TlsVersion::parse("SSLv3"),
            Err(TlsError::UnsupportedVersion(_))
        ));
        assert!(matches!(
            TlsVersion::parse("QUIC"),
            Err(TlsError::InvalidVersion(_))
        ));
    }

    #[test]
    fn version_bounds_narrow_the_selection() {
        let mut config = TransportConfig::default();
        config.min_version = Some("TLSv1.3".into());
        let versions = protocol_versions(&config).unwrap();
        assert_eq!(versions.len(), 1);

        let mut config = TransportConfig::default();
        config.max_version = Some("TLSv1.2".into());
        let versions = protocol_versions(&config).unwrap();
        assert_eq!(versions.len(), 1);

        let config = TransportConfig::default();
        assert_eq!(protocol_versions(&config).unwrap().len(), 2);
    }

    #[test]
    fn missing_material_is_incomplete() {
        let config = TransportConfig::default();
        assert!(matches!(
            build_acceptor(&config),
            Err(TlsError::IncompleteMaterial)
        ));
    }
}
