//! Configuration schema definitions.
//!
//! This module defines the bootstrap configuration for the server. All
//! types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Transport options (bind address, TLS material, keep-alive).
    pub server: TransportConfig,

    /// Route table options consumed by the router.
    pub router: RouterConfig,

    /// Logging sink options.
    pub log: LogConfig,
}

/// Transport configuration.
///
/// Presence of `key`/`cert` (or `pfx`) switches the gateway to TLS mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bind address (e.g. "0.0.0.0:8080"). `listen(Some(port))` overrides
    /// the port part.
    pub bind_address: String,

    /// Path to the PEM private key.
    pub key: Option<PathBuf>,

    /// Path to the PEM certificate chain.
    pub cert: Option<PathBuf>,

    /// Path to a PKCS#12 bundle. Accepted by the schema for compatibility;
    /// validation rejects it (the rustls backend consumes PEM only).
    pub pfx: Option<PathBuf>,

    /// Minimum TLS protocol version, e.g. "TLSv1.2".
    pub min_version: Option<String>,

    /// Maximum TLS protocol version, e.g. "TLSv1.3".
    pub max_version: Option<String>,

    /// HTTP/1.1 keep-alive timeout, surfaced to clients via the
    /// `Keep-Alive: timeout=<secs>` response header.
    pub keep_alive_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            key: None,
            cert: None,
            pfx: None,
            min_version: None,
            max_version: None,
            keep_alive_timeout_ms: 5_000,
        }
    }
}

impl TransportConfig {
    /// Whether any TLS material is configured.
    pub fn tls_enabled(&self) -> bool {
        self.key.is_some() || self.cert.is_some() || self.pfx.is_some()
    }
}

/// Router configuration.
///
/// Routes bind a name to a criteria string (the request pathname with
/// trailing slashes stripped). Dispatchers are code and are attached to
/// named routes through [`RouteTable`](crate::routing::RouteTable).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Route name → criteria string.
    pub routes: BTreeMap<String, String>,

    /// Separator characters used when splitting criteria into segments.
    /// Passed through to the router unchanged.
    pub seperators: Option<String>,
}

/// Logging sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// Suppress all log output.
    pub mute: bool,

    /// Optional filter directive (EnvFilter syntax). Falls back to the
    /// `RUST_LOG` environment variable, then to "switchboard=info".
    pub filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_cleartext() {
        let config = ServerConfig::default();
        assert!(!config.server.tls_enabled());
        assert_eq!(config.server.keep_alive_timeout_ms, 5_000);
        assert!(config.router.routes.is_empty());
        assert!(!config.log.mute);
    }

    #[test]
    fn tls_enabled_with_any_material() {
        let mut config = TransportConfig::default();
        config.pfx = Some("bundle.p12".into());
        assert!(config.tls_enabled());

        let mut config = TransportConfig::default();
        config.key = Some("key.pem".into());
        config.cert = Some("cert.pem".into());
        assert!(config.tls_enabled());
    }
}
