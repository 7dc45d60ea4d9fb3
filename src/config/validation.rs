//! Configuration validation logic.

use crate::config::schema::ServerConfig;
use crate::net::tls::TlsVersion;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ServerConfig for semantic correctness.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. TLS material must be complete: a key needs a cert and vice versa.
    let transport = &config.server;
    if transport.key.is_some() != transport.cert.is_some() {
        errors.push(ValidationError(
            "server.key and server.cert must be configured together".to_string(),
        ));
    }

    // 2. PKCS#12 bundles are not consumable by the rustls backend.
    if transport.pfx.is_some() {
        errors.push(ValidationError(
            "server.pfx is not supported; provide server.key and server.cert as PEM".to_string(),
        ));
    }

    // 3. Version bounds must parse and be ordered.
    let min = parse_version_field(&transport.min_version, "server.min_version", &mut errors);
    let max = parse_version_field(&transport.max_version, "server.max_version", &mut errors);
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            errors.push(ValidationError(format!(
                "server.min_version {} is above server.max_version {}",
                min.as_str(),
                max.as_str()
            )));
        }
    }

    // 4. Route criteria must be absolute paths.
    for (name, criteria) in &config.router.routes {
        if !criteria.starts_with('/') {
            errors.push(ValidationError(format!(
                "router.routes.{} criteria '{}' must start with '/'",
                name, criteria
            )));
        }
    }

    if config.server.keep_alive_timeout_ms == 0 {
        tracing::warn!("server.keep_alive_timeout_ms is 0, keep-alive connections close immediately");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_version_field(
    field: &Option<String>,
    name: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<TlsVersion> {
    let raw = field.as_deref()?;
    match TlsVersion::parse(raw) {
        Ok(version) => Some(version),
        Err(e) => {
            errors.push(ValidationError(format!("{}: {}", name, e)));
            None
        }
    }
}
