//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate listener host syntax and port range
//! - Validate value ranges (timings > 0, chunk sizes > 0)
//! - Validate fixture shapes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FaultConfig → Result<(), Vec<ValidationError>>
//! - Runs before any socket is touched

use std::net::Ipv4Addr;

use crate::config::schema::FaultConfig;

/// Longest hostname accepted, without a trailing dot.
const MAX_HOST_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// A single semantic violation in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid host {0:?}: expected an IPv4 address, hostname or FQDN")]
    InvalidHost(String),

    #[error("invalid port {0}: expected 0-65535")]
    InvalidPort(i64),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("noisy_duration_ms ({duration}) must not be shorter than noisy_interval_ms ({interval})")]
    NoisyDuration { duration: u64, interval: u64 },

    #[error("fixtures.pattern must not be empty")]
    EmptyPattern,

    #[error("fixtures.json must be a JSON object")]
    JsonNotObject,
}

/// Validate a full configuration, collecting every violation.
pub fn validate_config(config: &FaultConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_host(&config.listener.host) {
        errors.push(e);
    }
    if let Err(e) = validate_port(config.listener.port) {
        errors.push(e);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    let b = &config.behaviors;
    let non_zero = [
        ("behaviors.silent_timeout_ms", b.silent_timeout_ms),
        ("behaviors.noisy_interval_ms", b.noisy_interval_ms),
        ("behaviors.noisy_duration_ms", b.noisy_duration_ms),
        ("behaviors.noisy_timeout_ms", b.noisy_timeout_ms),
        ("behaviors.chunk_size", b.chunk_size as u64),
        ("behaviors.buffered_chunks", b.buffered_chunks as u64),
    ];
    for (name, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }
    if b.noisy_interval_ms > 0 && b.noisy_duration_ms < b.noisy_interval_ms {
        errors.push(ValidationError::NoisyDuration {
            duration: b.noisy_duration_ms,
            interval: b.noisy_interval_ms,
        });
    }

    let f = &config.fixtures;
    if f.pattern.is_empty() {
        errors.push(ValidationError::EmptyPattern);
    }
    if !f.json.is_object() {
        errors.push(ValidationError::JsonNotObject);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Accept dotted IPv4 addresses, hostnames and FQDNs (optionally dot-terminated).
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidHost(host.to_string());

    let name = host.strip_suffix('.').unwrap_or(host);
    if name.is_empty() || name.len() > MAX_HOST_LEN {
        return Err(invalid());
    }

    // All-numeric names are only valid as a real dotted quad.
    let numeric = name.chars().all(|c| c.is_ascii_digit() || c == '.');
    if numeric {
        return match name.parse::<Ipv4Addr>() {
            Ok(_) if name == host => Ok(()),
            _ => Err(invalid()),
        };
    }

    let label_ok = |label: &str| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    if name.split('.').all(label_ok) {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Ports must fit in 0..=65535; zero requests an ephemeral port.
pub fn validate_port(port: i64) -> Result<u16, ValidationError> {
    u16::try_from(port).map_err(|_| ValidationError::InvalidPort(port))
}
