//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the fault-injection server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FaultConfig {
    /// Listener configuration (host, port, connection limits).
    pub listener: ListenerConfig,

    /// Timings and sizes used by the scripted behaviors.
    pub behaviors: BehaviorConfig,

    /// Reference payloads for the check routes.
    pub fixtures: FixtureConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host to bind: IPv4 address, hostname or FQDN.
    pub host: String,

    /// Port to bind (0 asks the OS for an ephemeral port).
    ///
    /// Kept signed and wide so out-of-range values reach validation
    /// instead of failing inside the TOML parser.
    pub port: i64,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// How long `stop()` waits for open connections before aborting them.
    pub drain_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 1024,
            drain_timeout_secs: 5,
        }
    }
}

/// Behavior tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Delay before `/silenttimeout` drops the connection.
    pub silent_timeout_ms: u64,

    /// Period between lines written by the noisy behaviors.
    pub noisy_interval_ms: u64,

    /// How long the noisy behaviors keep writing before their last chunk.
    pub noisy_duration_ms: u64,

    /// Deadline after which `/noisytimeout` drops the connection if still open.
    pub noisy_timeout_ms: u64,

    /// Total size of `/bigrandomfile` in bytes.
    pub big_file_size: u64,

    /// Largest chunk handed to the transport in a single write.
    pub chunk_size: usize,

    /// Number of chunks the response channel holds before reporting backpressure.
    pub buffered_chunks: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            silent_timeout_ms: 1_000,
            noisy_interval_ms: 10,
            noisy_duration_ms: 100,
            noisy_timeout_ms: 1_000,
            big_file_size: 500 * 1024 * 1024,
            chunk_size: 64 * 1024,
            buffered_chunks: 4,
        }
    }
}

/// Fixture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// String repeated to build both the binary and text fixtures.
    pub pattern: String,

    /// Size of the binary fixture in bytes.
    pub pattern_size: usize,

    /// Number of repetitions forming the text fixture.
    pub string_repeat: usize,

    /// Canonical JSON document for `/checkjson`.
    pub json: serde_json::Value,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            pattern: "This is a pattern!".to_string(),
            pattern_size: 2_000_000,
            string_repeat: 100_000,
            json: serde_json::json!({
                "firstName": "John",
                "lastName": "Doe",
                "age": 25,
                "isActive": true,
                "address": {
                    "street": "Somewhere",
                    "city": "Anytown",
                    "state": "CA",
                    "zip": 12345
                }
            }),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: FaultConfig = toml::from_str(
            r#"
            [listener]
            port = 0

            [behaviors]
            noisy_interval_ms = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 0);
        assert_eq!(config.listener.host, "127.0.0.1");
        assert_eq!(config.behaviors.noisy_interval_ms, 5);
        assert_eq!(config.behaviors.noisy_duration_ms, 100);
        assert_eq!(config.fixtures.pattern_size, 2_000_000);
        assert_eq!(config.observability.log_format, LogFormat::Text);
    }

    #[test]
    fn json_fixture_from_inline_table() {
        let config: FaultConfig = toml::from_str(
            r#"
            [fixtures]
            json = { name = "x", count = 3 }
            "#,
        )
        .unwrap();

        assert_eq!(config.fixtures.json, serde_json::json!({"name": "x", "count": 3}));
    }
}
