//! Reference payloads for the check routes.

use hyper::body::Bytes;
use serde_json::Value;

use crate::config::FixtureConfig;

/// Immutable payloads the check routes compare against.
///
/// Built once at startup and shared behind an `Arc`; cloning the `Bytes`
/// fields is a reference-count bump.
#[derive(Debug, Clone)]
pub struct Fixtures {
    pattern: Bytes,
    string: Bytes,
    json: Value,
    json_bytes: Bytes,
}

impl Fixtures {
    pub fn from_config(config: &FixtureConfig) -> Self {
        let pattern: Vec<u8> = config
            .pattern
            .as_bytes()
            .iter()
            .copied()
            .cycle()
            .take(config.pattern_size)
            .collect();
        let string = config.pattern.repeat(config.string_repeat);
        let json_bytes = Bytes::from(config.json.to_string());

        Self {
            pattern: Bytes::from(pattern),
            string: Bytes::from(string),
            json: config.json.clone(),
            json_bytes,
        }
    }

    /// Binary fixture: the pattern repeated up to the configured size.
    pub fn pattern(&self) -> &Bytes {
        &self.pattern
    }

    /// Text fixture: the pattern repeated a fixed number of times.
    pub fn string(&self) -> &Bytes {
        &self.string
    }

    /// Canonical JSON document.
    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Canonical JSON document, serialized.
    pub fn json_bytes(&self) -> &Bytes {
        &self.json_bytes
    }
}

impl Default for Fixtures {
    fn default() -> Self {
        Self::from_config(&FixtureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fixtures() {
        let fixtures = Fixtures::default();
        assert_eq!(fixtures.pattern().len(), 2_000_000);
        assert!(fixtures.pattern().starts_with(b"This is a pattern!This is"));
        // 2_000_000 is not a multiple of 18, so the last copy is cut short.
        assert_eq!(&fixtures.pattern()[1_999_998..], b"Th");
        assert_eq!(fixtures.string().len(), 18 * 100_000);
        assert_eq!(fixtures.json()["address"]["zip"], 12345);
    }

    #[test]
    fn serialized_json_parses_back() {
        let fixtures = Fixtures::default();
        let parsed: Value = serde_json::from_slice(fixtures.json_bytes()).unwrap();
        assert_eq!(&parsed, fixtures.json());
    }

    #[test]
    fn custom_sizes() {
        let config = FixtureConfig {
            pattern: "ab".into(),
            pattern_size: 5,
            string_repeat: 3,
            ..FixtureConfig::default()
        };
        let fixtures = Fixtures::from_config(&config);
        assert_eq!(fixtures.pattern(), "ababa");
        assert_eq!(fixtures.string(), "ababab");
    }
}
