//! Breaker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker configuration.
///
/// Immutable for the breaker's lifetime. The trip predicate and the
/// state-change observer are code, not data, and are supplied through
/// [`BreakerBuilder`](crate::BreakerBuilder) instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Diagnostic label carried on logs and observer callbacks
    pub name: String,

    /// Probes admitted while half-open; zero means unlimited probing,
    /// in which case a single successful probe closes the circuit
    pub max_half_open_requests: u32,

    /// How often counters reset while closed (in seconds); zero means never
    #[serde(with = "duration_secs")]
    pub closed_reset_interval: Duration,

    /// How long the circuit stays open before probing (in seconds)
    #[serde(with = "duration_secs")]
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "breakwater".to_string(),
            max_half_open_requests: 1,
            closed_reset_interval: Duration::ZERO,
            open_timeout: Duration::from_secs(30),
        }
    }
}

impl BreakerConfig {
    /// Create a config with the given diagnostic name and defaults otherwise.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BreakerConfig::default();
        assert_eq!(config.max_half_open_requests, 1);
        assert_eq!(config.closed_reset_interval, Duration::ZERO);
        assert_eq!(config.open_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let config = BreakerConfig {
            name: "api".to_string(),
            max_half_open_requests: 5,
            closed_reset_interval: Duration::from_secs(60),
            open_timeout: Duration::from_secs(30),
        };

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["closed_reset_interval"], 60);
        assert_eq!(json["open_timeout"], 30);

        let back: BreakerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.closed_reset_interval, Duration::from_secs(60));
        assert_eq!(back.name, "api");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: BreakerConfig = serde_json::from_str(r#"{"name": "api"}"#).unwrap();
        assert_eq!(config.name, "api");
        assert_eq!(config.open_timeout, Duration::from_secs(30));
    }
}
