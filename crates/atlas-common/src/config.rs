//! Configuration management for the ATLAS agent core

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resilience: ResilienceConfig,
    pub core: CoreConfig,
}

/// Resilience fabric configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerSettings,
    pub offline: OfflineSettings,
    pub inference: InferenceSettings,
    pub persistence: PersistenceSettings,
    pub endpoints: EndpointSettings,
}

/// Circuit breaker defaults applied to every registered service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that trip Closed -> Open
    pub failure_threshold: u32,
    /// Seconds before an Open circuit allows a half-open probe
    pub recovery_timeout_secs: u64,
    /// Probe budget while half-open
    pub half_open_max_calls: u32,
}

/// Offline manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineSettings {
    /// Seconds between periodic health loops
    pub health_check_interval_secs: u64,
    /// Sync queue cap; the oldest item is evicted on overflow
    pub max_queue_size: usize,
    /// Per-pass drain size for pending sync items
    pub sync_batch_size: usize,
}

/// Local inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Provider: "ollama", "rule_based", or "cached"
    pub provider: String,
    /// Base URL for the remote-local endpoint
    pub ollama_url: String,
    /// Model identifier passed to the remote-local endpoint
    pub model: String,
}

/// State persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// Filesystem path for the embedded store
    pub db_path: String,
    /// Per-state-type snapshot retention
    pub max_snapshots: u32,
}

/// Backing-service endpoints probed by the offline manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub redis_url: String,
    pub database_url: String,
    pub qdrant_host: String,
    pub qdrant_port: u16,
}

/// Unified core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Consciousness level: "low", "medium", or "high"
    pub consciousness_level: String,
    /// Reasoning chain depth budget
    pub reasoning_depth: usize,
    /// Seconds between scheduled reflections
    pub reflection_interval_secs: u64,
    /// Persona consistency target in [0, 1]
    pub persona_consistency: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resilience: ResilienceConfig::default(),
            core: CoreConfig::default(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerSettings::default(),
            offline: OfflineSettings::default(),
            inference: InferenceSettings::default(),
            persistence: PersistenceSettings::default(),
            endpoints: EndpointSettings::default(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_secs: 60,
            half_open_max_calls: 3,
        }
    }
}

impl Default for OfflineSettings {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 30,
            max_queue_size: 1000,
            sync_batch_size: 10,
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            provider: "rule_based".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            db_path: "./data/atlas_state.db".to_string(),
            max_snapshots: 10,
        }
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            database_url: "postgres://localhost:5432/atlas".to_string(),
            qdrant_host: "localhost".to_string(),
            qdrant_port: 6333,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            consciousness_level: "medium".to_string(),
            reasoning_depth: 10,
            reflection_interval_secs: 3600,
            persona_consistency: 0.8,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Configuration(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Configuration(format!("failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.resilience.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.resilience.circuit_breaker.half_open_max_calls, 3);
        assert_eq!(config.resilience.offline.max_queue_size, 1000);
        assert_eq!(config.resilience.offline.sync_batch_size, 10);
        assert_eq!(config.resilience.inference.provider, "rule_based");
        assert_eq!(config.core.reasoning_depth, 10);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [resilience.offline]
            max_queue_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(parsed.resilience.offline.max_queue_size, 50);
        assert_eq!(parsed.resilience.offline.sync_batch_size, 10);
        assert_eq!(parsed.resilience.circuit_breaker.failure_threshold, 3);
    }
}
