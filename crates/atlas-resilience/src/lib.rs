//! Resilience fabric for the ATLAS agent core
//!
//! Keeps the agent operational when backing services (key-value store,
//! relational store, vector store, cloud inference endpoint) degrade or
//! disappear: connection health monitoring, a write-behind sync queue,
//! per-service circuit breakers with failover routing, local inference
//! fallbacks, durable state snapshots with recovery points, and an
//! emergency-aware autonomous decision layer.

pub mod circuit_breaker;
pub mod failover;
pub mod fallback;
pub mod inference;
pub mod offline;
pub mod persistence;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use failover::{FailoverManager, HealthCheck, ServiceHealth, ServiceStatus};
pub use fallback::{AutonomousFallback, EmergencyLevel, FallbackResponse, FallbackSource};
pub use inference::{FallbackAction, InferenceProvider, LocalInference, RiskLevel};
pub use offline::{
    standard_probes, ConnectionStatus, NullDispatcher, OfflineManager, PostgresProbe, QdrantProbe,
    RedisProbe, ServiceProbe, SyncDispatcher, SyncItem, SyncOperation,
};
pub use persistence::{RecoveryPoint, StatePersistence, StateSnapshot};
