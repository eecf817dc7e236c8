//! Error types and result handling for the ATLAS agent core

use thiserror::Error;

/// Result type alias for ATLAS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ATLAS agent core operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    #[error("Half-open probe budget exhausted: {0}")]
    HalfOpenExhausted(String),

    #[error("Primary and fallback both failed: {0}")]
    BothFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Timeout(_) | Error::Queue(_)
        )
    }

    /// Check if the error was produced by a circuit breaker rather than
    /// the guarded operation itself
    pub fn is_circuit_rejection(&self) -> bool {
        matches!(self, Error::CircuitOpen(_) | Error::HalfOpenExhausted(_))
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Network(_) => "network",
            Error::Inference(_) => "inference",
            Error::Persistence(_) => "persistence",
            Error::Queue(_) => "queue",
            Error::CircuitOpen(_) => "circuit_open",
            Error::HalfOpenExhausted(_) => "half_open_exhausted",
            Error::BothFailed(_) => "both_failed",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation",
            Error::Timeout(_) => "timeout",
            Error::Serialization(_) => "serialization",
            Error::Generic(_) => "generic",
        }
    }
}
