//! Circuit breaker implementation for resilient service calls

use atlas_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Circuit is half-open, a bounded number of probes test recovery
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip Closed -> Open
    pub failure_threshold: u32,
    /// Time an Open circuit waits before allowing half-open probes
    pub recovery_timeout: Duration,
    /// Probe budget while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_calls: u32,
}

/// Three-state gate protecting a call against a failing dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_calls: 0,
            }),
        }
    }

    /// Current state. An Open circuit whose recovery timeout has elapsed
    /// transitions to HalfOpen on observation.
    pub async fn state(&self) -> CircuitState {
        let mut state = self.state.write().await;
        self.apply_recovery_transition(&mut state);
        state.state
    }

    /// Execute an operation under circuit breaker protection.
    ///
    /// An Open circuit rejects with `Error::CircuitOpen` without invoking
    /// the operation; a HalfOpen circuit admits at most
    /// `half_open_max_calls` probes and rejects the rest with
    /// `Error::HalfOpenExhausted`. The operation's own error is recorded
    /// and re-raised.
    pub async fn execute<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit().await?;

        match op().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await;
                Err(err)
            }
        }
    }

    // Admission check and probe accounting under a single lock so that
    // concurrent callers observe serialized transitions.
    async fn admit(&self) -> Result<()> {
        let mut state = self.state.write().await;
        self.apply_recovery_transition(&mut state);

        match state.state {
            CircuitState::Open => Err(Error::CircuitOpen(format!(
                "circuit '{}' is open",
                self.name
            ))),
            CircuitState::HalfOpen => {
                if state.half_open_calls >= self.config.half_open_max_calls {
                    return Err(Error::HalfOpenExhausted(format!(
                        "circuit '{}' half-open probe budget exhausted",
                        self.name
                    )));
                }
                state.half_open_calls += 1;
                Ok(())
            }
            CircuitState::Closed => Ok(()),
        }
    }

    fn apply_recovery_transition(&self, state: &mut BreakerState) {
        if state.state != CircuitState::Open {
            return;
        }
        let elapsed = state
            .last_failure
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO);
        if elapsed >= self.config.recovery_timeout {
            state.state = CircuitState::HalfOpen;
            state.half_open_calls = 0;
            info!("circuit '{}' transitioned to half-open", self.name);
        }
    }

    /// Record a successful call. Closes the circuit and resets counters.
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if state.state != CircuitState::Closed {
            info!("circuit '{}' closed after success", self.name);
        }
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.half_open_calls = 0;
    }

    /// Record a failed call. Trips the circuit at the failure threshold;
    /// any half-open failure reopens it immediately.
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());

        if state.failure_count >= self.config.failure_threshold {
            if state.state != CircuitState::Open {
                warn!(
                    "circuit '{}' opened after {} consecutive failures",
                    self.name, state.failure_count
                );
            }
            state.state = CircuitState::Open;
        } else if state.state == CircuitState::HalfOpen {
            warn!("circuit '{}' reopened from half-open", self.name);
            state.state = CircuitState::Open;
        }
    }

    /// Force the circuit back to Closed
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        state.state = CircuitState::Closed;
        state.failure_count = 0;
        state.half_open_calls = 0;
        info!("circuit '{}' reset", self.name);
    }

    /// Breaker name
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::sleep;

    fn test_config(threshold: u32, timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: Duration::from_millis(timeout_ms),
            half_open_max_calls: 3,
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", test_config(3, 10_000));
        assert_eq!(cb.state().await, CircuitState::Closed);

        for _ in 0..3 {
            let result: Result<()> = cb
                .execute(|| async { Err(Error::Network("boom".into())) })
                .await;
            assert!(result.is_err());
        }
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_calling() {
        let cb = CircuitBreaker::new("test", test_config(3, 10_000));
        for _ in 0..3 {
            let _: Result<()> = cb
                .execute(|| async { Err(Error::Network("boom".into())) })
                .await;
        }

        let calls = AtomicU32::new(0);
        let result: Result<()> = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_failure_trips_with_threshold_one() {
        let cb = CircuitBreaker::new("test", test_config(1, 10_000));
        let _: Result<()> = cb
            .execute(|| async { Err(Error::Network("boom".into())) })
            .await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn transitions_to_half_open_after_recovery_timeout() {
        let cb = CircuitBreaker::new("test", test_config(1, 40));
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_success_closes_and_resets() {
        let cb = CircuitBreaker::new("test", test_config(1, 40));
        cb.record_failure().await;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        let result: Result<i32> = cb.execute(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", test_config(2, 40));
        cb.record_failure().await;
        cb.record_failure().await;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        let _: Result<()> = cb
            .execute(|| async { Err(Error::Network("still down".into())) })
            .await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_probe_budget_is_bounded() {
        let cb = CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_millis(40),
                half_open_max_calls: 2,
            },
        );
        cb.record_failure().await;
        sleep(Duration::from_millis(50)).await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        // Exhaust the probe budget without concluding the probes
        for _ in 0..2 {
            assert!(cb.admit().await.is_ok());
        }
        let rejected = cb.admit().await;
        assert!(matches!(rejected, Err(Error::HalfOpenExhausted(_))));
    }

    #[tokio::test]
    async fn reset_forces_closed() {
        let cb = CircuitBreaker::new("test", test_config(1, 10_000));
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
