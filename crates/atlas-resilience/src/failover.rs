//! Primary/fallback service routing with per-service circuit breakers
//!
//! Services register a health check and an `is_primary` flag; each service
//! is guarded by its own [`CircuitBreaker`]. A periodic loop drives every
//! health check and records the outcome into the matching breaker, so that
//! failing health checks actively trip the circuit.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use async_trait::async_trait;
use atlas_common::{ComponentHealth, Error, HealthLevel, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Health probe result states for a registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Down,
}

/// Health record for a registered service, mutated only by the health loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub is_primary: bool,
    pub status: ServiceStatus,
    pub last_check: DateTime<Utc>,
    pub failure_count: u32,
    pub circuit_state: CircuitState,
}

/// Health check seam implemented by registered services
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Returns true when the service is healthy, false when degraded.
    /// An error marks the service down.
    async fn check(&self) -> Result<bool>;
}

/// Registered services, primary -> fallback routing, and the periodic
/// health loop feeding per-service circuit breakers
pub struct FailoverManager {
    health_check_interval: Duration,
    breaker_config: CircuitBreakerConfig,
    services: Arc<RwLock<HashMap<String, Arc<dyn HealthCheck>>>>,
    fallbacks: Arc<RwLock<HashMap<String, String>>>,
    health: Arc<RwLock<HashMap<String, ServiceHealth>>>,
    breakers: Arc<RwLock<HashMap<String, Arc<CircuitBreaker>>>>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FailoverManager {
    pub fn new(health_check_interval: Duration, breaker_config: CircuitBreakerConfig) -> Self {
        info!(
            "failover manager created (interval={}s)",
            health_check_interval.as_secs()
        );
        Self {
            health_check_interval,
            breaker_config,
            services: Arc::new(RwLock::new(HashMap::new())),
            fallbacks: Arc::new(RwLock::new(HashMap::new())),
            health: Arc::new(RwLock::new(HashMap::new())),
            breakers: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Register a service with its health check
    pub async fn register_service(
        &self,
        name: impl Into<String>,
        check: Arc<dyn HealthCheck>,
        is_primary: bool,
    ) {
        let name = name.into();
        self.services.write().await.insert(name.clone(), check);
        self.health.write().await.insert(
            name.clone(),
            ServiceHealth {
                name: name.clone(),
                is_primary,
                status: ServiceStatus::Healthy,
                last_check: Utc::now(),
                failure_count: 0,
                circuit_state: CircuitState::Closed,
            },
        );
        self.breakers.write().await.insert(
            name.clone(),
            Arc::new(CircuitBreaker::new(
                name.clone(),
                self.breaker_config.clone(),
            )),
        );
        info!("service registered: {} (primary={})", name, is_primary);
    }

    /// Register a fallback for a primary service
    pub async fn register_fallback(&self, primary: impl Into<String>, fallback: impl Into<String>) {
        let (primary, fallback) = (primary.into(), fallback.into());
        info!("fallback registered: {} -> {}", primary, fallback);
        self.fallbacks.write().await.insert(primary, fallback);
    }

    /// Run one health check for a single service and feed its breaker
    pub async fn check_service(&self, name: &str) -> Result<ServiceHealth> {
        let check = self
            .services
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("service not registered: {}", name)))?;
        let breaker = self
            .breakers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no breaker for service: {}", name)))?;

        let outcome = check.check().await;

        let mut health_map = self.health.write().await;
        let health = health_map
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("no health record for: {}", name)))?;

        match outcome {
            Ok(true) => {
                health.status = ServiceStatus::Healthy;
                health.failure_count = 0;
                breaker.record_success().await;
            }
            Ok(false) => {
                health.status = ServiceStatus::Degraded;
                health.failure_count += 1;
                breaker.record_failure().await;
            }
            Err(err) => {
                debug!("health check for '{}' failed: {}", name, err);
                health.status = ServiceStatus::Down;
                health.failure_count += 1;
                breaker.record_failure().await;
            }
        }

        health.last_check = Utc::now();
        health.circuit_state = breaker.state().await;
        Ok(health.clone())
    }

    /// Run health checks for every registered service
    pub async fn check_all_services(&self) -> HashMap<String, ServiceHealth> {
        let names: Vec<String> = self.services.read().await.keys().cloned().collect();
        for name in &names {
            if let Err(err) = self.check_service(name).await {
                warn!("health check pass skipped '{}': {}", name, err);
            }
        }
        self.health.read().await.clone()
    }

    /// Execute an operation through the named service's circuit breaker,
    /// rerouting through the registered fallback's breaker on failure.
    ///
    /// Fails with `Error::BothFailed` when primary and fallback both fail,
    /// or when the primary fails and no fallback is registered.
    pub async fn execute_with_failover<F, Fut, T>(&self, service: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let primary_breaker = self.breakers.read().await.get(service).cloned();

        let primary_err = match primary_breaker {
            Some(breaker) => match breaker.execute(&op).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            },
            None => match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            },
        };
        warn!("primary service '{}' failed: {}", service, primary_err);

        let fallback = self.fallbacks.read().await.get(service).cloned();
        let Some(fallback) = fallback else {
            return Err(Error::BothFailed(format!(
                "'{}' failed and no fallback is registered: {}",
                service, primary_err
            )));
        };

        let fallback_breaker = self.breakers.read().await.get(&fallback).cloned();
        let Some(breaker) = fallback_breaker else {
            return Err(Error::BothFailed(format!(
                "'{}' failed and fallback '{}' is not registered: {}",
                service, fallback, primary_err
            )));
        };

        match breaker.execute(&op).await {
            Ok(value) => Ok(value),
            Err(fallback_err) => {
                error!(
                    "fallback service '{}' also failed: {}",
                    fallback, fallback_err
                );
                Err(Error::BothFailed(format!(
                    "'{}' and '{}' both failed: {}; {}",
                    service, fallback, primary_err, fallback_err
                )))
            }
        }
    }

    /// Circuit breaker guarding the named service
    pub async fn breaker(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(service).cloned()
    }

    /// Current health of every registered service
    pub async fn service_status(&self) -> HashMap<String, ServiceHealth> {
        self.health.read().await.clone()
    }

    /// Health report for the failover layer: the worst registered
    /// service dictates the level
    pub async fn health(&self) -> ComponentHealth {
        let statuses = self.health.read().await;
        let down = statuses
            .values()
            .filter(|h| h.status == ServiceStatus::Down)
            .count();
        let degraded = statuses
            .values()
            .filter(|h| h.status == ServiceStatus::Degraded)
            .count();

        let (level, message) = if statuses.is_empty() {
            (HealthLevel::Unknown, "no services registered".to_string())
        } else if down > 0 {
            (HealthLevel::Critical, format!("{} services down", down))
        } else if degraded > 0 {
            (
                HealthLevel::Degraded,
                format!("{} services degraded", degraded),
            )
        } else {
            (HealthLevel::Healthy, "all services healthy".to_string())
        };

        ComponentHealth::new(level, message)
            .with_metric("registered_services", statuses.len() as f64)
            .with_metric("services_down", down as f64)
            .with_metric("services_degraded", degraded as f64)
    }

    /// Start the periodic health loop
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(manager.health_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so the loop
            // waits a full interval before the first pass.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !manager.running.load(Ordering::SeqCst) {
                            break;
                        }
                        manager.check_all_services().await;
                    }
                    _ = manager.stop.notified() => break,
                }
            }
            debug!("failover health loop exited");
        });

        *self.handle.lock().await = Some(handle);
        info!("failover manager started");
    }

    /// Stop the health loop, awaiting the currently-running iteration
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // notify_one stores a permit, so a signal sent while the loop is
        // mid-iteration is not lost
        self.stop.notify_one();
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!("failover health loop join error: {}", err);
                }
            }
        }
        info!("failover manager stopped");
    }
}
