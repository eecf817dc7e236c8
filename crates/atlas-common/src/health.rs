//! Health reporting primitives shared by the resilience fabric

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health levels for components
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

impl HealthLevel {
    /// Get numeric value for comparison
    pub fn as_score(&self) -> u8 {
        match self {
            HealthLevel::Healthy => 100,
            HealthLevel::Degraded => 50,
            HealthLevel::Critical => 10,
            HealthLevel::Unknown => 0,
        }
    }
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthLevel,
    pub message: String,
    pub last_check: DateTime<Utc>,
    pub metrics: HashMap<String, f64>,
}

impl ComponentHealth {
    pub fn new(status: HealthLevel, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            last_check: Utc::now(),
            metrics: HashMap::new(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// Aggregated health status of the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub overall_health: HealthLevel,
    pub components: HashMap<String, ComponentHealth>,
    pub last_check: DateTime<Utc>,
}

impl HealthStatus {
    pub fn new(components: HashMap<String, ComponentHealth>) -> Self {
        let mut status = Self {
            overall_health: HealthLevel::Unknown,
            components,
            last_check: Utc::now(),
        };
        status.calculate_overall_health();
        status
    }

    /// Calculate overall health from component health
    pub fn calculate_overall_health(&mut self) {
        if self.components.is_empty() {
            self.overall_health = HealthLevel::Unknown;
            return;
        }

        let critical = self
            .components
            .values()
            .any(|c| c.status == HealthLevel::Critical);
        let degraded = self
            .components
            .values()
            .any(|c| c.status == HealthLevel::Degraded);

        self.overall_health = if critical {
            HealthLevel::Critical
        } else if degraded {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        };
    }
}
