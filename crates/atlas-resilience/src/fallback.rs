//! Autonomous fallback decisions under emergency protocols
//!
//! When the agent must answer without its cloud dependencies, decisions
//! run through three escalating strategies: programmed responses, the
//! local inference model, and a heuristic (risk, urgency) table. Every
//! returned action is post-filtered by the active emergency level, whose
//! allowed-action set shrinks strictly as severity rises.

use crate::inference::{FallbackAction, LocalInference, RiskLevel};
use crate::persistence::StatePersistence;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Ordered severity bands gating which actions may be emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmergencyLevel {
    Normal,
    Degraded,
    Emergency,
    Critical,
}

impl EmergencyLevel {
    /// Actions permitted at this level, least permissive first.
    /// Critical allows logging only.
    pub fn allowed_actions(&self) -> &'static [FallbackAction] {
        match self {
            EmergencyLevel::Normal => &[
                FallbackAction::Log,
                FallbackAction::Notify,
                FallbackAction::AutoFix,
                FallbackAction::Immediate,
            ],
            EmergencyLevel::Degraded => &[
                FallbackAction::Log,
                FallbackAction::Notify,
                FallbackAction::AutoFix,
            ],
            EmergencyLevel::Emergency => &[FallbackAction::Log, FallbackAction::Notify],
            EmergencyLevel::Critical => &[FallbackAction::Log],
        }
    }
}

/// Origin of a fallback decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackSource {
    Programmed,
    Rule,
    Heuristic,
    Emergency,
}

/// An auditable degraded-mode decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub action: FallbackAction,
    pub message: String,
    pub confidence: f64,
    pub source: FallbackSource,
}

/// Emergency-level-aware decision layer: programmed responses, then the
/// local model, then heuristics
pub struct AutonomousFallback {
    local_llm: Option<Arc<LocalInference>>,
    persistence: Option<Arc<StatePersistence>>,
    level: RwLock<EmergencyLevel>,
    custom_protocols: RwLock<HashMap<String, FallbackResponse>>,
}

impl AutonomousFallback {
    pub fn new(
        local_llm: Option<Arc<LocalInference>>,
        persistence: Option<Arc<StatePersistence>>,
    ) -> Self {
        info!("autonomous fallback created");
        Self {
            local_llm,
            persistence,
            level: RwLock::new(EmergencyLevel::Normal),
            custom_protocols: RwLock::new(HashMap::new()),
        }
    }

    /// Current emergency level
    pub async fn emergency_level(&self) -> EmergencyLevel {
        *self.level.read().await
    }

    /// Programmed response for an event type. Caller-registered protocols
    /// take precedence over the built-in table.
    pub async fn programmed_response(&self, event_type: &str) -> Option<FallbackResponse> {
        if let Some(custom) = self.custom_protocols.read().await.get(event_type) {
            return Some(custom.clone());
        }
        default_programmed_response(event_type)
    }

    /// Register a caller-supplied protocol for an event type
    pub async fn register_protocol(&self, event_type: impl Into<String>, response: FallbackResponse) {
        let event_type = event_type.into();
        info!("custom protocol registered: {}", event_type);
        self.custom_protocols
            .write()
            .await
            .insert(event_type, response);
    }

    /// Registered custom protocols
    pub async fn registered_protocols(&self) -> HashMap<String, FallbackResponse> {
        self.custom_protocols.read().await.clone()
    }

    /// Heuristic decision from the (risk, urgency) table, clamped to the
    /// active emergency level
    pub async fn heuristic_decision(
        &self,
        risk: RiskLevel,
        urgency: RiskLevel,
        context: Option<&Value>,
    ) -> FallbackResponse {
        let (action, confidence) = heuristic_rule(risk, urgency);

        let detail = context
            .and_then(|c| c.get("detail"))
            .and_then(Value::as_str)
            .map(|d| format!(" Detail: {}", d))
            .unwrap_or_default();

        let response = FallbackResponse {
            action,
            message: format!(
                "Heuristic decision: risk={}, urgency={}. Action: {}.{}",
                risk, urgency, action, detail
            ),
            confidence,
            source: FallbackSource::Heuristic,
        };
        self.clamp_to_level(response).await
    }

    /// Switch to an emergency level. The transition is snapshotted when
    /// state persistence is wired; persistence failures are logged, never
    /// propagated.
    pub async fn activate_emergency(&self, level: EmergencyLevel) {
        let old_level = {
            let mut current = self.level.write().await;
            let old = *current;
            *current = level;
            old
        };

        warn!(
            "emergency protocol active: {:?} -> {:?} (allowed: {:?})",
            old_level,
            level,
            level.allowed_actions()
        );

        if let Some(persistence) = &self.persistence {
            let state = json!({
                "level": level,
                "old_level": old_level,
                "allowed_actions": level.allowed_actions(),
            });
            match serde_json::to_vec(&state) {
                Ok(data) => {
                    if let Err(err) = persistence.save_snapshot("emergency", data, 1).await {
                        error!("failed to snapshot emergency transition: {}", err);
                    }
                }
                Err(err) => error!("failed to encode emergency state: {}", err),
            }
        }
    }

    /// Return to normal operation
    pub async fn deactivate_emergency(&self) {
        let mut level = self.level.write().await;
        info!("emergency protocol deactivated: {:?} -> Normal", *level);
        *level = EmergencyLevel::Normal;
    }

    /// Produce a decision for an event.
    ///
    /// Strategy order: programmed responses, the local inference model
    /// when it is available, then the heuristic table. Whatever the
    /// strategy proposes is clamped to the active emergency level's
    /// allowed actions: a disallowed action downgrades to the most
    /// permissive allowed one and the confidence is multiplied by 0.8.
    pub async fn decide(
        &self,
        event_type: &str,
        risk: RiskLevel,
        urgency: RiskLevel,
        context: Option<&Value>,
    ) -> FallbackResponse {
        if let Some(programmed) = self.programmed_response(event_type).await {
            return self.clamp_to_level(programmed).await;
        }

        if let Some(llm) = &self.local_llm {
            if llm.is_available().await {
                let action = llm.fallback_action(risk, urgency);
                let response = FallbackResponse {
                    action,
                    message: format!(
                        "Local model decision for {} (risk={}, urgency={})",
                        event_type, risk, urgency
                    ),
                    confidence: 0.6,
                    source: FallbackSource::Rule,
                };
                return self.clamp_to_level(response).await;
            }
        }

        self.heuristic_decision(risk, urgency, context).await
    }

    /// Downgrade a response whose action the active emergency level does
    /// not permit
    async fn clamp_to_level(&self, mut response: FallbackResponse) -> FallbackResponse {
        let level = *self.level.read().await;
        let allowed = level.allowed_actions();
        if !allowed.contains(&response.action) {
            let downgraded = *allowed.last().unwrap_or(&FallbackAction::Log);
            warn!(
                "action {} not allowed at {:?}; downgraded to {}",
                response.action, level, downgraded
            );
            response.action = downgraded;
            response.confidence *= 0.8;
        }
        response
    }
}

fn default_programmed_response(event_type: &str) -> Option<FallbackResponse> {
    let (action, message, confidence) = match event_type {
        "server_down" => (
            FallbackAction::Notify,
            "Server unreachable. Operator notified; automatic restart in progress.",
            0.9,
        ),
        "database_failure" => (
            FallbackAction::Notify,
            "Database unreachable. Serving from local cache; writes queued for sync.",
            0.85,
        ),
        "api_unavailable" => (
            FallbackAction::Log,
            "External API unreachable. Local rule engine active; work will replay on reconnect.",
            0.8,
        ),
        "security_threat" => (
            FallbackAction::Notify,
            "Security threat detected. Conservative mode active: new connections are blocked.",
            0.95,
        ),
        "high_load" => (
            FallbackAction::Log,
            "High load detected. Non-priority work deferred.",
            0.85,
        ),
        _ => return None,
    };
    Some(FallbackResponse {
        action,
        message: message.to_string(),
        confidence,
        source: FallbackSource::Programmed,
    })
}

fn heuristic_rule(risk: RiskLevel, urgency: RiskLevel) -> (FallbackAction, f64) {
    use RiskLevel::*;
    // The offline table never returns auto_fix or immediate
    match (risk, urgency) {
        (Low, Low) => (FallbackAction::Log, 0.9),
        (Low, Medium) => (FallbackAction::Log, 0.85),
        (Low, High) => (FallbackAction::Notify, 0.8),
        (Medium, Low) => (FallbackAction::Log, 0.8),
        (Medium, Medium) => (FallbackAction::Notify, 0.75),
        (Medium, High) => (FallbackAction::Notify, 0.7),
        (High, Low) => (FallbackAction::Notify, 0.75),
        (High, Medium) => (FallbackAction::Notify, 0.7),
        (High, High) => (FallbackAction::Notify, 0.9),
    }
}
