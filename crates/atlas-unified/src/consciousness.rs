//! Self, environment, goal, and capability awareness
//!
//! Holds the current awareness state, an append-only state transition
//! log, and an introspection log.

use crate::types::{round3, AwarenessState, ConsciousnessLevel};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

/// One entry in the state transition log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateTransition {
    SelfState {
        old: String,
        new: String,
        timestamp: DateTime<Utc>,
    },
    LevelChange {
        old: ConsciousnessLevel,
        new: ConsciousnessLevel,
        timestamp: DateTime<Utc>,
    },
}

/// Snapshot produced by one introspection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Introspection {
    pub level: ConsciousnessLevel,
    pub self_state: String,
    pub goal_count: usize,
    pub capability_count: usize,
    pub environment_keys: Vec<String>,
    pub limitation_count: usize,
    pub confidence: f64,
    pub uptime_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    level: ConsciousnessLevel,
    awareness: AwarenessState,
    state_history: Vec<StateTransition>,
    introspections: Vec<Introspection>,
}

/// Awareness layer of the agent
pub struct Consciousness {
    inner: RwLock<Inner>,
    started_at: Instant,
}

impl Consciousness {
    pub fn new(initial_level: ConsciousnessLevel) -> Self {
        info!("consciousness started (level={:?})", initial_level);
        Self {
            inner: RwLock::new(Inner {
                level: initial_level,
                awareness: AwarenessState::default(),
                state_history: Vec::new(),
                introspections: Vec::new(),
            }),
            started_at: Instant::now(),
        }
    }

    /// Update the self state, recording the transition
    pub fn update_self_state(&self, state: impl Into<String>) {
        let state = state.into();
        let mut inner = self.inner.write();
        let old = std::mem::replace(&mut inner.awareness.self_state, state.clone());
        inner.awareness.timestamp = Utc::now();
        inner.state_history.push(StateTransition::SelfState {
            old,
            new: state,
            timestamp: Utc::now(),
        });
    }

    pub fn update_goals(&self, goals: Vec<String>) {
        self.inner.write().awareness.active_goals = goals;
    }

    pub fn update_capabilities(&self, capabilities: Vec<String>) {
        self.inner.write().awareness.capabilities = capabilities;
    }

    /// Merge new environment observations into the awareness state
    pub fn update_environment(&self, env: HashMap<String, Value>) {
        self.inner.write().awareness.environment.extend(env);
    }

    pub fn update_limitations(&self, limitations: Vec<String>) {
        self.inner.write().awareness.limitations = limitations;
    }

    /// Change the consciousness level, recording the transition
    pub fn set_level(&self, level: ConsciousnessLevel) {
        let mut inner = self.inner.write();
        let old = inner.level;
        inner.level = level;
        inner.state_history.push(StateTransition::LevelChange {
            old,
            new: level,
            timestamp: Utc::now(),
        });
        info!("consciousness level: {:?} -> {:?}", old, level);
    }

    /// Produce an introspection snapshot and append it to the log
    pub fn introspect(&self) -> Introspection {
        let mut inner = self.inner.write();
        let snapshot = Introspection {
            level: inner.level,
            self_state: inner.awareness.self_state.clone(),
            goal_count: inner.awareness.active_goals.len(),
            capability_count: inner.awareness.capabilities.len(),
            environment_keys: inner.awareness.environment.keys().cloned().collect(),
            limitation_count: inner.awareness.limitations.len(),
            confidence: inner.awareness.confidence,
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
        };
        inner.introspections.push(snapshot.clone());
        snapshot
    }

    /// Average four awareness signals into a confidence score.
    /// Each factor contributes its high weight when the signal is present
    /// and its low weight otherwise.
    pub fn assess_confidence(&self) -> f64 {
        let mut inner = self.inner.write();
        let awareness = &inner.awareness;

        let factors = [
            if awareness.active_goals.is_empty() { 0.3 } else { 0.8 },
            if awareness.capabilities.is_empty() { 0.4 } else { 0.9 },
            if awareness.environment.is_empty() { 0.3 } else { 0.7 },
            // Knowing your limitations counts for, not against, you
            if awareness.limitations.is_empty() { 0.5 } else { 0.8 },
        ];

        let confidence = round3(factors.iter().sum::<f64>() / factors.len() as f64);
        inner.awareness.confidence = confidence;
        confidence
    }

    /// Current awareness state
    pub fn awareness(&self) -> AwarenessState {
        self.inner.read().awareness.clone()
    }

    /// State transition log; `limit` of 0 returns everything
    pub fn state_history(&self, limit: usize) -> Vec<StateTransition> {
        let inner = self.inner.read();
        if limit > 0 && inner.state_history.len() > limit {
            inner.state_history[inner.state_history.len() - limit..].to_vec()
        } else {
            inner.state_history.clone()
        }
    }

    /// Introspection log; `limit` of 0 returns everything
    pub fn introspections(&self, limit: usize) -> Vec<Introspection> {
        let inner = self.inner.read();
        if limit > 0 && inner.introspections.len() > limit {
            inner.introspections[inner.introspections.len() - limit..].to_vec()
        } else {
            inner.introspections.clone()
        }
    }

    pub fn level(&self) -> ConsciousnessLevel {
        self.inner.read().level
    }

    /// Seconds since construction, on the monotonic clock
    pub fn uptime(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    pub fn introspection_count(&self) -> usize {
        self.inner.read().introspections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn introspection_reflects_awareness_and_appends() {
        let c = Consciousness::new(ConsciousnessLevel::Medium);
        c.update_goals(vec!["keep services up".to_string()]);
        c.update_environment(HashMap::from([("monitor".to_string(), json!({"cpu": 40}))]));

        let snapshot = c.introspect();
        assert_eq!(snapshot.level, ConsciousnessLevel::Medium);
        assert_eq!(snapshot.goal_count, 1);
        assert_eq!(snapshot.environment_keys, vec!["monitor".to_string()]);
        assert_eq!(c.introspection_count(), 1);
    }

    #[test]
    fn confidence_rises_with_awareness() {
        let c = Consciousness::new(ConsciousnessLevel::Medium);
        let blank = c.assess_confidence();
        assert!((blank - 0.375).abs() < 1e-9);

        c.update_goals(vec!["goal".to_string()]);
        c.update_capabilities(vec!["scan".to_string()]);
        c.update_environment(HashMap::from([("k".to_string(), json!(1))]));
        c.update_limitations(vec!["offline-only".to_string()]);

        let full = c.assess_confidence();
        assert!((full - 0.8).abs() < 1e-9);
        assert!((c.awareness().confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn state_transitions_are_logged_in_order() {
        let c = Consciousness::new(ConsciousnessLevel::Low);
        c.update_self_state("processing");
        c.update_self_state("operational");
        c.set_level(ConsciousnessLevel::High);

        let history = c.state_history(0);
        assert_eq!(history.len(), 3);
        assert!(matches!(
            &history[0],
            StateTransition::SelfState { old, new, .. }
                if old == "operational" && new == "processing"
        ));
        assert!(matches!(
            &history[2],
            StateTransition::LevelChange { new: ConsciousnessLevel::High, .. }
        ));

        let bounded = c.state_history(1);
        assert_eq!(bounded.len(), 1);
    }

    #[test]
    fn environment_updates_merge() {
        let c = Consciousness::new(ConsciousnessLevel::Medium);
        c.update_environment(HashMap::from([("a".to_string(), json!(1))]));
        c.update_environment(HashMap::from([("b".to_string(), json!(2))]));
        let awareness = c.awareness();
        assert_eq!(awareness.environment.len(), 2);
    }
}
