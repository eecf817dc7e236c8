//! Persona profile, contextual style, and behavioral consistency
//!
//! The agent keeps a trait/value profile with per-context style
//! overrides, gates proposed actions through a consistency check against
//! its declared values, and adapts traits within adaptability bounds.

use crate::types::{clamp_unit, round3, PersonaProfile};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// Style parameters resolved for a context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStyle {
    pub style: String,
    pub formality: f64,
    pub humor: f64,
    pub detail: f64,
}

/// Outcome of a behavioral consistency check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyCheck {
    pub consistent: bool,
    pub violations: Vec<String>,
    pub proposed_action: String,
}

/// A recorded trait adaptation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationRecord {
    pub preference: String,
    pub adjustments: HashMap<String, f64>,
    pub old_values: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// A recorded interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction_type: String,
    pub context: String,
    pub satisfaction: f64,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    profile: PersonaProfile,
    style_overrides: HashMap<String, String>,
    interactions: Vec<InteractionRecord>,
    adaptations: Vec<AdaptationRecord>,
}

/// Maintains and adapts a consistent agent persona
pub struct PersonaManager {
    inner: RwLock<Inner>,
}

impl Default for PersonaManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PersonaManager {
    pub fn new() -> Self {
        info!("persona manager started");
        Self {
            inner: RwLock::new(Inner {
                profile: PersonaProfile {
                    name: "ATLAS".to_string(),
                    traits: HashMap::from([
                        ("professionalism".to_string(), 0.8),
                        ("friendliness".to_string(), 0.7),
                        ("assertiveness".to_string(), 0.6),
                        ("patience".to_string(), 0.8),
                        ("humor".to_string(), 0.4),
                        ("detail_orientation".to_string(), 0.7),
                    ]),
                    values: vec![
                        "reliability".to_string(),
                        "efficiency".to_string(),
                        "transparency".to_string(),
                        "continuous_improvement".to_string(),
                    ],
                    communication_style: "professional".to_string(),
                    formality: 0.5,
                    adaptability: 0.7,
                },
                style_overrides: HashMap::new(),
                interactions: Vec::new(),
                adaptations: Vec::new(),
            }),
        }
    }

    pub fn set_trait(&self, name: impl Into<String>, value: f64) {
        self.inner
            .write()
            .profile
            .traits
            .insert(name.into(), clamp_unit(value));
    }

    pub fn get_trait(&self, name: &str) -> f64 {
        self.inner
            .read()
            .profile
            .traits
            .get(name)
            .copied()
            .unwrap_or(0.5)
    }

    pub fn all_traits(&self) -> HashMap<String, f64> {
        self.inner.read().profile.traits.clone()
    }

    pub fn add_value(&self, value: impl Into<String>) {
        let value = value.into();
        let mut inner = self.inner.write();
        if !inner.profile.values.contains(&value) {
            inner.profile.values.push(value);
        }
    }

    pub fn remove_value(&self, value: &str) -> bool {
        let mut inner = self.inner.write();
        let before = inner.profile.values.len();
        inner.profile.values.retain(|v| v != value);
        inner.profile.values.len() != before
    }

    pub fn values(&self) -> Vec<String> {
        self.inner.read().profile.values.clone()
    }

    pub fn set_communication_style(&self, style: impl Into<String>) {
        self.inner.write().profile.communication_style = style.into();
    }

    pub fn set_formality(&self, level: f64) {
        self.inner.write().profile.formality = clamp_unit(level);
    }

    /// Resolve the style for a context. Overrides win over the default
    /// style; emergencies force formality up to at least 0.8, casual
    /// contexts cap it at 0.3.
    pub fn style_for_context(&self, context: &str) -> ContextStyle {
        let inner = self.inner.read();
        let style = inner
            .style_overrides
            .get(context)
            .cloned()
            .unwrap_or_else(|| inner.profile.communication_style.clone());

        let formality = match context {
            "emergency" => inner.profile.formality.max(0.8),
            "casual" => inner.profile.formality.min(0.3),
            _ => inner.profile.formality,
        };

        ContextStyle {
            style,
            formality,
            humor: inner.profile.traits.get("humor").copied().unwrap_or(0.4),
            detail: inner
                .profile
                .traits
                .get("detail_orientation")
                .copied()
                .unwrap_or(0.7),
        }
    }

    pub fn set_style_override(&self, context: impl Into<String>, style: impl Into<String>) {
        self.inner
            .write()
            .style_overrides
            .insert(context.into(), style.into());
    }

    pub fn remove_style_override(&self, context: &str) -> bool {
        self.inner.write().style_overrides.remove(context).is_some()
    }

    /// Check a proposed action against declared values. Each well-known
    /// value tests the action context: transparency rejects hidden
    /// operations, reliability rejects risky ones, and aggressive
    /// behavior clashes with a low-assertiveness profile.
    pub fn check_consistency(
        &self,
        proposed_action: &str,
        action_context: Option<&HashMap<String, Value>>,
    ) -> ConsistencyCheck {
        let inner = self.inner.read();
        let mut violations = Vec::new();
        let flag = |ctx: Option<&HashMap<String, Value>>, key: &str| {
            ctx.and_then(|c| c.get(key))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };

        for value in &inner.profile.values {
            if value == "transparency" && flag(action_context, "hidden") {
                violations.push("violates transparency: hidden operation".to_string());
            }
            if value == "reliability" && flag(action_context, "risky") {
                violations.push("violates reliability: risky operation".to_string());
            }
        }

        let assertiveness = inner
            .profile
            .traits
            .get("assertiveness")
            .copied()
            .unwrap_or(0.5);
        if flag(action_context, "aggressive") && assertiveness < 0.3 {
            violations.push("aggressive behavior does not fit this persona".to_string());
        }

        ConsistencyCheck {
            consistent: violations.is_empty(),
            violations,
            proposed_action: proposed_action.to_string(),
        }
    }

    /// Adapt traits toward a user preference. Each delta is clamped to
    /// +/- adaptability * 0.3 before applying.
    pub fn adapt_to_user(
        &self,
        preference: &str,
        adjustments: HashMap<String, f64>,
    ) -> AdaptationRecord {
        let mut inner = self.inner.write();
        let max_change = inner.profile.adaptability * 0.3;

        let mut old_values = HashMap::new();
        for (name, delta) in &adjustments {
            let old = inner.profile.traits.get(name).copied().unwrap_or(0.5);
            old_values.insert(name.clone(), old);
            let applied = delta.clamp(-max_change, max_change);
            inner
                .profile
                .traits
                .insert(name.clone(), round3(clamp_unit(old + applied)));
        }

        let record = AdaptationRecord {
            preference: preference.to_string(),
            adjustments,
            old_values,
            timestamp: Utc::now(),
        };
        inner.adaptations.push(record.clone());
        record
    }

    pub fn record_interaction(
        &self,
        interaction_type: impl Into<String>,
        context: impl Into<String>,
        satisfaction: f64,
    ) {
        self.inner.write().interactions.push(InteractionRecord {
            interaction_type: interaction_type.into(),
            context: context.into(),
            satisfaction: clamp_unit(satisfaction),
            timestamp: Utc::now(),
        });
    }

    pub fn profile(&self) -> PersonaProfile {
        self.inner.read().profile.clone()
    }

    pub fn adaptations(&self) -> Vec<AdaptationRecord> {
        self.inner.read().adaptations.clone()
    }

    /// Interaction history; `limit` of 0 returns everything
    pub fn interaction_history(&self, limit: usize) -> Vec<InteractionRecord> {
        let inner = self.inner.read();
        if limit > 0 && inner.interactions.len() > limit {
            inner.interactions[inner.interactions.len() - limit..].to_vec()
        } else {
            inner.interactions.clone()
        }
    }

    pub fn trait_count(&self) -> usize {
        self.inner.read().profile.traits.len()
    }

    pub fn value_count(&self) -> usize {
        self.inner.read().profile.values.len()
    }

    pub fn adaptation_count(&self) -> usize {
        self.inner.read().adaptations.len()
    }

    pub fn interaction_count(&self) -> usize {
        self.inner.read().interactions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn persona() -> PersonaManager {
        PersonaManager::new()
    }

    #[test]
    fn style_forces_formality_bounds_per_context() {
        let p = persona();
        let normal = p.style_for_context("status_report");
        assert!((normal.formality - 0.5).abs() < 1e-9);

        let emergency = p.style_for_context("emergency");
        assert!(emergency.formality >= 0.8);

        let casual = p.style_for_context("casual");
        assert!(casual.formality <= 0.3);
    }

    #[test]
    fn style_override_wins_for_its_context() {
        let p = persona();
        p.set_style_override("support", "friendly");
        assert_eq!(p.style_for_context("support").style, "friendly");
        assert_eq!(p.style_for_context("other").style, "professional");

        assert!(p.remove_style_override("support"));
        assert_eq!(p.style_for_context("support").style, "professional");
    }

    #[test]
    fn hidden_operations_violate_transparency() {
        let p = persona();
        let ctx = HashMap::from([("hidden".to_string(), json!(true))]);
        let check = p.check_consistency("silent_patch", Some(&ctx));
        assert!(!check.consistent);
        assert_eq!(check.violations.len(), 1);
        assert!(check.violations[0].contains("transparency"));
    }

    #[test]
    fn risky_operations_violate_reliability() {
        let p = persona();
        let ctx = HashMap::from([
            ("risky".to_string(), json!(true)),
            ("hidden".to_string(), json!(true)),
        ]);
        let check = p.check_consistency("force_push", Some(&ctx));
        assert_eq!(check.violations.len(), 2);
    }

    #[test]
    fn aggressive_only_clashes_with_low_assertiveness() {
        let p = persona();
        let ctx = HashMap::from([("aggressive".to_string(), json!(true))]);
        // The default assertiveness of 0.6 tolerates it
        assert!(p.check_consistency("push_back", Some(&ctx)).consistent);

        p.set_trait("assertiveness", 0.1);
        assert!(!p.check_consistency("push_back", Some(&ctx)).consistent);
    }

    #[test]
    fn clean_action_is_consistent() {
        let p = persona();
        let check = p.check_consistency("scale_up", None);
        assert!(check.consistent);
        assert!(check.violations.is_empty());
        assert_eq!(check.proposed_action, "scale_up");
    }

    #[test]
    fn adaptation_clamps_deltas_by_adaptability() {
        let p = persona();
        // max_change = 0.7 * 0.3 = 0.21
        let record = p.adapt_to_user(
            "more humor",
            HashMap::from([("humor".to_string(), 0.5), ("patience".to_string(), -0.9)]),
        );

        assert!((p.get_trait("humor") - round3(0.4 + 0.21)).abs() < 1e-9);
        assert!((p.get_trait("patience") - round3(0.8 - 0.21)).abs() < 1e-9);
        assert_eq!(record.old_values["humor"], 0.4);
        assert_eq!(p.adaptation_count(), 1);
    }

    #[test]
    fn values_are_deduplicated() {
        let p = persona();
        p.add_value("transparency");
        assert_eq!(p.value_count(), 4);
        p.add_value("frugality");
        assert_eq!(p.value_count(), 5);
        assert!(p.remove_value("frugality"));
        assert!(!p.remove_value("frugality"));
    }

    #[test]
    fn interactions_are_recorded_and_bounded() {
        let p = persona();
        for n in 0..4 {
            p.record_interaction("chat", format!("ctx{}", n), 0.8);
        }
        assert_eq!(p.interaction_count(), 4);
        assert_eq!(p.interaction_history(2).len(), 2);
        assert_eq!(p.interaction_history(0).len(), 4);
    }
}
