//! Weighted multi-source decision fusion
//!
//! Proposals accumulate per question; synthesis groups them by action,
//! sums confidence x source-weight scores, picks the argmax (first-seen
//! wins ties), and records a conflict when the top two actions land
//! within 0.05 of each other.

use crate::types::{clamp_unit, round3, DecisionSource, IntegratedDecision, Proposal};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

const CONFLICT_THRESHOLD: f64 = 0.05;

/// A detected near-tie between the top two actions of a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub question: String,
    pub options: Vec<(String, f64)>,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    decisions: HashMap<Uuid, IntegratedDecision>,
    weights: HashMap<DecisionSource, f64>,
    proposals: HashMap<String, Vec<Proposal>>,
    conflicts: Vec<ConflictRecord>,
}

fn default_weights() -> HashMap<DecisionSource, f64> {
    HashMap::from([
        (DecisionSource::Bdi, 0.25),
        (DecisionSource::Probabilistic, 0.20),
        (DecisionSource::Reinforcement, 0.20),
        (DecisionSource::RuleBased, 0.15),
        (DecisionSource::Emotional, 0.10),
        (DecisionSource::Consensus, 0.10),
    ])
}

/// Fuses weighted proposals from multiple decision sources
pub struct DecisionIntegrator {
    inner: RwLock<Inner>,
}

impl Default for DecisionIntegrator {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionIntegrator {
    pub fn new() -> Self {
        info!("decision integrator started");
        Self {
            inner: RwLock::new(Inner {
                decisions: HashMap::new(),
                weights: default_weights(),
                proposals: HashMap::new(),
                conflicts: Vec::new(),
            }),
        }
    }

    /// Append a proposal to the question's list
    pub fn add_proposal(
        &self,
        question: impl Into<String>,
        source: DecisionSource,
        action: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
    ) {
        let proposal = Proposal {
            source,
            action: action.into(),
            confidence: clamp_unit(confidence),
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        };
        self.inner
            .write()
            .proposals
            .entry(question.into())
            .or_default()
            .push(proposal);
    }

    /// Synthesize a decision for the question, or None when it has no
    /// proposals. Synthesis observes a consistent snapshot of the
    /// question's proposals.
    pub fn synthesize(&self, question: &str) -> Option<IntegratedDecision> {
        let mut inner = self.inner.write();
        let proposals = inner.proposals.get(question)?.clone();
        if proposals.is_empty() {
            return None;
        }

        // Scores keyed by action in first-seen order, so the argmax of a
        // tie is the earliest-proposed action
        let mut scored: Vec<(String, f64)> = Vec::new();
        let mut sources_by_action: HashMap<String, Vec<DecisionSource>> = HashMap::new();

        for proposal in &proposals {
            let weight = inner
                .weights
                .get(&proposal.source)
                .copied()
                .unwrap_or(0.1);
            let score = proposal.confidence * weight;

            match scored.iter_mut().find(|(action, _)| *action == proposal.action) {
                Some((_, total)) => *total += score,
                None => scored.push((proposal.action.clone(), score)),
            }
            sources_by_action
                .entry(proposal.action.clone())
                .or_default()
                .push(proposal.source);
        }

        let (chosen_action, top_score) = {
            let mut best = &scored[0];
            for entry in &scored[1..] {
                if entry.1 > best.1 {
                    best = entry;
                }
            }
            best.clone()
        };

        let alternatives: Vec<String> = scored
            .iter()
            .filter(|(action, _)| *action != chosen_action)
            .map(|(action, _)| action.clone())
            .collect();

        if scored.len() > 1 {
            let mut by_score: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
            by_score.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
            if by_score[0] - by_score[1] < CONFLICT_THRESHOLD {
                inner.conflicts.push(ConflictRecord {
                    question: question.to_string(),
                    options: scored.clone(),
                    timestamp: Utc::now(),
                });
            }
        }

        let total_weight: f64 = proposals
            .iter()
            .map(|p| inner.weights.get(&p.source).copied().unwrap_or(0.1))
            .sum();
        let confidence = round3((top_score / total_weight.max(0.01)).min(1.0));

        let supporting: Vec<&'static str> = proposals
            .iter()
            .filter(|p| p.action == chosen_action)
            .map(|p| p.source.label())
            .collect();
        let explanation = format!(
            "'{}' selected. Supported by: {}. Score: {:.3}.",
            chosen_action,
            supporting.join(", "),
            top_score
        );

        let decision = IntegratedDecision {
            decision_id: Uuid::new_v4(),
            question: question.to_string(),
            chosen_action: chosen_action.clone(),
            sources: sources_by_action.remove(&chosen_action).unwrap_or_default(),
            confidence,
            reasoning: proposals[0].reasoning.clone(),
            alternatives,
            explanation,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        inner.decisions.insert(decision.decision_id, decision.clone());

        info!(
            "decision synthesized: {} -> {} (conf={:.2})",
            question, decision.chosen_action, decision.confidence
        );
        Some(decision)
    }

    /// Manually resolve a conflicted question with a forced action.
    /// The decision carries confidence 0.9 and a manual explanation.
    pub fn resolve_conflict(
        &self,
        question: &str,
        chosen_action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Option<IntegratedDecision> {
        let chosen_action = chosen_action.into();
        let reason = reason.into();

        let mut inner = self.inner.write();
        let proposals = inner.proposals.get(question)?;
        let sources: Vec<DecisionSource> = proposals
            .iter()
            .filter(|p| p.action == chosen_action)
            .map(|p| p.source)
            .collect();

        let decision = IntegratedDecision {
            decision_id: Uuid::new_v4(),
            question: question.to_string(),
            chosen_action,
            sources,
            confidence: 0.9,
            reasoning: reason.clone(),
            alternatives: Vec::new(),
            explanation: format!("Manual: {}", reason),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        inner.decisions.insert(decision.decision_id, decision.clone());
        Some(decision)
    }

    /// Set a source weight, clamped to [0, 1]
    pub fn set_source_weight(&self, source: DecisionSource, weight: f64) {
        self.inner.write().weights.insert(source, clamp_unit(weight));
    }

    pub fn source_weight(&self, source: DecisionSource) -> f64 {
        self.inner.read().weights.get(&source).copied().unwrap_or(0.1)
    }

    pub fn get_decision(&self, decision_id: Uuid) -> Option<IntegratedDecision> {
        self.inner.read().decisions.get(&decision_id).cloned()
    }

    pub fn proposals(&self, question: &str) -> Vec<Proposal> {
        self.inner
            .read()
            .proposals
            .get(question)
            .cloned()
            .unwrap_or_default()
    }

    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.inner.read().conflicts.clone()
    }

    pub fn total_decisions(&self) -> usize {
        self.inner.read().decisions.len()
    }

    pub fn total_proposals(&self) -> usize {
        self.inner.read().proposals.values().map(Vec::len).sum()
    }

    pub fn conflict_count(&self) -> usize {
        self.inner.read().conflicts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn integrator() -> DecisionIntegrator {
        DecisionIntegrator::new()
    }

    #[test]
    fn synthesis_picks_weighted_argmax() {
        let d = integrator();
        d.add_proposal("scale?", DecisionSource::Bdi, "scale_up", 0.8, "load high");
        d.add_proposal(
            "scale?",
            DecisionSource::Probabilistic,
            "scale_up",
            0.7,
            "forecast",
        );
        d.add_proposal("scale?", DecisionSource::Emotional, "alert", 0.4, "worry");

        let decision = d.synthesize("scale?").unwrap();
        assert_eq!(decision.chosen_action, "scale_up");
        // scale_up: 0.8*0.25 + 0.7*0.20 = 0.34; alert: 0.4*0.10 = 0.04
        assert_eq!(decision.alternatives, vec!["alert".to_string()]);
        assert_eq!(
            decision.sources,
            vec![DecisionSource::Bdi, DecisionSource::Probabilistic]
        );
        // 0.34 / (0.25 + 0.20 + 0.10)
        assert!((decision.confidence - round3(0.34 / 0.55)).abs() < 1e-9);
        assert!(decision.explanation.contains("bdi, probabilistic"));
    }

    #[test]
    fn synthesis_with_no_proposals_is_none() {
        let d = integrator();
        assert!(d.synthesize("silence").is_none());
    }

    #[test]
    fn near_tie_records_conflict_but_still_decides() {
        let d = integrator();
        // 0.8*0.25 = 0.20 vs 1.0*0.20 = 0.20: an exact tie
        d.add_proposal("route?", DecisionSource::Bdi, "left", 0.8, "");
        d.add_proposal("route?", DecisionSource::Probabilistic, "right", 1.0, "");

        let decision = d.synthesize("route?").unwrap();
        // Tie broken by insertion order of the first proposal
        assert_eq!(decision.chosen_action, "left");
        assert_eq!(d.conflict_count(), 1);
        assert_eq!(d.conflicts()[0].question, "route?");
    }

    #[test]
    fn clear_winner_records_no_conflict() {
        let d = integrator();
        d.add_proposal("q", DecisionSource::Bdi, "a", 0.9, "");
        d.add_proposal("q", DecisionSource::Emotional, "b", 0.2, "");

        d.synthesize("q").unwrap();
        assert_eq!(d.conflict_count(), 0);
    }

    #[test]
    fn manual_resolution_forces_the_action() {
        let d = integrator();
        d.add_proposal("q", DecisionSource::Bdi, "a", 0.5, "");
        d.add_proposal("q", DecisionSource::Consensus, "b", 0.5, "");

        let decision = d.resolve_conflict("q", "b", "operator override").unwrap();
        assert_eq!(decision.chosen_action, "b");
        assert!((decision.confidence - 0.9).abs() < 1e-9);
        assert_eq!(decision.explanation, "Manual: operator override");
        assert_eq!(decision.sources, vec![DecisionSource::Consensus]);

        assert!(d.resolve_conflict("unknown", "x", "").is_none());
    }

    #[test]
    fn source_weights_clamp_and_apply() {
        let d = integrator();
        d.set_source_weight(DecisionSource::Emotional, 7.0);
        assert!((d.source_weight(DecisionSource::Emotional) - 1.0).abs() < 1e-9);

        d.set_source_weight(DecisionSource::Emotional, -1.0);
        assert!((d.source_weight(DecisionSource::Emotional) - 0.0).abs() < 1e-9);

        // A zero-weighted source cannot win
        d.add_proposal("q", DecisionSource::Emotional, "feel", 1.0, "");
        d.add_proposal("q", DecisionSource::Bdi, "plan", 0.3, "");
        let decision = d.synthesize("q").unwrap();
        assert_eq!(decision.chosen_action, "plan");
    }

    #[test]
    fn confidence_caps_at_one() {
        let d = integrator();
        d.set_source_weight(DecisionSource::Bdi, 0.004);
        d.add_proposal("q", DecisionSource::Bdi, "a", 1.0, "");
        // total weight clamps at 0.01, score 0.004 -> 0.4
        let decision = d.synthesize("q").unwrap();
        assert!(decision.confidence <= 1.0);
    }

    #[test]
    fn proposal_counters() {
        let d = integrator();
        d.add_proposal("q1", DecisionSource::Bdi, "a", 0.5, "");
        d.add_proposal("q2", DecisionSource::Bdi, "b", 0.5, "");
        assert_eq!(d.total_proposals(), 2);
        assert_eq!(d.proposals("q1").len(), 1);
        assert!(d.proposals("nope").is_empty());
    }
}
