//! Typed reasoning chain registry
//!
//! Five reasoning kinds (logical, analogical, causal, abductive, meta),
//! each producing an immutable [`ReasoningChain`]. Rules, analogies, and
//! causal links are plain catalog entries registered up front.

use crate::types::{clamp_unit, round3, ReasoningChain, ReasoningStep, ReasoningType};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// A registered logic rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicRule {
    pub condition: String,
    pub consequence: String,
    pub description: String,
}

/// A catalog analogy between two domains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalogyEntry {
    pub source: String,
    pub target: String,
    pub strength: f64,
}

/// A catalog causal link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalLink {
    pub cause: String,
    pub effect: String,
    pub strength: f64,
}

struct Inner {
    chains: HashMap<Uuid, ReasoningChain>,
    rules: HashMap<String, LogicRule>,
    analogies: Vec<AnalogyEntry>,
    causal_links: Vec<CausalLink>,
}

/// Reasoning engine over registered rules, analogies, and causal links
pub struct ReasoningEngine {
    max_depth: usize,
    inner: RwLock<Inner>,
}

impl ReasoningEngine {
    pub fn new(max_depth: usize) -> Self {
        info!("reasoning engine started (depth={})", max_depth);
        Self {
            max_depth,
            inner: RwLock::new(Inner {
                chains: HashMap::new(),
                rules: HashMap::new(),
                analogies: Vec::new(),
                causal_links: Vec::new(),
            }),
        }
    }

    /// Chain depth budget
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Logical reasoning: apply registered rules to the premises.
    /// Confidence grows 0.1 per premise from a 0.5 base, capped at 0.9.
    pub fn reason_logically(&self, premises: &[String], rules: &[String]) -> ReasoningChain {
        let mut inner = self.inner.write();
        let mut steps: Vec<ReasoningStep> = premises
            .iter()
            .map(|p| ReasoningStep::Premise { content: p.clone() })
            .collect();

        let mut applied = Vec::new();
        for rule_name in rules {
            if let Some(rule) = inner.rules.get(rule_name) {
                steps.push(ReasoningStep::RuleApplication {
                    rule: rule_name.clone(),
                    description: rule.description.clone(),
                });
                applied.push(rule_name.clone());
            }
        }

        let conclusion = match premises.last() {
            Some(premise) => format!("{} (confirmed)", premise),
            None => format!("No premises; {} rules applied", applied.len()),
        };

        let chain = ReasoningChain {
            chain_id: Uuid::new_v4(),
            reasoning_type: ReasoningType::Logical,
            premises: premises.to_vec(),
            conclusion,
            confidence: (0.5 + 0.1 * premises.len() as f64).min(0.9),
            steps,
            metadata: HashMap::from([("rules_applied".to_string(), json!(applied))]),
            created_at: Utc::now(),
        };
        inner.chains.insert(chain.chain_id, chain.clone());
        debug!("logical chain {}", chain.chain_id);
        chain
    }

    /// Analogical reasoning between two domains. The base confidence of
    /// 0.3 rises to the strongest catalog analogy matching either
    /// endpoint.
    pub fn reason_analogically(
        &self,
        source_domain: &str,
        target_domain: &str,
        mappings: HashMap<String, String>,
    ) -> ReasoningChain {
        let mut inner = self.inner.write();

        let mut similarity = 0.3f64;
        for analogy in &inner.analogies {
            if analogy.source == source_domain || analogy.target == target_domain {
                similarity = similarity.max(analogy.strength);
            }
        }

        let steps = vec![
            ReasoningStep::SourceDomain {
                domain: source_domain.to_string(),
            },
            ReasoningStep::TargetDomain {
                domain: target_domain.to_string(),
            },
            ReasoningStep::Mapping {
                pairs: mappings.clone(),
            },
        ];

        let chain = ReasoningChain {
            chain_id: Uuid::new_v4(),
            reasoning_type: ReasoningType::Analogical,
            premises: vec![source_domain.to_string(), target_domain.to_string()],
            conclusion: format!(
                "{} -> {}: {} mappings",
                source_domain,
                target_domain,
                mappings.len()
            ),
            confidence: round3(similarity),
            steps,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        inner.chains.insert(chain.chain_id, chain.clone());
        chain
    }

    /// Causal reasoning: match stored causal links against observed
    /// effects. Confidence is the verified share of predicted effects.
    pub fn reason_causally(&self, cause: &str, observed_effects: &[String]) -> ReasoningChain {
        let mut inner = self.inner.write();
        let mut steps = vec![ReasoningStep::Cause {
            content: cause.to_string(),
        }];

        let mut predicted: Vec<String> = Vec::new();
        for link in inner.causal_links.iter().filter(|l| l.cause == cause) {
            predicted.push(link.effect.clone());
            steps.push(ReasoningStep::CausalLink {
                effect: link.effect.clone(),
                strength: link.strength,
            });
        }

        for effect in observed_effects {
            steps.push(ReasoningStep::ObservedEffect {
                content: effect.clone(),
            });
        }

        let verified = predicted
            .iter()
            .filter(|p| observed_effects.contains(p))
            .count();
        let confidence = verified as f64 / predicted.len().max(1) as f64;

        let mut premises = vec![cause.to_string()];
        premises.extend_from_slice(observed_effects);

        let chain = ReasoningChain {
            chain_id: Uuid::new_v4(),
            reasoning_type: ReasoningType::Causal,
            premises,
            conclusion: format!("{} -> {} observed effects", cause, observed_effects.len()),
            confidence: round3(confidence.min(1.0)),
            steps,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        inner.chains.insert(chain.chain_id, chain.clone());
        chain
    }

    /// Abductive reasoning: score each hypothesis by the volume of
    /// observations and choose the best explanation.
    pub fn reason_abductively(
        &self,
        observations: &[String],
        hypotheses: &[String],
    ) -> ReasoningChain {
        let mut inner = self.inner.write();
        let mut steps: Vec<ReasoningStep> = observations
            .iter()
            .map(|o| ReasoningStep::Observation { content: o.clone() })
            .collect();

        let score = round3((0.3 + 0.1 * observations.len() as f64).min(1.0));
        let mut scored: Vec<(String, f64)> = Vec::new();
        for hypothesis in hypotheses {
            scored.push((hypothesis.clone(), score));
            steps.push(ReasoningStep::Hypothesis {
                content: hypothesis.clone(),
                score,
            });
        }

        let (best, best_score) = scored
            .first()
            .cloned()
            .unwrap_or_else(|| ("indeterminate".to_string(), 0.3));

        let chain = ReasoningChain {
            chain_id: Uuid::new_v4(),
            reasoning_type: ReasoningType::Abductive,
            premises: observations.to_vec(),
            conclusion: format!("Best explanation: {}", best),
            confidence: best_score,
            steps,
            metadata: HashMap::from([("all_hypotheses".to_string(), json!(scored))]),
            created_at: Utc::now(),
        };
        inner.chains.insert(chain.chain_id, chain.clone());
        chain
    }

    /// Meta reasoning over existing chains: averages their confidence
    /// and names the most confident conclusion.
    pub fn meta_reason(&self, chain_ids: &[Uuid]) -> ReasoningChain {
        let mut inner = self.inner.write();

        let mut steps = Vec::new();
        let mut evaluated: Vec<(Uuid, f64, String)> = Vec::new();
        for chain_id in chain_ids {
            if let Some(chain) = inner.chains.get(chain_id) {
                evaluated.push((*chain_id, chain.confidence, chain.conclusion.clone()));
                steps.push(ReasoningStep::Evaluate {
                    chain_id: *chain_id,
                    reasoning_type: chain.reasoning_type,
                    confidence: chain.confidence,
                });
            }
        }

        let avg_confidence = if evaluated.is_empty() {
            0.0
        } else {
            evaluated.iter().map(|(_, c, _)| c).sum::<f64>() / evaluated.len() as f64
        };

        let best = evaluated
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let conclusion = match best {
            Some((_, _, conclusion)) => format!("Meta analysis: {} (most confident)", conclusion),
            None => "Insufficient data".to_string(),
        };

        let chain = ReasoningChain {
            chain_id: Uuid::new_v4(),
            reasoning_type: ReasoningType::Meta,
            premises: evaluated.iter().map(|(id, _, _)| id.to_string()).collect(),
            conclusion,
            confidence: round3(avg_confidence),
            steps,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        };
        inner.chains.insert(chain.chain_id, chain.clone());
        chain
    }

    /// Register a logic rule
    pub fn add_rule(
        &self,
        name: impl Into<String>,
        condition: impl Into<String>,
        consequence: impl Into<String>,
        description: impl Into<String>,
    ) {
        self.inner.write().rules.insert(
            name.into(),
            LogicRule {
                condition: condition.into(),
                consequence: consequence.into(),
                description: description.into(),
            },
        );
    }

    /// Register a catalog analogy
    pub fn add_analogy(&self, source: impl Into<String>, target: impl Into<String>, strength: f64) {
        self.inner.write().analogies.push(AnalogyEntry {
            source: source.into(),
            target: target.into(),
            strength: clamp_unit(strength),
        });
    }

    /// Register a causal link
    pub fn add_causal_link(&self, cause: impl Into<String>, effect: impl Into<String>, strength: f64) {
        self.inner.write().causal_links.push(CausalLink {
            cause: cause.into(),
            effect: effect.into(),
            strength: clamp_unit(strength),
        });
    }

    pub fn get_chain(&self, chain_id: Uuid) -> Option<ReasoningChain> {
        self.inner.read().chains.get(&chain_id).cloned()
    }

    pub fn chains_by_type(&self, reasoning_type: ReasoningType) -> Vec<ReasoningChain> {
        self.inner
            .read()
            .chains
            .values()
            .filter(|c| c.reasoning_type == reasoning_type)
            .cloned()
            .collect()
    }

    pub fn total_chains(&self) -> usize {
        self.inner.read().chains.len()
    }

    pub fn rule_count(&self) -> usize {
        self.inner.read().rules.len()
    }

    pub fn analogy_count(&self) -> usize {
        self.inner.read().analogies.len()
    }

    pub fn causal_link_count(&self) -> usize {
        self.inner.read().causal_links.len()
    }
}
