//! Shared models for the unified intelligence core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Consciousness level of the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsciousnessLevel {
    Dormant,
    Low,
    Medium,
    High,
    Peak,
}

impl ConsciousnessLevel {
    /// Parse a config string, defaulting to Medium
    pub fn parse(raw: &str) -> Self {
        match raw {
            "dormant" => ConsciousnessLevel::Dormant,
            "low" => ConsciousnessLevel::Low,
            "high" => ConsciousnessLevel::High,
            "peak" => ConsciousnessLevel::Peak,
            _ => ConsciousnessLevel::Medium,
        }
    }
}

/// Reasoning chain kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningType {
    Logical,
    Analogical,
    Causal,
    Abductive,
    Meta,
}

/// Attention focus states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionState {
    Focused,
    Distributed,
    Background,
    Interrupted,
    Switching,
}

/// World entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    System,
    Agent,
    Resource,
    Task,
    User,
    External,
}

/// Weighted decision sources feeding the integrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Bdi,
    Probabilistic,
    Reinforcement,
    Emotional,
    RuleBased,
    Consensus,
}

impl DecisionSource {
    pub fn label(&self) -> &'static str {
        match self {
            DecisionSource::Bdi => "bdi",
            DecisionSource::Probabilistic => "probabilistic",
            DecisionSource::Reinforcement => "reinforcement",
            DecisionSource::Emotional => "emotional",
            DecisionSource::RuleBased => "rule_based",
            DecisionSource::Consensus => "consensus",
        }
    }
}

/// Reflection record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionType {
    SelfEvaluation,
    Performance,
    BiasCheck,
    Improvement,
    Consolidation,
}

/// Current self/environment/goal awareness of the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwarenessState {
    pub self_state: String,
    pub active_goals: Vec<String>,
    pub capabilities: Vec<String>,
    pub environment: HashMap<String, Value>,
    pub limitations: Vec<String>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl Default for AwarenessState {
    fn default() -> Self {
        Self {
            self_state: "operational".to_string(),
            active_goals: Vec::new(),
            capabilities: Vec::new(),
            environment: HashMap::new(),
            limitations: Vec::new(),
            confidence: 0.5,
            timestamp: Utc::now(),
        }
    }
}

/// One step inside a reasoning chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningStep {
    Premise { content: String },
    RuleApplication { rule: String, description: String },
    SourceDomain { domain: String },
    TargetDomain { domain: String },
    Mapping { pairs: HashMap<String, String> },
    Cause { content: String },
    CausalLink { effect: String, strength: f64 },
    ObservedEffect { content: String },
    Observation { content: String },
    Hypothesis { content: String, score: f64 },
    Evaluate { chain_id: Uuid, reasoning_type: ReasoningType, confidence: f64 },
}

/// Immutable chain produced by one reasoning pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningChain {
    pub chain_id: Uuid,
    pub reasoning_type: ReasoningType,
    pub premises: Vec<String>,
    pub conclusion: String,
    pub confidence: f64,
    pub steps: Vec<ReasoningStep>,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// A bounded-capacity claim on the attention budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionFocus {
    pub focus_id: Uuid,
    pub target: String,
    pub priority: u8,
    pub state: AttentionState,
    pub allocated_capacity: f64,
    pub context: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// One entity in the world model graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldEntity {
    pub entity_id: Uuid,
    pub name: String,
    pub entity_type: EntityType,
    pub state: String,
    pub properties: HashMap<String, Value>,
    pub relationships: Vec<Uuid>,
    pub last_updated: DateTime<Utc>,
}

/// A typed edge between two world entities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub source: Uuid,
    pub target: Uuid,
    pub relation_type: String,
    pub strength: f64,
    pub properties: HashMap<String, Value>,
}

/// A single source's candidate action for a question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub source: DecisionSource,
    pub action: String,
    pub confidence: f64,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

/// Decision fused from weighted multi-source proposals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratedDecision {
    pub decision_id: Uuid,
    pub question: String,
    pub chosen_action: String,
    pub sources: Vec<DecisionSource>,
    pub confidence: f64,
    pub reasoning: String,
    pub alternatives: Vec<String>,
    pub explanation: String,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// A stored reflection outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub record_id: Uuid,
    pub reflection_type: ReflectionType,
    pub subject: String,
    pub findings: Vec<String>,
    pub improvements: Vec<String>,
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

/// Trait/value profile of the agent persona
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub name: String,
    pub traits: HashMap<String, f64>,
    pub values: Vec<String>,
    pub communication_style: String,
    pub formality: f64,
    pub adaptability: f64,
}

/// Counters summarizing the unified core's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedSnapshot {
    pub consciousness_level: ConsciousnessLevel,
    pub active_focuses: usize,
    pub world_entities: usize,
    pub reasoning_chains: usize,
    pub decisions_made: usize,
    pub reflections: usize,
    pub uptime_seconds: f64,
    pub overall_health: f64,
}

/// Clamp a value into [0, 1]
pub(crate) fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Round to three decimals, matching the precision used in reports
pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
