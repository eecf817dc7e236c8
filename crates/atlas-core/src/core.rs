//! The ATLAS cognitive cycle facade

use atlas_common::config::CoreConfig;
use atlas_common::Result;
use atlas_unified::action::ActionOutcome;
use atlas_unified::types::{
    ConsciousnessLevel, DecisionSource, EntityType, UnifiedSnapshot,
};
use atlas_unified::{
    ActionCoordinator, AttentionManager, Consciousness, DecisionIntegrator, PersonaManager,
    ReasoningEngine, ReflectionModule, WorldModel,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// One input handed to a cognitive cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptionInput {
    pub source: String,
    pub data: HashMap<String, Value>,
}

/// Result of a perception
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Perception {
    pub source: String,
    pub entity_id: Uuid,
    pub priority: u8,
}

/// Result of a thinking pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkResult {
    pub question: String,
    pub chain_id: Uuid,
    pub conclusion: String,
    pub confidence: f64,
    pub consciousness_level: ConsciousnessLevel,
    pub consciousness_confidence: f64,
}

/// One option fed into a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOption {
    pub source: DecisionSource,
    pub action: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Result of a decision, including the persona gate verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub decision_id: Uuid,
    pub chosen_action: String,
    pub confidence: f64,
    pub explanation: String,
    pub consistent: bool,
}

/// Result of a reflection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectResult {
    pub cycle: u64,
    pub score: f64,
    pub confidence: f64,
    pub findings: Vec<String>,
    pub overall: f64,
}

/// Summary of one cognitive cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle: u64,
    pub perceptions: usize,
    pub duration_secs: f64,
    pub consciousness_level: ConsciousnessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CoreEvent {
    Perception {
        source: String,
        priority: u8,
        timestamp: DateTime<Utc>,
    },
    Action {
        name: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
}

/// Central facade owning every unified subsystem
pub struct AtlasCore {
    consciousness: Consciousness,
    reasoning: ReasoningEngine,
    attention: AttentionManager,
    world: WorldModel,
    decisions: DecisionIntegrator,
    actions: ActionCoordinator,
    reflection: ReflectionModule,
    persona: PersonaManager,
    started_at: Instant,
    cycle_count: RwLock<u64>,
    events: RwLock<Vec<CoreEvent>>,
}

impl AtlasCore {
    pub fn new(config: &CoreConfig) -> Self {
        let level = ConsciousnessLevel::parse(&config.consciousness_level);

        let core = Self {
            consciousness: Consciousness::new(level),
            reasoning: ReasoningEngine::new(config.reasoning_depth),
            attention: AttentionManager::new(1.0),
            world: WorldModel::new(),
            decisions: DecisionIntegrator::new(),
            actions: ActionCoordinator::new(),
            reflection: ReflectionModule::new(),
            persona: PersonaManager::new(),
            started_at: Instant::now(),
            cycle_count: RwLock::new(0),
            events: RwLock::new(Vec::new()),
        };

        core.world.add_entity(
            "ATLAS",
            EntityType::System,
            "active",
            HashMap::from([
                ("role".to_string(), Value::String("core".to_string())),
                (
                    "version".to_string(),
                    Value::String(env!("CARGO_PKG_VERSION").to_string()),
                ),
            ]),
        );

        info!(
            "atlas core started (level={:?}, depth={})",
            level, config.reasoning_depth
        );
        core
    }

    /// Take in an observation from a source: upsert its world entity,
    /// merge it into the environment awareness, and log the event.
    pub fn perceive(&self, source: &str, data: HashMap<String, Value>) -> Perception {
        self.consciousness.update_environment(HashMap::from([(
            source.to_string(),
            Value::Object(data.clone().into_iter().collect()),
        )]));

        let entity_id = match self.world.find_by_name(source) {
            Some(entity) => {
                self.world
                    .update_entity(entity.entity_id, None, Some(data.clone()));
                entity.entity_id
            }
            None => {
                self.world
                    .add_entity(source, EntityType::External, "active", data.clone())
                    .entity_id
            }
        };

        let priority = data
            .get("priority")
            .and_then(Value::as_f64)
            .map(|p| (p as i64).clamp(1, 10) as u8)
            .unwrap_or(5);

        self.events.write().push(CoreEvent::Perception {
            source: source.to_string(),
            priority,
            timestamp: Utc::now(),
        });

        Perception {
            source: source.to_string(),
            entity_id,
            priority,
        }
    }

    /// Reason about a question: claim a 0.3-capacity focus, run logical
    /// reasoning over the premises plus the question, introspect, and
    /// release the focus.
    pub fn think(&self, question: &str, premises: &[String]) -> ThinkResult {
        let focus = self.attention.focus_on(question, 7, 0.3, HashMap::new());

        let mut all_premises = premises.to_vec();
        if !all_premises.iter().any(|p| p == question) {
            all_premises.push(question.to_string());
        }
        let chain = self.reasoning.reason_logically(&all_premises, &[]);

        let introspection = self.consciousness.introspect();

        if let Some(focus) = focus {
            self.attention.release_focus(focus.focus_id);
        }

        ThinkResult {
            question: question.to_string(),
            chain_id: chain.chain_id,
            conclusion: chain.conclusion,
            confidence: chain.confidence,
            consciousness_level: introspection.level,
            consciousness_confidence: introspection.confidence,
        }
    }

    /// Fuse the options into a decision and gate the chosen action
    /// through the persona consistency check. Returns None when there
    /// is nothing to synthesize.
    pub fn decide(&self, question: &str, options: &[DecisionOption]) -> Option<DecisionOutcome> {
        for option in options {
            self.decisions.add_proposal(
                question,
                option.source,
                &option.action,
                option.confidence,
                &option.reasoning,
            );
        }

        let decision = self.decisions.synthesize(question)?;
        let consistency = self
            .persona
            .check_consistency(&decision.chosen_action, None);

        Some(DecisionOutcome {
            decision_id: decision.decision_id,
            chosen_action: decision.chosen_action,
            confidence: decision.confidence,
            explanation: decision.explanation,
            consistent: consistency.consistent,
        })
    }

    /// Create and execute an action against the target systems
    pub fn act(
        &self,
        name: &str,
        target_systems: Vec<String>,
        parameters: HashMap<String, Value>,
    ) -> Result<ActionOutcome> {
        let action = self
            .actions
            .create_action(name, target_systems, parameters, 5, 60);
        let outcome = self.actions.execute_action(&action.action_id);

        self.events.write().push(CoreEvent::Action {
            name: name.to_string(),
            success: outcome.is_ok(),
            timestamp: Utc::now(),
        });
        outcome
    }

    /// Self-evaluate across normalized subsystem counters and reassess
    /// confidence
    pub fn reflect(&self) -> ReflectResult {
        let cycle = {
            let mut count = self.cycle_count.write();
            *count += 1;
            *count
        };

        let criteria = vec![
            (
                "consciousness".to_string(),
                (self.consciousness.uptime() / 3600.0).min(1.0),
            ),
            (
                "attention".to_string(),
                1.0 - self.attention.used_capacity(),
            ),
            (
                "world_model".to_string(),
                (self.world.entity_count() as f64 / 10.0).min(1.0),
            ),
            (
                "decisions".to_string(),
                (self.decisions.total_decisions() as f64 / 5.0).min(1.0),
            ),
            (
                "actions".to_string(),
                (self.actions.completed_actions() as f64 / 5.0).min(1.0),
            ),
        ];

        let record = self
            .reflection
            .self_evaluate(&format!("cycle {}", cycle), &criteria);
        let confidence = self.consciousness.assess_confidence();

        ReflectResult {
            cycle,
            score: record.score,
            confidence,
            findings: record.findings,
            overall: self.reflection.overall_score(),
        }
    }

    /// Run one cognitive cycle over a batch of inputs
    pub fn run_cycle(&self, inputs: Vec<PerceptionInput>) -> CycleSummary {
        let cycle_start = Instant::now();
        let cycle = {
            let mut count = self.cycle_count.write();
            *count += 1;
            *count
        };

        self.consciousness.update_self_state("processing");

        let mut perceptions = 0;
        for input in inputs {
            self.perceive(&input.source, input.data);
            perceptions += 1;
        }

        self.consciousness.introspect();
        self.consciousness.update_self_state("operational");

        CycleSummary {
            cycle,
            perceptions,
            duration_secs: cycle_start.elapsed().as_secs_f64(),
            consciousness_level: self.consciousness.level(),
        }
    }

    /// Counters summarizing the whole core
    pub fn snapshot(&self) -> UnifiedSnapshot {
        UnifiedSnapshot {
            consciousness_level: self.consciousness.level(),
            active_focuses: self.attention.focus_count(),
            world_entities: self.world.entity_count(),
            reasoning_chains: self.reasoning.total_chains(),
            decisions_made: self.decisions.total_decisions(),
            reflections: self.reflection.total_records(),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            overall_health: self.reflection.overall_score(),
        }
    }

    pub fn consciousness(&self) -> &Consciousness {
        &self.consciousness
    }

    pub fn reasoning(&self) -> &ReasoningEngine {
        &self.reasoning
    }

    pub fn attention(&self) -> &AttentionManager {
        &self.attention
    }

    pub fn world(&self) -> &WorldModel {
        &self.world
    }

    pub fn decisions(&self) -> &DecisionIntegrator {
        &self.decisions
    }

    pub fn actions(&self) -> &ActionCoordinator {
        &self.actions
    }

    pub fn reflection(&self) -> &ReflectionModule {
        &self.reflection
    }

    pub fn persona(&self) -> &PersonaManager {
        &self.persona
    }

    pub fn cycle_count(&self) -> u64 {
        *self.cycle_count.read()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }
}
