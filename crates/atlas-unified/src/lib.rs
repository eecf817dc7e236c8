//! Unified intelligence core for the ATLAS agent
//!
//! A deterministic in-process coordination fabric: perception-aware
//! consciousness, a typed reasoning chain registry, a bounded-capacity
//! attention manager, an entity/relationship world model with
//! counterfactual queries, weighted multi-source decision fusion, an
//! action/plan coordinator, a reflection module, and a persona gate.
//!
//! Every component here is non-blocking pure computation over in-memory
//! structures; mutations are serialized behind `parking_lot` locks.

pub mod action;
pub mod attention;
pub mod consciousness;
pub mod decision;
pub mod persona;
pub mod reasoning;
pub mod reflection;
pub mod types;
pub mod world;

pub use action::{ActionCoordinator, ActionOutcome, ActionRecord, ActionState, PlanOutcome};
pub use attention::AttentionManager;
pub use consciousness::Consciousness;
pub use decision::DecisionIntegrator;
pub use persona::PersonaManager;
pub use reasoning::ReasoningEngine;
pub use reflection::ReflectionModule;
pub use types::*;
pub use world::WorldModel;
