//! Top-level facade for the ATLAS agent core
//!
//! [`AtlasCore`] owns the unified subsystems and drives the cognitive
//! cycle: perceive, think, decide, act, reflect. The resilience fabric
//! (`atlas-resilience`) runs alongside it and guards the calls that
//! leave the process.

mod core;

pub use crate::core::{
    AtlasCore, CycleSummary, DecisionOption, DecisionOutcome, Perception, PerceptionInput,
    ReflectResult, ThinkResult,
};
