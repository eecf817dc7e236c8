//! Task memory collaborator for the ATLAS agent core
//!
//! Thin bookkeeping layer built on top of the core's action primitives:
//! an execution history with success/duration/resource analysis and a
//! command alias table.

pub mod alias;
pub mod execution_memory;

pub use alias::{AliasTracker, ResolvedAlias};
pub use execution_memory::{ExecutionMemory, ExecutionRecord, OptimizationHint};
