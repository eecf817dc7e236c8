//! Action and plan lifecycle coordination
//!
//! Actions move strictly `created -> executing -> {completed|failed}`;
//! plans run their steps in order, each step becoming a fresh action.
//! Resource allocation is a tagged map; feedback is a flat append-only
//! log. Real dispatch to target systems belongs to the domain
//! collaborators; execution here records per-system completion.

use atlas_common::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

/// Lifecycle states of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionState {
    Created,
    Planned,
    Executing,
    Completed,
    Failed,
}

/// Lifecycle states of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanState {
    Created,
    Executing,
    Completed,
    Failed,
}

/// Per-target-system execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemResult {
    pub system: String,
    pub status: String,
}

/// A coordinated action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_id: String,
    pub name: String,
    pub target_systems: Vec<String>,
    pub parameters: HashMap<String, Value>,
    pub priority: u8,
    pub timeout_secs: u64,
    pub state: ActionState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub results: Vec<SystemResult>,
}

/// One ordered step of a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    pub systems: Vec<String>,
    pub parameters: HashMap<String, Value>,
}

/// An ordered multi-step plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    pub plan_id: String,
    pub name: String,
    pub steps: Vec<PlanStep>,
    pub current_step: usize,
    pub state: PlanState,
    pub failed_at_step: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outcome of executing a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action_id: String,
    pub results: Vec<SystemResult>,
}

/// Outcome of executing a plan; completed step indices are always
/// reported, including on failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub plan_id: String,
    pub success: bool,
    pub completed_steps: Vec<usize>,
    pub failed_step: Option<usize>,
}

/// An execution log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub action_id: String,
    pub name: String,
    pub systems: Vec<String>,
    pub state: ActionState,
    pub timestamp: DateTime<Utc>,
}

/// A resource held by an action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub resource_id: String,
    pub action_id: String,
    pub amount: f64,
    pub allocated_at: DateTime<Utc>,
}

/// A feedback log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub action_id: String,
    pub feedback_type: String,
    pub content: String,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    actions: HashMap<String, ActionRecord>,
    plans: HashMap<String, PlanRecord>,
    resources: HashMap<String, ResourceAllocation>,
    feedback: Vec<FeedbackEntry>,
    execution_log: Vec<ExecutionEntry>,
    action_counter: u64,
    plan_counter: u64,
}

/// Coordinates action and plan execution across target systems
pub struct ActionCoordinator {
    inner: RwLock<Inner>,
}

impl Default for ActionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCoordinator {
    pub fn new() -> Self {
        info!("action coordinator started");
        Self {
            inner: RwLock::new(Inner {
                actions: HashMap::new(),
                plans: HashMap::new(),
                resources: HashMap::new(),
                feedback: Vec::new(),
                execution_log: Vec::new(),
                action_counter: 0,
                plan_counter: 0,
            }),
        }
    }

    /// Create an action in the `created` state
    pub fn create_action(
        &self,
        name: impl Into<String>,
        target_systems: Vec<String>,
        parameters: HashMap<String, Value>,
        priority: u8,
        timeout_secs: u64,
    ) -> ActionRecord {
        let mut inner = self.inner.write();
        inner.action_counter += 1;
        let action = ActionRecord {
            action_id: format!("act-{}", inner.action_counter),
            name: name.into(),
            target_systems,
            parameters,
            priority: priority.clamp(1, 10),
            timeout_secs,
            state: ActionState::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            results: Vec::new(),
        };
        inner.actions.insert(action.action_id.clone(), action.clone());
        action
    }

    /// Execute an action. Refuses unknown ids and any state other than
    /// `created` or `planned`; the transition check and the transition
    /// itself happen under one lock, so an action id never executes
    /// twice concurrently.
    pub fn execute_action(&self, action_id: &str) -> Result<ActionOutcome> {
        let mut inner = self.inner.write();
        let action = inner
            .actions
            .get_mut(action_id)
            .ok_or_else(|| Error::NotFound(format!("unknown action: {}", action_id)))?;

        if !matches!(action.state, ActionState::Created | ActionState::Planned) {
            return Err(Error::Validation(format!(
                "action {} is {:?}, not executable",
                action_id, action.state
            )));
        }

        action.state = ActionState::Executing;
        action.started_at = Some(Utc::now());

        let results: Vec<SystemResult> = action
            .target_systems
            .iter()
            .map(|system| SystemResult {
                system: system.clone(),
                status: "completed".to_string(),
            })
            .collect();

        action.state = ActionState::Completed;
        action.completed_at = Some(Utc::now());
        action.results = results.clone();

        let entry = ExecutionEntry {
            action_id: action_id.to_string(),
            name: action.name.clone(),
            systems: action.target_systems.clone(),
            state: ActionState::Completed,
            timestamp: Utc::now(),
        };
        info!("action completed: {}", entry.name);
        inner.execution_log.push(entry);

        Ok(ActionOutcome {
            action_id: action_id.to_string(),
            results,
        })
    }

    /// Create a plan from ordered steps
    pub fn create_plan(&self, name: impl Into<String>, steps: Vec<PlanStep>) -> PlanRecord {
        let mut inner = self.inner.write();
        inner.plan_counter += 1;
        let plan = PlanRecord {
            plan_id: format!("plan-{}", inner.plan_counter),
            name: name.into(),
            steps,
            current_step: 0,
            state: PlanState::Created,
            failed_at_step: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        inner.plans.insert(plan.plan_id.clone(), plan.clone());
        plan
    }

    /// Execute a plan's steps in order, each as a fresh action. A failing
    /// step marks the plan failed at that index; completed step indices
    /// are always returned.
    pub fn execute_plan(&self, plan_id: &str) -> Result<PlanOutcome> {
        let steps = {
            let mut inner = self.inner.write();
            let plan = inner
                .plans
                .get_mut(plan_id)
                .ok_or_else(|| Error::NotFound(format!("unknown plan: {}", plan_id)))?;
            plan.state = PlanState::Executing;
            plan.steps.clone()
        };

        let mut completed_steps = Vec::new();
        for (index, step) in steps.iter().enumerate() {
            {
                let mut inner = self.inner.write();
                if let Some(plan) = inner.plans.get_mut(plan_id) {
                    plan.current_step = index;
                }
            }

            let action = self.create_action(
                step.name.clone(),
                step.systems.clone(),
                step.parameters.clone(),
                5,
                60,
            );

            if let Err(err) = self.execute_action(&action.action_id) {
                let mut inner = self.inner.write();
                if let Some(plan) = inner.plans.get_mut(plan_id) {
                    plan.state = PlanState::Failed;
                    plan.failed_at_step = Some(index);
                }
                info!("plan {} failed at step {}: {}", plan_id, index, err);
                return Ok(PlanOutcome {
                    plan_id: plan_id.to_string(),
                    success: false,
                    completed_steps,
                    failed_step: Some(index),
                });
            }
            completed_steps.push(index);
        }

        let mut inner = self.inner.write();
        if let Some(plan) = inner.plans.get_mut(plan_id) {
            plan.state = PlanState::Completed;
            plan.completed_at = Some(Utc::now());
        }

        Ok(PlanOutcome {
            plan_id: plan_id.to_string(),
            success: true,
            completed_steps,
            failed_step: None,
        })
    }

    /// Allocate a resource to an action; refused only for unknown actions
    pub fn allocate_resource(&self, resource_id: &str, action_id: &str, amount: f64) -> bool {
        let mut inner = self.inner.write();
        if !inner.actions.contains_key(action_id) {
            return false;
        }
        inner.resources.insert(
            format!("{}:{}", resource_id, action_id),
            ResourceAllocation {
                resource_id: resource_id.to_string(),
                action_id: action_id.to_string(),
                amount,
                allocated_at: Utc::now(),
            },
        );
        true
    }

    /// Release a previously allocated resource
    pub fn release_resource(&self, resource_id: &str, action_id: &str) -> bool {
        self.inner
            .write()
            .resources
            .remove(&format!("{}:{}", resource_id, action_id))
            .is_some()
    }

    /// Append feedback for an action
    pub fn add_feedback(
        &self,
        action_id: impl Into<String>,
        feedback_type: impl Into<String>,
        content: impl Into<String>,
        score: f64,
    ) -> FeedbackEntry {
        let entry = FeedbackEntry {
            action_id: action_id.into(),
            feedback_type: feedback_type.into(),
            content: content.into(),
            score: score.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        };
        self.inner.write().feedback.push(entry.clone());
        entry
    }

    pub fn get_action(&self, action_id: &str) -> Option<ActionRecord> {
        self.inner.read().actions.get(action_id).cloned()
    }

    pub fn get_plan(&self, plan_id: &str) -> Option<PlanRecord> {
        self.inner.read().plans.get(plan_id).cloned()
    }

    /// Execution log; `limit` of 0 returns everything
    pub fn execution_log(&self, limit: usize) -> Vec<ExecutionEntry> {
        let inner = self.inner.read();
        if limit > 0 && inner.execution_log.len() > limit {
            inner.execution_log[inner.execution_log.len() - limit..].to_vec()
        } else {
            inner.execution_log.clone()
        }
    }

    /// Feedback entries, optionally filtered by action id
    pub fn feedback(&self, action_id: Option<&str>) -> Vec<FeedbackEntry> {
        let inner = self.inner.read();
        match action_id {
            Some(id) => inner
                .feedback
                .iter()
                .filter(|f| f.action_id == id)
                .cloned()
                .collect(),
            None => inner.feedback.clone(),
        }
    }

    pub fn total_actions(&self) -> usize {
        self.inner.read().actions.len()
    }

    pub fn total_plans(&self) -> usize {
        self.inner.read().plans.len()
    }

    pub fn completed_actions(&self) -> usize {
        self.inner
            .read()
            .actions
            .values()
            .filter(|a| a.state == ActionState::Completed)
            .count()
    }

    pub fn resource_count(&self) -> usize {
        self.inner.read().resources.len()
    }

    pub fn feedback_count(&self) -> usize {
        self.inner.read().feedback.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> ActionCoordinator {
        ActionCoordinator::new()
    }

    #[test]
    fn action_lifecycle_created_to_completed() {
        let c = coordinator();
        let action = c.create_action(
            "scale_up",
            vec!["kubernetes".to_string()],
            HashMap::new(),
            5,
            60,
        );
        assert_eq!(action.state, ActionState::Created);

        let outcome = c.execute_action(&action.action_id).unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].system, "kubernetes");

        let stored = c.get_action(&action.action_id).unwrap();
        assert_eq!(stored.state, ActionState::Completed);
        assert!(stored.started_at.is_some());
        assert_eq!(c.completed_actions(), 1);
        assert_eq!(c.execution_log(0).len(), 1);
    }

    #[test]
    fn completed_action_refuses_re_execution() {
        let c = coordinator();
        let action = c.create_action("once", vec![], HashMap::new(), 5, 60);
        c.execute_action(&action.action_id).unwrap();

        let again = c.execute_action(&action.action_id);
        assert!(matches!(again, Err(Error::Validation(_))));
    }

    #[test]
    fn unknown_action_is_not_found() {
        let c = coordinator();
        assert!(matches!(
            c.execute_action("act-999"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn plan_executes_steps_in_order() {
        let c = coordinator();
        let plan = c.create_plan(
            "rollout",
            vec![
                PlanStep {
                    name: "drain".to_string(),
                    systems: vec!["lb".to_string()],
                    parameters: HashMap::new(),
                },
                PlanStep {
                    name: "deploy".to_string(),
                    systems: vec!["kubernetes".to_string()],
                    parameters: HashMap::new(),
                },
            ],
        );

        let outcome = c.execute_plan(&plan.plan_id).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.completed_steps, vec![0, 1]);
        assert!(outcome.failed_step.is_none());

        let stored = c.get_plan(&plan.plan_id).unwrap();
        assert_eq!(stored.state, PlanState::Completed);
        // Each step became its own action
        assert_eq!(c.total_actions(), 2);

        let log = c.execution_log(0);
        assert_eq!(log[0].name, "drain");
        assert_eq!(log[1].name, "deploy");
    }

    #[test]
    fn unknown_plan_is_not_found() {
        let c = coordinator();
        assert!(matches!(c.execute_plan("plan-9"), Err(Error::NotFound(_))));
    }

    #[test]
    fn resources_require_a_known_action() {
        let c = coordinator();
        assert!(!c.allocate_resource("gpu", "act-404", 1.0));

        let action = c.create_action("train", vec![], HashMap::new(), 5, 60);
        assert!(c.allocate_resource("gpu", &action.action_id, 0.5));
        assert_eq!(c.resource_count(), 1);

        assert!(c.release_resource("gpu", &action.action_id));
        assert!(!c.release_resource("gpu", &action.action_id));
        assert_eq!(c.resource_count(), 0);
    }

    #[test]
    fn feedback_is_append_only_and_filterable() {
        let c = coordinator();
        let action = c.create_action("act", vec![], HashMap::new(), 5, 60);
        c.add_feedback(&action.action_id, "outcome", "went well", 0.9);
        c.add_feedback("act-other", "outcome", "meh", 2.0);

        assert_eq!(c.feedback_count(), 2);
        let filtered = c.feedback(Some(&action.action_id));
        assert_eq!(filtered.len(), 1);
        // Scores are clamped into [0, 1]
        assert!((c.feedback(Some("act-other"))[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn execution_log_respects_limit() {
        let c = coordinator();
        for n in 0..5 {
            let action = c.create_action(format!("a{}", n), vec![], HashMap::new(), 5, 60);
            c.execute_action(&action.action_id).unwrap();
        }
        assert_eq!(c.execution_log(2).len(), 2);
        assert_eq!(c.execution_log(0).len(), 5);
    }
}
