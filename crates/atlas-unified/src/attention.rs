//! Bounded-capacity attention allocation
//!
//! Foci and background tasks share one capacity ledger; the sum of
//! allocated capacity never exceeds the total budget. Interrupts and
//! context switches push displaced foci onto a LIFO context stack.
//! Ordering ties resolve by insertion order.

use crate::types::{clamp_unit, round3, AttentionFocus, AttentionState};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// A background claim on the attention budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTask {
    pub task_id: String,
    pub description: String,
    pub capacity: f64,
    pub started_at: DateTime<Utc>,
}

/// Record of an interrupt attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptRecord {
    pub source: String,
    pub priority: u8,
    pub description: String,
    pub accepted: bool,
    pub timestamp: DateTime<Utc>,
}

/// A focus saved on the context stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedContext {
    pub target: String,
    pub priority: u8,
    pub capacity: f64,
    pub context: HashMap<String, Value>,
    pub saved_at: DateTime<Utc>,
}

/// Result of a context switch
#[derive(Debug, Clone)]
pub struct ContextSwitch {
    pub switched: bool,
    pub from: Uuid,
    pub to: Option<Uuid>,
    pub stack_depth: usize,
}

/// Result of a context restore
#[derive(Debug, Clone)]
pub struct RestoredContext {
    pub restored: bool,
    pub target: String,
    pub focus_id: Option<Uuid>,
}

struct Inner {
    // Vec keeps insertion order so priority ties resolve first-come
    focuses: Vec<AttentionFocus>,
    background: Vec<BackgroundTask>,
    interrupts: Vec<InterruptRecord>,
    context_stack: Vec<SavedContext>,
}

// Tolerance for float drift in the capacity ledger; a claim within this
// of the available budget is admitted
const CAPACITY_EPSILON: f64 = 1e-9;

/// Allocates a bounded capacity budget across foci and background tasks
pub struct AttentionManager {
    total_capacity: f64,
    inner: RwLock<Inner>,
}

impl AttentionManager {
    pub fn new(total_capacity: f64) -> Self {
        info!("attention manager started (capacity={:.1})", total_capacity);
        Self {
            total_capacity,
            inner: RwLock::new(Inner {
                focuses: Vec::new(),
                background: Vec::new(),
                interrupts: Vec::new(),
                context_stack: Vec::new(),
            }),
        }
    }

    /// Claim capacity for a new focus. Returns None and leaves the ledger
    /// untouched when the claim would exceed the total budget.
    pub fn focus_on(
        &self,
        target: impl Into<String>,
        priority: u8,
        capacity: f64,
        context: HashMap<String, Value>,
    ) -> Option<AttentionFocus> {
        let mut inner = self.inner.write();
        let available = self.total_capacity - Self::used_of(&inner);
        if capacity - available > CAPACITY_EPSILON {
            return None;
        }

        let focus = AttentionFocus {
            focus_id: Uuid::new_v4(),
            target: target.into(),
            priority: priority.clamp(1, 10),
            state: AttentionState::Focused,
            allocated_capacity: clamp_unit(capacity),
            context,
            created_at: Utc::now(),
        };
        info!(
            "focus acquired: {} (priority={}, capacity={:.2})",
            focus.target, focus.priority, focus.allocated_capacity
        );
        inner.focuses.push(focus.clone());
        Some(focus)
    }

    /// Release a focus, returning its capacity to the budget
    pub fn release_focus(&self, focus_id: Uuid) -> bool {
        let mut inner = self.inner.write();
        let before = inner.focuses.len();
        inner.focuses.retain(|f| f.focus_id != focus_id);
        inner.focuses.len() != before
    }

    /// Change a focus priority
    pub fn reprioritize(&self, focus_id: Uuid, new_priority: u8) -> bool {
        let mut inner = self.inner.write();
        match inner.focuses.iter_mut().find(|f| f.focus_id == focus_id) {
            Some(focus) => {
                focus.priority = new_priority.clamp(1, 10);
                true
            }
            None => false,
        }
    }

    /// Highest-priority focus; ties go to the earliest insertion
    pub fn highest_priority(&self) -> Option<AttentionFocus> {
        let inner = self.inner.read();
        let mut best: Option<&AttentionFocus> = None;
        for focus in &inner.focuses {
            if best.map_or(true, |b| focus.priority > b.priority) {
                best = Some(focus);
            }
        }
        best.cloned()
    }

    /// Add a background task sharing the same capacity ledger
    pub fn add_background_task(
        &self,
        task_id: impl Into<String>,
        description: impl Into<String>,
        capacity: f64,
    ) -> bool {
        let mut inner = self.inner.write();
        if capacity - (self.total_capacity - Self::used_of(&inner)) > CAPACITY_EPSILON {
            return false;
        }
        inner.background.push(BackgroundTask {
            task_id: task_id.into(),
            description: description.into(),
            capacity,
            started_at: Utc::now(),
        });
        true
    }

    pub fn remove_background_task(&self, task_id: &str) -> bool {
        let mut inner = self.inner.write();
        let before = inner.background.len();
        inner.background.retain(|t| t.task_id != task_id);
        inner.background.len() != before
    }

    /// Handle an interrupt: accepted when there is no current focus or
    /// the interrupt's priority strictly exceeds the top focus. The
    /// interrupted focus keeps its capacity and its context is pushed
    /// onto the stack.
    pub fn handle_interrupt(
        &self,
        source: impl Into<String>,
        priority: u8,
        description: impl Into<String>,
    ) -> InterruptRecord {
        let top = self.highest_priority();
        let accepted = top.as_ref().map_or(true, |t| priority > t.priority);

        let record = InterruptRecord {
            source: source.into(),
            priority,
            description: description.into(),
            accepted,
            timestamp: Utc::now(),
        };

        let mut inner = self.inner.write();
        inner.interrupts.push(record.clone());

        if accepted {
            if let Some(top) = top {
                if let Some(focus) = inner.focuses.iter_mut().find(|f| f.focus_id == top.focus_id)
                {
                    focus.state = AttentionState::Interrupted;
                    let saved = SavedContext {
                        target: focus.target.clone(),
                        priority: focus.priority,
                        capacity: focus.allocated_capacity,
                        context: focus.context.clone(),
                        saved_at: Utc::now(),
                    };
                    inner.context_stack.push(saved);
                }
            }
        }
        record
    }

    /// Save and release the source focus, then try to acquire the target.
    /// The released focus's capacity funds the new one (0.3 when the
    /// source focus is unknown).
    pub fn switch_context(
        &self,
        from_focus_id: Uuid,
        to_target: impl Into<String>,
        priority: u8,
    ) -> ContextSwitch {
        let capacity = {
            let mut inner = self.inner.write();
            match inner
                .focuses
                .iter_mut()
                .find(|f| f.focus_id == from_focus_id)
            {
                Some(focus) => {
                    focus.state = AttentionState::Switching;
                    let saved = SavedContext {
                        target: focus.target.clone(),
                        priority: focus.priority,
                        capacity: focus.allocated_capacity,
                        context: focus.context.clone(),
                        saved_at: Utc::now(),
                    };
                    let capacity = focus.allocated_capacity;
                    inner.context_stack.push(saved);
                    inner.focuses.retain(|f| f.focus_id != from_focus_id);
                    capacity
                }
                None => 0.3,
            }
        };

        let new_focus = self.focus_on(to_target, priority, capacity, HashMap::new());
        let stack_depth = self.context_depth();
        ContextSwitch {
            switched: new_focus.is_some(),
            from: from_focus_id,
            to: new_focus.map(|f| f.focus_id),
            stack_depth,
        }
    }

    /// Pop the context stack and try to re-acquire the saved focus.
    /// Returns None on an empty stack; the re-acquisition itself may
    /// fail when capacity is no longer available.
    pub fn restore_context(&self) -> Option<RestoredContext> {
        let saved = self.inner.write().context_stack.pop()?;
        let focus = self.focus_on(
            saved.target.clone(),
            saved.priority,
            saved.capacity,
            saved.context,
        );
        Some(RestoredContext {
            restored: focus.is_some(),
            target: saved.target,
            focus_id: focus.map(|f| f.focus_id),
        })
    }

    pub fn get_focus(&self, focus_id: Uuid) -> Option<AttentionFocus> {
        self.inner
            .read()
            .focuses
            .iter()
            .find(|f| f.focus_id == focus_id)
            .cloned()
    }

    /// All foci, highest priority first; ties keep insertion order
    pub fn all_focuses(&self) -> Vec<AttentionFocus> {
        let mut focuses = self.inner.read().focuses.clone();
        focuses.sort_by(|a, b| b.priority.cmp(&a.priority));
        focuses
    }

    fn used_of(inner: &Inner) -> f64 {
        let focus_cap: f64 = inner.focuses.iter().map(|f| f.allocated_capacity).sum();
        let bg_cap: f64 = inner.background.iter().map(|t| t.capacity).sum();
        round3(focus_cap + bg_cap)
    }

    /// Capacity currently claimed by foci and background tasks
    pub fn used_capacity(&self) -> f64 {
        Self::used_of(&self.inner.read())
    }

    /// Capacity still available
    pub fn available_capacity(&self) -> f64 {
        round3(self.total_capacity - self.used_capacity())
    }

    pub fn total_capacity(&self) -> f64 {
        self.total_capacity
    }

    pub fn focus_count(&self) -> usize {
        self.inner.read().focuses.len()
    }

    pub fn background_count(&self) -> usize {
        self.inner.read().background.len()
    }

    pub fn interrupt_count(&self) -> usize {
        self.inner.read().interrupts.len()
    }

    pub fn context_depth(&self) -> usize {
        self.inner.read().context_stack.len()
    }
}
