//! Execution history with success, duration, and resource analysis

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// One recorded command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub task_id: String,
    pub command: String,
    pub success: bool,
    pub duration_ms: f64,
    pub resource_usage: HashMap<String, f64>,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate success numbers for a command filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessRate {
    pub rate: f64,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
}

/// Duration statistics for a command filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurationPattern {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub count: usize,
}

/// Generated optimization hint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizationHint {
    SlowCommand {
        command: String,
        avg_ms: f64,
        hint: String,
    },
    HighFailure {
        command: String,
        failure_rate: f64,
        hint: String,
    },
}

struct Inner {
    executions: Vec<ExecutionRecord>,
    hints: Vec<OptimizationHint>,
    counter: u64,
    successes: usize,
    failures: usize,
}

/// Stores task execution history and derives optimization hints
pub struct ExecutionMemory {
    inner: RwLock<Inner>,
}

impl Default for ExecutionMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionMemory {
    pub fn new() -> Self {
        info!("execution memory started");
        Self {
            inner: RwLock::new(Inner {
                executions: Vec::new(),
                hints: Vec::new(),
                counter: 0,
                successes: 0,
                failures: 0,
            }),
        }
    }

    /// Record an execution
    pub fn record_execution(
        &self,
        task_id: impl Into<String>,
        command: impl Into<String>,
        success: bool,
        duration_ms: f64,
        resource_usage: HashMap<String, f64>,
        error: impl Into<String>,
    ) -> ExecutionRecord {
        let mut inner = self.inner.write();
        inner.counter += 1;
        let record = ExecutionRecord {
            execution_id: format!("exec-{}", inner.counter),
            task_id: task_id.into(),
            command: command.into(),
            success,
            duration_ms,
            resource_usage,
            error: error.into(),
            timestamp: Utc::now(),
        };
        if success {
            inner.successes += 1;
        } else {
            inner.failures += 1;
        }
        inner.executions.push(record.clone());
        record
    }

    /// Success rate, optionally restricted to one command
    pub fn success_rate(&self, command: Option<&str>) -> SuccessRate {
        let inner = self.inner.read();
        let matching: Vec<&ExecutionRecord> = inner
            .executions
            .iter()
            .filter(|e| command.map_or(true, |c| e.command == c))
            .collect();

        if matching.is_empty() {
            return SuccessRate {
                rate: 0.0,
                total: 0,
                successes: 0,
                failures: 0,
            };
        }

        let successes = matching.iter().filter(|e| e.success).count();
        SuccessRate {
            rate: round3(successes as f64 / matching.len() as f64),
            total: matching.len(),
            successes,
            failures: matching.len() - successes,
        }
    }

    /// Duration statistics over executions with a positive duration
    pub fn duration_patterns(&self, command: Option<&str>) -> DurationPattern {
        let inner = self.inner.read();
        let durations: Vec<f64> = inner
            .executions
            .iter()
            .filter(|e| command.map_or(true, |c| e.command == c))
            .map(|e| e.duration_ms)
            .filter(|d| *d > 0.0)
            .collect();

        if durations.is_empty() {
            return DurationPattern {
                avg_ms: 0.0,
                min_ms: 0.0,
                max_ms: 0.0,
                count: 0,
            };
        }

        DurationPattern {
            avg_ms: (durations.iter().sum::<f64>() / durations.len() as f64 * 10.0).round() / 10.0,
            min_ms: durations.iter().cloned().fold(f64::INFINITY, f64::min),
            max_ms: durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            count: durations.len(),
        }
    }

    /// Average numeric resource usage, optionally per command
    pub fn resource_usage(&self, command: Option<&str>) -> HashMap<String, f64> {
        let inner = self.inner.read();
        let usages: Vec<&HashMap<String, f64>> = inner
            .executions
            .iter()
            .filter(|e| command.map_or(true, |c| e.command == c))
            .map(|e| &e.resource_usage)
            .filter(|u| !u.is_empty())
            .collect();

        if usages.is_empty() {
            return HashMap::new();
        }

        let mut totals: HashMap<String, f64> = HashMap::new();
        for usage in &usages {
            for (key, value) in *usage {
                *totals.entry(key.clone()).or_default() += value;
            }
        }
        totals
            .into_iter()
            .map(|(k, v)| (k, (v / usages.len() as f64 * 100.0).round() / 100.0))
            .collect()
    }

    /// Derive optimization hints: commands averaging over 5 seconds, and
    /// commands failing more than 30% of the time across at least 3 runs
    pub fn generate_hints(&self) -> Vec<OptimizationHint> {
        let mut inner = self.inner.write();
        let mut hints = Vec::new();

        let mut durations: HashMap<String, Vec<f64>> = HashMap::new();
        let mut failures: HashMap<String, usize> = HashMap::new();
        let mut totals: HashMap<String, usize> = HashMap::new();
        for execution in &inner.executions {
            *totals.entry(execution.command.clone()).or_default() += 1;
            if !execution.success {
                *failures.entry(execution.command.clone()).or_default() += 1;
            }
            if execution.duration_ms > 0.0 {
                durations
                    .entry(execution.command.clone())
                    .or_default()
                    .push(execution.duration_ms);
            }
        }

        for (command, values) in &durations {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            if avg > 5000.0 {
                hints.push(OptimizationHint::SlowCommand {
                    command: command.clone(),
                    avg_ms: (avg * 10.0).round() / 10.0,
                    hint: format!(
                        "'{}' is slow ({:.0}ms avg). Consider caching.",
                        command, avg
                    ),
                });
            }
        }

        for (command, fail_count) in &failures {
            let total = totals.get(command).copied().unwrap_or(1);
            let rate = *fail_count as f64 / total as f64;
            if rate > 0.3 && total >= 3 {
                hints.push(OptimizationHint::HighFailure {
                    command: command.clone(),
                    failure_rate: (rate * 100.0).round() / 100.0,
                    hint: format!(
                        "'{}' has a {:.0}% failure rate. Review its logic.",
                        command,
                        rate * 100.0
                    ),
                });
            }
        }

        inner.hints = hints.clone();
        hints
    }

    /// Execution history with optional filters, newest-last, capped at
    /// `limit` entries
    pub fn history(
        &self,
        task_id: Option<&str>,
        command: Option<&str>,
        success: Option<bool>,
        limit: usize,
    ) -> Vec<ExecutionRecord> {
        let inner = self.inner.read();
        let matching: Vec<ExecutionRecord> = inner
            .executions
            .iter()
            .filter(|e| task_id.map_or(true, |t| e.task_id == t))
            .filter(|e| command.map_or(true, |c| e.command == c))
            .filter(|e| success.map_or(true, |s| e.success == s))
            .cloned()
            .collect();
        if matching.len() > limit {
            matching[matching.len() - limit..].to_vec()
        } else {
            matching
        }
    }

    pub fn execution_count(&self) -> usize {
        self.inner.read().executions.len()
    }

    /// Overall success rate across all executions
    pub fn overall_success_rate(&self) -> f64 {
        let inner = self.inner.read();
        if inner.executions.is_empty() {
            return 0.0;
        }
        round3(inner.successes as f64 / inner.executions.len() as f64)
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> ExecutionMemory {
        ExecutionMemory::new()
    }

    #[test]
    fn success_rate_overall_and_per_command() {
        let m = memory();
        m.record_execution("t1", "backup", true, 100.0, HashMap::new(), "");
        m.record_execution("t2", "backup", false, 120.0, HashMap::new(), "disk full");
        m.record_execution("t3", "deploy", true, 300.0, HashMap::new(), "");

        let all = m.success_rate(None);
        assert_eq!(all.total, 3);
        assert!((all.rate - round3(2.0 / 3.0)).abs() < 1e-9);

        let backup = m.success_rate(Some("backup"));
        assert_eq!(backup.total, 2);
        assert_eq!(backup.failures, 1);
        assert!((backup.rate - 0.5).abs() < 1e-9);

        let missing = m.success_rate(Some("ghost"));
        assert_eq!(missing.total, 0);
        assert!((missing.rate - 0.0).abs() < 1e-9);
    }

    #[test]
    fn duration_patterns_skip_zero_durations() {
        let m = memory();
        m.record_execution("t", "scan", true, 0.0, HashMap::new(), "");
        m.record_execution("t", "scan", true, 200.0, HashMap::new(), "");
        m.record_execution("t", "scan", true, 400.0, HashMap::new(), "");

        let pattern = m.duration_patterns(Some("scan"));
        assert_eq!(pattern.count, 2);
        assert!((pattern.avg_ms - 300.0).abs() < 1e-9);
        assert!((pattern.min_ms - 200.0).abs() < 1e-9);
        assert!((pattern.max_ms - 400.0).abs() < 1e-9);
    }

    #[test]
    fn resource_usage_averages_by_key() {
        let m = memory();
        m.record_execution(
            "t",
            "train",
            true,
            10.0,
            HashMap::from([("cpu".to_string(), 0.4), ("mem_mb".to_string(), 100.0)]),
            "",
        );
        m.record_execution(
            "t",
            "train",
            true,
            10.0,
            HashMap::from([("cpu".to_string(), 0.8)]),
            "",
        );

        let usage = m.resource_usage(Some("train"));
        assert!((usage["cpu"] - 0.6).abs() < 1e-9);
        assert!((usage["mem_mb"] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn hints_flag_slow_and_flaky_commands() {
        let m = memory();
        for _ in 0..3 {
            m.record_execution("t", "slow_job", true, 8000.0, HashMap::new(), "");
        }
        for n in 0..4 {
            m.record_execution("t", "flaky", n == 0, 10.0, HashMap::new(), "boom");
        }
        m.record_execution("t", "fine", true, 50.0, HashMap::new(), "");

        let hints = m.generate_hints();
        assert_eq!(hints.len(), 2);
        assert!(hints.iter().any(|h| matches!(
            h,
            OptimizationHint::SlowCommand { command, .. } if command == "slow_job"
        )));
        assert!(hints.iter().any(|h| matches!(
            h,
            OptimizationHint::HighFailure { command, failure_rate, .. }
                if command == "flaky" && *failure_rate > 0.7
        )));
    }

    #[test]
    fn history_filters_compose() {
        let m = memory();
        m.record_execution("t1", "a", true, 1.0, HashMap::new(), "");
        m.record_execution("t1", "b", false, 1.0, HashMap::new(), "err");
        m.record_execution("t2", "a", false, 1.0, HashMap::new(), "err");

        assert_eq!(m.history(Some("t1"), None, None, 20).len(), 2);
        assert_eq!(m.history(None, Some("a"), None, 20).len(), 2);
        assert_eq!(m.history(None, Some("a"), Some(false), 20).len(), 1);
        assert_eq!(m.history(None, None, None, 2).len(), 2);
        assert_eq!(m.execution_count(), 3);
        assert!((m.overall_success_rate() - round3(1.0 / 3.0)).abs() < 1e-9);
    }
}
