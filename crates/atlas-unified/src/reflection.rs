//! Typed self-reflection records
//!
//! Five record kinds: self-evaluation, performance analysis, bias
//! detection, improvement identification, and learning consolidation.
//! The overall score is the mean across all records, defaulting to 0.5
//! when nothing has been recorded yet.

use crate::types::{clamp_unit, round3, ReflectionRecord, ReflectionType};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// A detected bias observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasObservation {
    pub context: String,
    pub observation: String,
    pub bias_type: String,
    pub severity: f64,
    pub timestamp: DateTime<Utc>,
}

/// An identified improvement opportunity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementItem {
    pub area: String,
    pub current_state: String,
    pub desired_state: String,
    pub priority: String,
    pub actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// A consolidated learning entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consolidation {
    pub topic: String,
    pub insights: Vec<String>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

struct Inner {
    records: HashMap<Uuid, ReflectionRecord>,
    metrics: HashMap<String, Vec<f64>>,
    biases: Vec<BiasObservation>,
    improvements: Vec<ImprovementItem>,
    consolidations: Vec<Consolidation>,
}

/// Records and scores typed reflections
pub struct ReflectionModule {
    inner: RwLock<Inner>,
}

impl Default for ReflectionModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ReflectionModule {
    pub fn new() -> Self {
        info!("reflection module started");
        Self {
            inner: RwLock::new(Inner {
                records: HashMap::new(),
                metrics: HashMap::new(),
                biases: Vec::new(),
                improvements: Vec::new(),
                consolidations: Vec::new(),
            }),
        }
    }

    /// Self-evaluation over named criteria. Each clamped criterion score
    /// is classified into a good / adequate / weak band; the record
    /// score is the mean (0.5 for an empty criteria set).
    pub fn self_evaluate(&self, subject: &str, criteria: &[(String, f64)]) -> ReflectionRecord {
        let mut findings = Vec::new();
        let mut total = 0.0;

        for (criterion, score) in criteria {
            let clamped = clamp_unit(*score);
            total += clamped;
            let band = if clamped >= 0.7 {
                "good"
            } else if clamped >= 0.4 {
                "adequate"
            } else {
                "weak"
            };
            findings.push(format!("{}: {} ({:.1})", criterion, band, clamped));
        }

        let score = if criteria.is_empty() {
            0.5
        } else {
            total / criteria.len() as f64
        };

        let record = ReflectionRecord {
            record_id: Uuid::new_v4(),
            reflection_type: ReflectionType::SelfEvaluation,
            subject: subject.to_string(),
            findings,
            improvements: Vec::new(),
            score: round3(score),
            created_at: Utc::now(),
        };
        self.store(record.clone());
        info!("self evaluation: {} (score={:.2})", subject, score);
        record
    }

    /// Performance analysis of a metric series: average, trend, min and
    /// max findings; a falling trend emits an improvement suggestion.
    pub fn analyze_performance(&self, metric_name: &str, values: &[f64]) -> ReflectionRecord {
        self.inner
            .write()
            .metrics
            .entry(metric_name.to_string())
            .or_default()
            .extend_from_slice(values);

        let mut findings = Vec::new();
        let mut improvements = Vec::new();
        let score;

        if values.is_empty() {
            score = 0.5;
        } else {
            let avg = values.iter().sum::<f64>() / values.len() as f64;
            let trend = if values.len() >= 2 {
                let (first, last) = (values[0], values[values.len() - 1]);
                if last > first {
                    "rising"
                } else if last < first {
                    "falling"
                } else {
                    "stable"
                }
            } else {
                "stable"
            };
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            findings.push(format!("Average: {:.3}", avg));
            findings.push(format!("Trend: {}", trend));
            findings.push(format!("Min: {:.3}, Max: {:.3}", min, max));

            if trend == "falling" {
                improvements.push(format!("Investigate the decline in {}", metric_name));
            }

            score = if (0.0..=1.0).contains(&avg) {
                round3(avg)
            } else {
                0.5
            };
        }

        let record = ReflectionRecord {
            record_id: Uuid::new_v4(),
            reflection_type: ReflectionType::Performance,
            subject: metric_name.to_string(),
            findings,
            improvements,
            score,
            created_at: Utc::now(),
        };
        self.store(record.clone());
        record
    }

    /// Record a detected bias; the record scores `1 - severity`
    pub fn detect_bias(
        &self,
        context: &str,
        observation: &str,
        bias_type: &str,
        severity: f64,
    ) -> ReflectionRecord {
        let severity = clamp_unit(severity);
        self.inner.write().biases.push(BiasObservation {
            context: context.to_string(),
            observation: observation.to_string(),
            bias_type: bias_type.to_string(),
            severity,
            timestamp: Utc::now(),
        });

        let record = ReflectionRecord {
            record_id: Uuid::new_v4(),
            reflection_type: ReflectionType::BiasCheck,
            subject: context.to_string(),
            findings: vec![
                format!("Bias type: {}", bias_type),
                format!("Observation: {}", observation),
                format!("Severity: {:.1}", severity),
            ],
            improvements: Vec::new(),
            score: round3(1.0 - severity),
            created_at: Utc::now(),
        };
        self.store(record.clone());
        info!("bias detected: {} ({})", context, bias_type);
        record
    }

    /// Record an improvement opportunity with its action items
    pub fn identify_improvement(
        &self,
        area: &str,
        current_state: &str,
        desired_state: &str,
        priority: &str,
        actions: Vec<String>,
    ) -> ReflectionRecord {
        self.inner.write().improvements.push(ImprovementItem {
            area: area.to_string(),
            current_state: current_state.to_string(),
            desired_state: desired_state.to_string(),
            priority: priority.to_string(),
            actions: actions.clone(),
            timestamp: Utc::now(),
        });

        let record = ReflectionRecord {
            record_id: Uuid::new_v4(),
            reflection_type: ReflectionType::Improvement,
            subject: area.to_string(),
            findings: vec![
                format!("Current: {}", current_state),
                format!("Desired: {}", desired_state),
            ],
            improvements: actions,
            score: 0.5,
            created_at: Utc::now(),
        };
        self.store(record.clone());
        record
    }

    /// Consolidate key insights on a topic
    pub fn consolidate_learning(
        &self,
        topic: &str,
        key_insights: Vec<String>,
        confidence: f64,
    ) -> ReflectionRecord {
        let confidence = clamp_unit(confidence);
        self.inner.write().consolidations.push(Consolidation {
            topic: topic.to_string(),
            insights: key_insights.clone(),
            confidence,
            timestamp: Utc::now(),
        });

        let record = ReflectionRecord {
            record_id: Uuid::new_v4(),
            reflection_type: ReflectionType::Consolidation,
            subject: topic.to_string(),
            findings: key_insights,
            improvements: Vec::new(),
            score: round3(confidence),
            created_at: Utc::now(),
        };
        self.store(record.clone());
        record
    }

    fn store(&self, record: ReflectionRecord) {
        self.inner.write().records.insert(record.record_id, record);
    }

    pub fn get_record(&self, record_id: Uuid) -> Option<ReflectionRecord> {
        self.inner.read().records.get(&record_id).cloned()
    }

    pub fn records_by_type(&self, reflection_type: ReflectionType) -> Vec<ReflectionRecord> {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| r.reflection_type == reflection_type)
            .cloned()
            .collect()
    }

    pub fn biases(&self) -> Vec<BiasObservation> {
        self.inner.read().biases.clone()
    }

    /// Improvement items, optionally filtered by priority
    pub fn improvements(&self, priority: Option<&str>) -> Vec<ImprovementItem> {
        let inner = self.inner.read();
        match priority {
            Some(priority) => inner
                .improvements
                .iter()
                .filter(|i| i.priority == priority)
                .cloned()
                .collect(),
            None => inner.improvements.clone(),
        }
    }

    /// Mean score across all records; 0.5 when empty
    pub fn overall_score(&self) -> f64 {
        let inner = self.inner.read();
        if inner.records.is_empty() {
            return 0.5;
        }
        let total: f64 = inner.records.values().map(|r| r.score).sum();
        round3(total / inner.records.len() as f64)
    }

    pub fn total_records(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn bias_count(&self) -> usize {
        self.inner.read().biases.len()
    }

    pub fn improvement_count(&self) -> usize {
        self.inner.read().improvements.len()
    }

    pub fn consolidation_count(&self) -> usize {
        self.inner.read().consolidations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> ReflectionModule {
        ReflectionModule::new()
    }

    #[test]
    fn self_evaluation_classifies_and_averages() {
        let m = module();
        let record = m.self_evaluate(
            "cycle 1",
            &[
                ("attention".to_string(), 0.9),
                ("decisions".to_string(), 0.5),
                ("actions".to_string(), 0.2),
                ("overflow".to_string(), 1.7),
            ],
        );

        assert_eq!(record.reflection_type, ReflectionType::SelfEvaluation);
        assert!(record.findings[0].contains("good"));
        assert!(record.findings[1].contains("adequate"));
        assert!(record.findings[2].contains("weak"));
        // The out-of-range criterion is clamped to 1.0 before averaging
        assert!((record.score - round3((0.9 + 0.5 + 0.2 + 1.0) / 4.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_criteria_scores_neutral() {
        let m = module();
        let record = m.self_evaluate("empty", &[]);
        assert!((record.score - 0.5).abs() < 1e-9);
        assert!(record.findings.is_empty());
    }

    #[test]
    fn performance_analysis_detects_falling_trend() {
        let m = module();
        let record = m.analyze_performance("success_rate", &[0.9, 0.7, 0.4]);

        assert!(record.findings.iter().any(|f| f.contains("falling")));
        assert_eq!(record.improvements.len(), 1);
        assert!(record.improvements[0].contains("success_rate"));

        let rising = m.analyze_performance("throughput", &[0.2, 0.6]);
        assert!(rising.findings.iter().any(|f| f.contains("rising")));
        assert!(rising.improvements.is_empty());
    }

    #[test]
    fn performance_score_falls_back_outside_unit_range() {
        let m = module();
        let record = m.analyze_performance("latency_ms", &[120.0, 80.0, 100.0]);
        assert!((record.score - 0.5).abs() < 1e-9);

        let empty = m.analyze_performance("nothing", &[]);
        assert!((empty.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn bias_score_inverts_severity() {
        let m = module();
        let record = m.detect_bias("routing", "prefers cheap path", "recency", 0.8);
        assert!((record.score - 0.2).abs() < 1e-9);
        assert_eq!(m.bias_count(), 1);
    }

    #[test]
    fn improvements_filter_by_priority() {
        let m = module();
        m.identify_improvement("alerting", "noisy", "quiet", "high", vec!["dedupe".to_string()]);
        m.identify_improvement("docs", "sparse", "full", "low", vec![]);

        assert_eq!(m.improvements(Some("high")).len(), 1);
        assert_eq!(m.improvements(None).len(), 2);
        assert_eq!(m.improvement_count(), 2);
    }

    #[test]
    fn overall_score_averages_records() {
        let m = module();
        assert!((m.overall_score() - 0.5).abs() < 1e-9);

        m.consolidate_learning("retries", vec!["backoff works".to_string()], 1.0);
        m.detect_bias("ctx", "obs", "anchoring", 1.0); // scores 0.0
        assert!((m.overall_score() - 0.5).abs() < 1e-9);
        assert_eq!(m.total_records(), 2);
        assert_eq!(m.consolidation_count(), 1);
    }

    #[test]
    fn records_queryable_by_type_and_id() {
        let m = module();
        let record = m.self_evaluate("s", &[]);
        assert!(m.get_record(record.record_id).is_some());
        assert_eq!(m.records_by_type(ReflectionType::SelfEvaluation).len(), 1);
        assert!(m.records_by_type(ReflectionType::BiasCheck).is_empty());
    }
}
