//! End-to-end scenarios across the unified core and resilience fabric

use atlas_common::config::{CoreConfig, OfflineSettings};
use atlas_common::{Error, Result};
use atlas_core::{AtlasCore, DecisionOption, PerceptionInput};
use atlas_resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use atlas_resilience::fallback::{AutonomousFallback, EmergencyLevel, FallbackSource};
use atlas_resilience::failover::{FailoverManager, HealthCheck};
use atlas_resilience::inference::{FallbackAction, RiskLevel};
use atlas_resilience::offline::{
    ConnectionStatus, NullDispatcher, OfflineManager, ServiceProbe, SyncItem, SyncOperation,
};
use atlas_resilience::persistence::StatePersistence;
use atlas_unified::types::DecisionSource;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn full_cognitive_cycle() {
    let core = AtlasCore::new(&CoreConfig {
        consciousness_level: "medium".to_string(),
        reasoning_depth: 10,
        reflection_interval_secs: 3600,
        persona_consistency: 0.8,
    });

    let perception = core.perceive(
        "monitor",
        HashMap::from([
            ("cpu".to_string(), json!(95)),
            ("priority".to_string(), json!(9)),
        ]),
    );
    assert_eq!(perception.priority, 9);
    assert!(core.world().get_entity(perception.entity_id).is_some());

    let thought = core.think(
        "CPU too high",
        &["CPU 95%".to_string(), "Service slow".to_string()],
    );
    assert!(thought.confidence >= 0.5);
    let chain = core.reasoning().get_chain(thought.chain_id).unwrap();
    assert_eq!(
        chain.reasoning_type,
        atlas_unified::types::ReasoningType::Logical
    );

    let decision = core
        .decide(
            "scale?",
            &[
                DecisionOption {
                    source: DecisionSource::Bdi,
                    action: "scale_up".to_string(),
                    confidence: 0.8,
                    reasoning: "sustained load".to_string(),
                },
                DecisionOption {
                    source: DecisionSource::Probabilistic,
                    action: "scale_up".to_string(),
                    confidence: 0.7,
                    reasoning: "trend continues".to_string(),
                },
                DecisionOption {
                    source: DecisionSource::Emotional,
                    action: "alert".to_string(),
                    confidence: 0.4,
                    reasoning: String::new(),
                },
            ],
        )
        .unwrap();
    assert_eq!(decision.chosen_action, "scale_up");
    assert!(decision.consistent);

    let action = core
        .act("scale_up", vec!["kubernetes".to_string()], HashMap::new())
        .unwrap();
    assert_eq!(action.results[0].system, "kubernetes");

    let reflection = core.reflect();
    assert!(reflection.score > 0.0 && reflection.score <= 1.0);

    let summary = core.run_cycle(vec![PerceptionInput {
        source: "scanner".to_string(),
        data: HashMap::new(),
    }]);
    assert_eq!(summary.perceptions, 1);
}

#[tokio::test]
async fn circuit_breaker_trips_and_fails_fast() {
    let breaker = CircuitBreaker::new(
        "cloud",
        CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(10),
            half_open_max_calls: 3,
        },
    );

    for _ in 0..3 {
        let result: Result<()> = breaker
            .execute(|| async { Err(Error::Network("unreachable".into())) })
            .await;
        assert!(result.is_err());
    }
    assert_eq!(breaker.state().await, CircuitState::Open);

    let calls = AtomicU32::new(0);
    let rejected: Result<()> = breaker
        .execute(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(matches!(rejected, Err(Error::CircuitOpen(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

struct FixedHealth(bool);

#[async_trait::async_trait]
impl HealthCheck for FixedHealth {
    async fn check(&self) -> Result<bool> {
        Ok(self.0)
    }
}

#[tokio::test]
async fn failover_routes_through_the_fallback_breaker() {
    let manager = Arc::new(FailoverManager::new(
        Duration::from_secs(60),
        CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        },
    ));
    manager
        .register_service("A", Arc::new(FixedHealth(false)), true)
        .await;
    manager
        .register_service("B", Arc::new(FixedHealth(true)), false)
        .await;
    manager.register_fallback("A", "B").await;

    // One failed health check is enough to trip A's breaker
    manager.check_all_services().await;
    assert_eq!(
        manager.breaker("A").await.unwrap().state().await,
        CircuitState::Open
    );

    let result = manager
        .execute_with_failover("A", || async { Ok::<_, Error>("served") })
        .await
        .unwrap();
    assert_eq!(result, "served");
    // The success went through B's breaker and kept it closed
    assert_eq!(
        manager.breaker("B").await.unwrap().state().await,
        CircuitState::Closed
    );
}

struct FixedProbe {
    name: &'static str,
    status: ConnectionStatus,
}

#[async_trait::async_trait]
impl ServiceProbe for FixedProbe {
    fn service(&self) -> &str {
        self.name
    }

    async fn check(&self) -> ConnectionStatus {
        self.status
    }
}

#[tokio::test]
async fn offline_sync_preserves_fifo_and_retries_front() {
    let manager = OfflineManager::new(
        &OfflineSettings {
            health_check_interval_secs: 60,
            max_queue_size: 100,
            sync_batch_size: 10,
        },
        vec![
            Arc::new(FixedProbe {
                name: "redis",
                status: ConnectionStatus::Offline,
            }),
            Arc::new(FixedProbe {
                name: "postgres",
                status: ConnectionStatus::Online,
            }),
        ],
        Arc::new(NullDispatcher),
    );
    manager.check_connections().await;
    assert_eq!(manager.status().await, ConnectionStatus::Offline);

    let i1 = SyncItem::new(SyncOperation::Create, "redis", json!({"k": 1}));
    let i1_id = i1.item_id;
    manager.enqueue(i1).await;
    manager
        .enqueue(SyncItem::new(SyncOperation::Update, "postgres", json!({"k": 2})))
        .await;

    let synced = manager.sync_pending().await;
    assert_eq!(synced, 1);
    assert_eq!(manager.queue_size().await, 1);

    // The redis item is back at the head with one retry on it
    let statuses = manager.service_statuses().await;
    assert_eq!(statuses["redis"], ConnectionStatus::Offline);
    let second_pass = manager.sync_pending().await;
    assert_eq!(second_pass, 0);
    let head = manager
        .peek_pending()
        .await
        .expect("queue should still hold the redis item");
    assert_eq!(head.item_id, i1_id);
    assert_eq!(head.retry_count, 2);
}

#[tokio::test]
async fn emergency_level_downgrades_programmed_responses() {
    let fallback = AutonomousFallback::new(None, None);
    fallback.activate_emergency(EmergencyLevel::Critical).await;

    let response = fallback
        .decide("security_threat", RiskLevel::High, RiskLevel::High, None)
        .await;
    assert_eq!(response.action, FallbackAction::Log);
    assert_eq!(response.source, FallbackSource::Programmed);
    // The programmed response carries 0.95 confidence before the clamp
    assert!((response.confidence - 0.95 * 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn snapshot_recovery_restores_the_point_in_time() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("state.db");
    let store = StatePersistence::open(path.to_str().unwrap(), 10)
        .await
        .unwrap();

    store
        .save_snapshot("agent", serde_json::to_vec(&json!({"x": 1})).unwrap(), 1)
        .await
        .unwrap();
    store
        .save_snapshot("agent", serde_json::to_vec(&json!({"x": 2})).unwrap(), 1)
        .await
        .unwrap();
    let rp = store.create_recovery_point("rp1").await.unwrap();
    store
        .save_snapshot("agent", serde_json::to_vec(&json!({"x": 3})).unwrap(), 1)
        .await
        .unwrap();

    let restored = store.restore_from_recovery(rp).await.unwrap();
    let agent: serde_json::Value = serde_json::from_slice(&restored["agent"]).unwrap();
    assert_eq!(agent, json!({"x": 2}));
}

#[tokio::test]
async fn emergency_transition_snapshots_when_persistence_is_wired() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("state.db");
    let store = Arc::new(
        StatePersistence::open(path.to_str().unwrap(), 10)
            .await
            .unwrap(),
    );

    let fallback = AutonomousFallback::new(None, Some(store.clone()));
    fallback.activate_emergency(EmergencyLevel::Emergency).await;

    let snapshot = store
        .load_latest_snapshot("emergency")
        .await
        .unwrap()
        .expect("emergency transition should be snapshotted");
    let state: serde_json::Value = serde_json::from_slice(&snapshot.data).unwrap();
    assert_eq!(state["level"], json!("emergency"));
    assert_eq!(state["old_level"], json!("normal"));
}
