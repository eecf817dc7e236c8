//! ATLAS agent daemon
//!
//! Boots the unified core and the resilience fabric, runs the health
//! loops until interrupted, and reports a final snapshot on shutdown.

use atlas_common::{Config, HealthStatus};
use atlas_core::{AtlasCore, PerceptionInput};
use atlas_resilience::circuit_breaker::CircuitBreakerConfig;
use atlas_resilience::offline::standard_probes;
use atlas_resilience::{
    AutonomousFallback, FailoverManager, LocalInference, NullDispatcher, OfflineManager,
    StatePersistence,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match Config::load(&path) {
            Ok(config) => config,
            Err(err) => {
                error!("failed to load config from {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let resilience = &config.resilience;

    // The core keeps running with in-memory-only semantics when the
    // embedded store cannot be opened.
    let persistence = match StatePersistence::open(
        &resilience.persistence.db_path,
        resilience.persistence.max_snapshots,
    )
    .await
    {
        Ok(store) => Some(Arc::new(store)),
        Err(err) => {
            error!("state persistence unavailable, continuing without: {}", err);
            None
        }
    };

    let inference = Arc::new(LocalInference::new(&resilience.inference));
    let fallback = Arc::new(AutonomousFallback::new(
        Some(inference.clone()),
        persistence.clone(),
    ));

    let offline = Arc::new(OfflineManager::new(
        &resilience.offline,
        standard_probes(&resilience.endpoints),
        Arc::new(NullDispatcher),
    ));

    let failover = Arc::new(FailoverManager::new(
        Duration::from_secs(resilience.offline.health_check_interval_secs),
        CircuitBreakerConfig {
            failure_threshold: resilience.circuit_breaker.failure_threshold,
            recovery_timeout: Duration::from_secs(resilience.circuit_breaker.recovery_timeout_secs),
            half_open_max_calls: resilience.circuit_breaker.half_open_max_calls,
        },
    ));

    let core = AtlasCore::new(&config.core);

    offline.start().await;
    failover.start().await;
    info!("atlas daemon running; press ctrl-c to stop");

    let summary = core.run_cycle(vec![PerceptionInput {
        source: "startup".to_string(),
        data: HashMap::from([(
            "inference_available".to_string(),
            serde_json::json!(inference.is_available().await),
        )]),
    }]);
    info!(
        "startup cycle complete (perceptions={}, level={:?})",
        summary.perceptions, summary.consciousness_level
    );

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", err);
    }

    info!("shutting down");
    offline.stop().await;
    failover.stop().await;

    let health = HealthStatus::new(HashMap::from([
        ("offline".to_string(), offline.health().await),
        ("failover".to_string(), failover.health().await),
    ]));
    let snapshot = core.snapshot();
    info!(
        "final state: health={:?}, entities={}, chains={}, decisions={}, emergency={:?}",
        health.overall_health,
        snapshot.world_entities,
        snapshot.reasoning_chains,
        snapshot.decisions_made,
        fallback.emergency_level().await
    );
}
