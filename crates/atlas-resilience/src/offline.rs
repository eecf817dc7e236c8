//! Offline operation: connection monitoring, decision cache, sync queue
//!
//! Tracks per-service connection status for the fixed set of backing
//! services (key-value store, relational store, vector store), caches
//! decisions locally, and accumulates deferred writes in a bounded FIFO
//! sync queue drained when connectivity returns.

use async_trait::async_trait;
use atlas_common::config::{EndpointSettings, OfflineSettings};
use atlas_common::{ComponentHealth, HealthLevel, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Connection status of a single backing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Online,
    Degraded,
    Offline,
}

/// Sync queue operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

/// A deferred write scheduled while a backing service was unreachable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
    pub item_id: Uuid,
    pub operation: SyncOperation,
    pub target_service: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl SyncItem {
    pub fn new(operation: SyncOperation, target_service: impl Into<String>, payload: Value) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            operation,
            target_service: target_service.into(),
            payload,
            created_at: Utc::now(),
            retry_count: 0,
        }
    }
}

/// Connectivity probe for one backing service
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    /// Service name this probe reports for
    fn service(&self) -> &str;

    /// Probe the service and classify its connection status
    async fn check(&self) -> ConnectionStatus;
}

/// Delivery seam for drained sync items. Real transports live in the
/// domain collaborators; the default dispatcher accepts everything.
#[async_trait]
pub trait SyncDispatcher: Send + Sync {
    async fn deliver(&self, item: &SyncItem) -> Result<()>;
}

/// Dispatcher that acknowledges every item without side effects
pub struct NullDispatcher;

#[async_trait]
impl SyncDispatcher for NullDispatcher {
    async fn deliver(&self, item: &SyncItem) -> Result<()> {
        debug!(
            "sync delivered: {:?} -> {} (id={})",
            item.operation, item.target_service, item.item_id
        );
        Ok(())
    }
}

/// Per-service connection state, decision cache, and bounded sync queue
/// with a periodic health loop
pub struct OfflineManager {
    health_check_interval: Duration,
    max_queue_size: usize,
    sync_batch_size: usize,
    probes: Vec<Arc<dyn ServiceProbe>>,
    status: Arc<RwLock<HashMap<String, ConnectionStatus>>>,
    decision_cache: Arc<DashMap<String, Value>>,
    queue: Arc<Mutex<VecDeque<SyncItem>>>,
    dispatcher: Arc<dyn SyncDispatcher>,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineManager {
    /// Build a manager over the given probes. Every probed service starts
    /// Online until the first health pass says otherwise.
    pub fn new(
        settings: &OfflineSettings,
        probes: Vec<Arc<dyn ServiceProbe>>,
        dispatcher: Arc<dyn SyncDispatcher>,
    ) -> Self {
        let initial: HashMap<String, ConnectionStatus> = probes
            .iter()
            .map(|p| (p.service().to_string(), ConnectionStatus::Online))
            .collect();

        info!(
            "offline manager created (interval={}s, queue_max={})",
            settings.health_check_interval_secs, settings.max_queue_size
        );

        Self {
            health_check_interval: Duration::from_secs(settings.health_check_interval_secs),
            max_queue_size: settings.max_queue_size,
            sync_batch_size: settings.sync_batch_size,
            probes,
            status: Arc::new(RwLock::new(initial)),
            decision_cache: Arc::new(DashMap::new()),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            dispatcher,
            running: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Aggregate status: the worst status across registered services
    pub async fn status(&self) -> ConnectionStatus {
        let status = self.status.read().await;
        if status.values().any(|s| *s == ConnectionStatus::Offline) {
            ConnectionStatus::Offline
        } else if status.values().any(|s| *s == ConnectionStatus::Degraded) {
            ConnectionStatus::Degraded
        } else {
            ConnectionStatus::Online
        }
    }

    /// True when every registered service is offline
    pub async fn is_offline(&self) -> bool {
        let status = self.status.read().await;
        !status.is_empty() && status.values().all(|s| *s == ConnectionStatus::Offline)
    }

    /// Probe every registered service and record the results
    pub async fn check_connections(&self) -> HashMap<String, ConnectionStatus> {
        let mut results = HashMap::new();
        for probe in &self.probes {
            let outcome = probe.check().await;
            results.insert(probe.service().to_string(), outcome);
        }

        let mut status = self.status.write().await;
        for (service, outcome) in &results {
            status.insert(service.clone(), *outcome);
        }
        info!(
            "connection status: {}",
            results
                .iter()
                .map(|(k, v)| format!("{}={:?}", k, v))
                .collect::<Vec<_>>()
                .join(", ")
        );
        results
    }

    /// Cache a decision for offline reuse
    pub fn cache_decision(&self, key: impl Into<String>, decision: Value) {
        self.decision_cache.insert(key.into(), decision);
    }

    /// Read a cached decision
    pub fn cached_decision(&self, key: &str) -> Option<Value> {
        self.decision_cache.get(key).map(|v| v.value().clone())
    }

    /// Append an item to the sync queue, evicting the oldest on overflow
    pub async fn enqueue(&self, item: SyncItem) {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.max_queue_size {
            if let Some(evicted) = queue.pop_front() {
                warn!(
                    "sync queue full ({}); evicted oldest item {}",
                    self.max_queue_size, evicted.item_id
                );
            }
        }
        info!(
            "queued for sync: {:?} -> {} ({} pending)",
            item.operation,
            item.target_service,
            queue.len() + 1
        );
        queue.push_back(item);
    }

    /// Drain up to the configured batch of pending items in FIFO order.
    ///
    /// Items whose target service is offline get their retry count bumped
    /// and return to the front of the queue preserving relative order;
    /// the rest go through the dispatcher and are dropped on success.
    /// Returns the number successfully synced.
    pub async fn sync_pending(&self) -> u32 {
        let mut queue = self.queue.lock().await;
        let status = self.status.read().await.clone();

        let mut synced = 0u32;
        let mut failed: Vec<SyncItem> = Vec::new();

        for _ in 0..self.sync_batch_size.min(queue.len()) {
            let Some(mut item) = queue.pop_front() else {
                break;
            };

            let target_status = status
                .get(&item.target_service)
                .copied()
                .unwrap_or(ConnectionStatus::Offline);
            if target_status == ConnectionStatus::Offline {
                item.retry_count += 1;
                failed.push(item);
                continue;
            }

            match self.dispatcher.deliver(&item).await {
                Ok(()) => {
                    synced += 1;
                    debug!(
                        "synced: {:?} -> {} (id={})",
                        item.operation, item.target_service, item.item_id
                    );
                }
                Err(err) => {
                    warn!(
                        "sync dispatch failed for {} -> {}: {}",
                        item.item_id, item.target_service, err
                    );
                    item.retry_count += 1;
                    failed.push(item);
                }
            }
        }

        // Failed items return to the front, preserving their order
        for item in failed.into_iter().rev() {
            queue.push_front(item);
        }

        if synced > 0 {
            info!("{} items synced, {} still pending", synced, queue.len());
        }
        synced
    }

    /// Number of items waiting in the sync queue
    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// The item at the head of the sync queue, if any
    pub async fn peek_pending(&self) -> Option<SyncItem> {
        self.queue.lock().await.front().cloned()
    }

    /// Current per-service connection statuses
    pub async fn service_statuses(&self) -> HashMap<String, ConnectionStatus> {
        self.status.read().await.clone()
    }

    /// Health report for the offline layer: connection aggregate plus
    /// queue pressure
    pub async fn health(&self) -> ComponentHealth {
        let status = self.status().await;
        let queue_size = self.queue_size().await;
        let capacity_pct = queue_size as f64 / self.max_queue_size as f64 * 100.0;

        let (level, message) = match status {
            ConnectionStatus::Online if capacity_pct > 80.0 => (
                HealthLevel::Degraded,
                format!("online, sync queue at {:.0}% capacity", capacity_pct),
            ),
            ConnectionStatus::Online => (HealthLevel::Healthy, "all services online".to_string()),
            ConnectionStatus::Degraded => {
                (HealthLevel::Degraded, "some services degraded".to_string())
            }
            ConnectionStatus::Offline => {
                (HealthLevel::Critical, "a backing service is offline".to_string())
            }
        };

        ComponentHealth::new(level, message)
            .with_metric("queue_size", queue_size as f64)
            .with_metric("queue_capacity_percent", capacity_pct)
    }

    /// Start the periodic health loop: probe connections, then sync
    /// pending work unless the aggregate status is offline
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(manager.health_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !manager.running.load(Ordering::SeqCst) {
                            break;
                        }
                        manager.check_connections().await;
                        if manager.status().await != ConnectionStatus::Offline {
                            manager.sync_pending().await;
                        }
                    }
                    _ = manager.stop.notified() => break,
                }
            }
            debug!("offline health loop exited");
        });

        *self.handle.lock().await = Some(handle);
        info!("offline manager started");
    }

    /// Stop the health loop, awaiting the currently-running iteration
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // notify_one stores a permit, so a signal sent while the loop is
        // mid-iteration is not lost
        self.stop.notify_one();
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    error!("offline health loop join error: {}", err);
                }
            }
        }
        info!("offline manager stopped");
    }
}

/// Key-value store probe: PING with a 3 second connection budget
pub struct RedisProbe {
    url: String,
}

impl RedisProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ServiceProbe for RedisProbe {
    fn service(&self) -> &str {
        "redis"
    }

    async fn check(&self) -> ConnectionStatus {
        let probe = async {
            let client = redis::Client::open(self.url.as_str())
                .map_err(|e| e.to_string())?;
            let mut conn = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| e.to_string())?;
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .map_err(|e| e.to_string())
        };
        match timeout(Duration::from_secs(3), probe).await {
            Ok(Ok(_)) => ConnectionStatus::Online,
            Ok(Err(err)) => {
                debug!("redis probe failed: {}", err);
                ConnectionStatus::Offline
            }
            Err(_) => ConnectionStatus::Offline,
        }
    }
}

/// Relational store probe: SELECT 1 through a pre-pinged connection
pub struct PostgresProbe {
    url: String,
}

impl PostgresProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ServiceProbe for PostgresProbe {
    fn service(&self) -> &str {
        "postgres"
    }

    async fn check(&self) -> ConnectionStatus {
        let probe = async {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Duration::from_secs(3))
                .test_before_acquire(true)
                .connect(&self.url)
                .await
                .map_err(|e| e.to_string())?;
            let result = sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .map_err(|e| e.to_string());
            pool.close().await;
            result
        };
        match timeout(Duration::from_secs(3), probe).await {
            Ok(Ok(_)) => ConnectionStatus::Online,
            Ok(Err(err)) => {
                debug!("postgres probe failed: {}", err);
                ConnectionStatus::Offline
            }
            Err(_) => ConnectionStatus::Offline,
        }
    }
}

/// Vector store probe: GET /healthz, non-200 is degraded
pub struct QdrantProbe {
    base_url: String,
    client: reqwest::Client,
}

impl QdrantProbe {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{}:{}", host, port),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ServiceProbe for QdrantProbe {
    fn service(&self) -> &str {
        "qdrant"
    }

    async fn check(&self) -> ConnectionStatus {
        let request = self
            .client
            .get(format!("{}/healthz", self.base_url))
            .timeout(Duration::from_secs(3))
            .send();
        match request.await {
            Ok(resp) if resp.status().is_success() => ConnectionStatus::Online,
            Ok(_) => ConnectionStatus::Degraded,
            Err(err) => {
                debug!("qdrant probe failed: {}", err);
                ConnectionStatus::Offline
            }
        }
    }
}

/// The standard probe set for the configured backing services
pub fn standard_probes(endpoints: &EndpointSettings) -> Vec<Arc<dyn ServiceProbe>> {
    vec![
        Arc::new(RedisProbe::new(endpoints.redis_url.clone())),
        Arc::new(PostgresProbe::new(endpoints.database_url.clone())),
        Arc::new(QdrantProbe::new(
            &endpoints.qdrant_host,
            endpoints.qdrant_port,
        )),
    ]
}
