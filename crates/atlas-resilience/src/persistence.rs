//! Durable typed snapshots and recovery points on an embedded store
//!
//! Two tables back the state layer: `snapshots` holds opaque byte payloads
//! per state type, `recovery_points` ties together the latest snapshot of
//! every state type at a labelled moment. Payloads are never interpreted
//! here; callers own the serialization format and schema version.

use atlas_common::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Immutable state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub snapshot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub state_type: String,
    pub data: Vec<u8>,
    pub version: i32,
}

/// A labelled set of snapshot ids, one per state type, captured at a
/// moment in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryPoint {
    pub recovery_id: Uuid,
    pub label: String,
    pub snapshot_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot and recovery point store over an embedded sqlite database
pub struct StatePersistence {
    pool: SqlitePool,
    max_snapshots: u32,
}

impl StatePersistence {
    /// Open (or create) the store at the given path and run migrations
    pub async fn open(db_path: &str, max_snapshots: u32) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::Persistence(format!("failed to create store directory: {}", e))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::Persistence(format!("failed to open store: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                snapshot_id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                state_type TEXT NOT NULL,
                data BLOB NOT NULL,
                version INTEGER DEFAULT 1
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| Error::Persistence(format!("failed to create snapshots table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS recovery_points (
                recovery_id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                snapshot_ids TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| {
            Error::Persistence(format!("failed to create recovery_points table: {}", e))
        })?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_type_time
             ON snapshots (state_type, timestamp DESC)",
        )
        .execute(&pool)
        .await
        .map_err(|e| Error::Persistence(format!("failed to create snapshot index: {}", e)))?;

        info!(
            "state persistence opened (path={}, max={})",
            db_path, max_snapshots
        );
        Ok(Self {
            pool,
            max_snapshots,
        })
    }

    /// Persist a snapshot of the given state type. The payload is opaque;
    /// `version` is the caller's schema version.
    pub async fn save_snapshot(
        &self,
        state_type: &str,
        data: Vec<u8>,
        version: i32,
    ) -> Result<StateSnapshot> {
        let snapshot = StateSnapshot {
            snapshot_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            state_type: state_type.to_string(),
            data,
            version,
        };

        sqlx::query(
            "INSERT INTO snapshots (snapshot_id, timestamp, state_type, data, version)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(snapshot.snapshot_id.to_string())
        .bind(format_timestamp(&snapshot.timestamp))
        .bind(&snapshot.state_type)
        .bind(&snapshot.data)
        .bind(snapshot.version)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Persistence(format!("failed to save snapshot: {}", e)))?;

        debug!(
            "snapshot saved: {} (type={})",
            snapshot.snapshot_id, state_type
        );
        Ok(snapshot)
    }

    /// Latest snapshot of a state type, by timestamp
    pub async fn load_latest_snapshot(&self, state_type: &str) -> Result<Option<StateSnapshot>> {
        let row = sqlx::query(
            "SELECT snapshot_id, timestamp, state_type, data, version
             FROM snapshots WHERE state_type = ?
             ORDER BY timestamp DESC, rowid DESC LIMIT 1",
        )
        .bind(state_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Persistence(format!("failed to load latest snapshot: {}", e)))?;

        row.map(snapshot_from_row).transpose()
    }

    /// Load a snapshot by id
    pub async fn load_snapshot(&self, snapshot_id: Uuid) -> Result<Option<StateSnapshot>> {
        let row = sqlx::query(
            "SELECT snapshot_id, timestamp, state_type, data, version
             FROM snapshots WHERE snapshot_id = ?",
        )
        .bind(snapshot_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Persistence(format!("failed to load snapshot: {}", e)))?;

        row.map(snapshot_from_row).transpose()
    }

    /// Capture the latest snapshot of every distinct state type into a
    /// labelled recovery point, in one transaction
    pub async fn create_recovery_point(&self, label: &str) -> Result<Uuid> {
        let recovery_id = Uuid::new_v4();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Persistence(format!("failed to begin transaction: {}", e)))?;

        let types: Vec<String> = sqlx::query("SELECT DISTINCT state_type FROM snapshots")
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| Error::Persistence(format!("failed to list state types: {}", e)))?
            .into_iter()
            .map(|row| row.get::<String, _>("state_type"))
            .collect();

        let mut snapshot_ids: Vec<Uuid> = Vec::with_capacity(types.len());
        for state_type in &types {
            let row = sqlx::query(
                "SELECT snapshot_id FROM snapshots WHERE state_type = ?
                 ORDER BY timestamp DESC, rowid DESC LIMIT 1",
            )
            .bind(state_type)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Persistence(format!("failed to find latest snapshot: {}", e)))?;
            let id: String = row.get("snapshot_id");
            snapshot_ids.push(parse_uuid(&id)?);
        }

        let ids_json = serde_json::to_string(&snapshot_ids)?;
        sqlx::query(
            "INSERT INTO recovery_points (recovery_id, label, snapshot_ids, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(recovery_id.to_string())
        .bind(label)
        .bind(ids_json)
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Persistence(format!("failed to save recovery point: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Persistence(format!("failed to commit recovery point: {}", e)))?;

        info!(
            "recovery point created: {} ({}, {} snapshots)",
            recovery_id,
            label,
            snapshot_ids.len()
        );
        Ok(recovery_id)
    }

    /// Restore the data captured by a recovery point, keyed by state type
    pub async fn restore_from_recovery(
        &self,
        recovery_id: Uuid,
    ) -> Result<HashMap<String, Vec<u8>>> {
        let row = sqlx::query("SELECT snapshot_ids FROM recovery_points WHERE recovery_id = ?")
            .bind(recovery_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Persistence(format!("failed to load recovery point: {}", e)))?
            .ok_or_else(|| Error::NotFound(format!("recovery point not found: {}", recovery_id)))?;

        let ids_json: String = row.get("snapshot_ids");
        let snapshot_ids: Vec<Uuid> = serde_json::from_str(&ids_json)?;

        let mut restored = HashMap::new();
        for snapshot_id in snapshot_ids {
            let row = sqlx::query("SELECT state_type, data FROM snapshots WHERE snapshot_id = ?")
                .bind(snapshot_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Persistence(format!("failed to load snapshot: {}", e)))?;
            if let Some(row) = row {
                restored.insert(row.get::<String, _>("state_type"), row.get::<Vec<u8>, _>("data"));
            }
        }

        info!(
            "restored from recovery point {} ({} state types)",
            recovery_id,
            restored.len()
        );
        Ok(restored)
    }

    /// All recovery points, newest first
    pub async fn list_recovery_points(&self) -> Result<Vec<RecoveryPoint>> {
        let rows = sqlx::query(
            "SELECT recovery_id, label, snapshot_ids, timestamp
             FROM recovery_points ORDER BY timestamp DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Persistence(format!("failed to list recovery points: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let recovery_id = parse_uuid(&row.get::<String, _>("recovery_id"))?;
                let snapshot_ids: Vec<Uuid> =
                    serde_json::from_str(&row.get::<String, _>("snapshot_ids"))?;
                Ok(RecoveryPoint {
                    recovery_id,
                    label: row.get("label"),
                    snapshot_ids,
                    timestamp: parse_timestamp(&row.get::<String, _>("timestamp"))?,
                })
            })
            .collect()
    }

    /// Keep only the most recent N snapshots per state type; returns the
    /// number deleted
    pub async fn cleanup_old_snapshots(&self, keep_last: Option<u32>) -> Result<u64> {
        let keep = keep_last.unwrap_or(self.max_snapshots);
        let mut deleted = 0u64;

        let types: Vec<String> = sqlx::query("SELECT DISTINCT state_type FROM snapshots")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Persistence(format!("failed to list state types: {}", e)))?
            .into_iter()
            .map(|row| row.get::<String, _>("state_type"))
            .collect();

        for state_type in types {
            let result = sqlx::query(
                "DELETE FROM snapshots WHERE snapshot_id IN (
                     SELECT snapshot_id FROM snapshots WHERE state_type = ?
                     ORDER BY timestamp DESC, rowid DESC LIMIT -1 OFFSET ?
                 )",
            )
            .bind(&state_type)
            .bind(keep as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Persistence(format!("failed to prune snapshots: {}", e)))?;
            deleted += result.rows_affected();
        }

        if deleted > 0 {
            info!("pruned {} old snapshots", deleted);
        }
        Ok(deleted)
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed-width micros keep lexicographic and chronological order aligned
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Persistence(format!("invalid stored timestamp '{}': {}", raw, e)))
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| Error::Persistence(format!("invalid stored id '{}': {}", raw, e)))
}

fn snapshot_from_row(row: sqlx::sqlite::SqliteRow) -> Result<StateSnapshot> {
    Ok(StateSnapshot {
        snapshot_id: parse_uuid(&row.get::<String, _>("snapshot_id"))?,
        timestamp: parse_timestamp(&row.get::<String, _>("timestamp"))?,
        state_type: row.get("state_type"),
        data: row.get("data"),
        version: row.get("version"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (TempDir, StatePersistence) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.db");
        let store = StatePersistence::open(path.to_str().unwrap(), 10)
            .await
            .unwrap();
        (dir, store)
    }

    fn payload(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn save_then_load_by_id_is_byte_identical() {
        let (_dir, store) = store().await;
        let data = payload(json!({"x": 1, "nested": {"y": [1, 2, 3]}}));
        let saved = store.save_snapshot("agent", data.clone(), 1).await.unwrap();

        let loaded = store
            .load_snapshot(saved.snapshot_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.data, data);
        assert_eq!(loaded.state_type, "agent");
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn latest_snapshot_is_most_recent_save() {
        let (_dir, store) = store().await;
        store
            .save_snapshot("agent", payload(json!({"x": 1})), 1)
            .await
            .unwrap();
        let second = store
            .save_snapshot("agent", payload(json!({"x": 2})), 1)
            .await
            .unwrap();

        let latest = store.load_latest_snapshot("agent").await.unwrap().unwrap();
        assert_eq!(latest.snapshot_id, second.snapshot_id);
        assert_eq!(latest.data, payload(json!({"x": 2})));
    }

    #[tokio::test]
    async fn missing_snapshot_and_type_return_none() {
        let (_dir, store) = store().await;
        assert!(store.load_latest_snapshot("ghost").await.unwrap().is_none());
        assert!(store.load_snapshot(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recovery_point_captures_latest_per_type_at_creation() {
        let (_dir, store) = store().await;
        store
            .save_snapshot("agent", payload(json!({"x": 1})), 1)
            .await
            .unwrap();
        store
            .save_snapshot("agent", payload(json!({"x": 2})), 1)
            .await
            .unwrap();
        store
            .save_snapshot("monitor", payload(json!({"cpu": 40})), 1)
            .await
            .unwrap();

        let rp = store.create_recovery_point("rp1").await.unwrap();

        // A later save must not leak into the recovery point
        store
            .save_snapshot("agent", payload(json!({"x": 3})), 1)
            .await
            .unwrap();

        let restored = store.restore_from_recovery(rp).await.unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored["agent"], payload(json!({"x": 2})));
        assert_eq!(restored["monitor"], payload(json!({"cpu": 40})));
    }

    #[tokio::test]
    async fn restore_unknown_recovery_point_is_not_found() {
        let (_dir, store) = store().await;
        let result = store.restore_from_recovery(Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn list_recovery_points_newest_first() {
        let (_dir, store) = store().await;
        store
            .save_snapshot("agent", payload(json!({})), 1)
            .await
            .unwrap();
        let first = store.create_recovery_point("first").await.unwrap();
        let second = store.create_recovery_point("second").await.unwrap();

        let points = store.list_recovery_points().await.unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].recovery_id, second);
        assert_eq!(points[1].recovery_id, first);
        assert_eq!(points[0].label, "second");
    }

    #[tokio::test]
    async fn cleanup_keeps_most_recent_per_type() {
        let (_dir, store) = store().await;
        for n in 0..5 {
            store
                .save_snapshot("agent", payload(json!({ "n": n })), 1)
                .await
                .unwrap();
        }
        for n in 0..2 {
            store
                .save_snapshot("monitor", payload(json!({ "n": n })), 1)
                .await
                .unwrap();
        }

        let deleted = store.cleanup_old_snapshots(Some(2)).await.unwrap();
        assert_eq!(deleted, 3);

        let latest = store.load_latest_snapshot("agent").await.unwrap().unwrap();
        assert_eq!(latest.data, payload(json!({"n": 4})));
    }
}
