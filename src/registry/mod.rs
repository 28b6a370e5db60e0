//! [`WorkerRegistry`]: Redis-hash-backed worker liveness tracking, grounded
//! on `workers/worker_registry.py`.
//!
//! ```text
//! worker_registry:workers:{worker_id}  hash{worker_id,registered_at,last_heartbeat,status,...}
//! ```
//!
//! A worker `is_alive` iff `now - last_heartbeat < heartbeat_timeout`.

use crate::error::RegistryError;
use crate::metrics;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

const REGISTRY_PREFIX: &str = "worker_registry:workers";

/// A worker's registry entry, augmented with liveness derived from
/// `last_heartbeat` at read time.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub registered_at: String,
    pub last_heartbeat: f64,
    pub status: String,
    pub metadata: Option<serde_json::Value>,
    pub time_since_heartbeat: f64,
    pub is_alive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub total_registered: usize,
    pub active: usize,
    pub dead: usize,
    pub heartbeat_timeout_seconds: u64,
}

pub struct WorkerRegistry {
    redis: ConnectionManager,
    heartbeat_timeout: Duration,
}

impl WorkerRegistry {
    pub fn new(redis: ConnectionManager, heartbeat_timeout: Duration) -> Self {
        Self { redis, heartbeat_timeout }
    }

    fn key(worker_id: &str) -> String {
        format!("{REGISTRY_PREFIX}:{worker_id}")
    }

    /// Registers a worker, optionally merging in arbitrary metadata
    /// (hostname, pid, ...), the way `register_worker`'s `metadata` kwarg
    /// does in the original.
    pub async fn register(&self, worker_id: &str, metadata: Option<serde_json::Value>) -> Result<(), RegistryError> {
        let mut conn = self.redis.clone();
        let now = Utc::now();

        let mut fields = vec![
            ("worker_id".to_string(), worker_id.to_string()),
            ("registered_at".to_string(), now.to_rfc3339()),
            ("last_heartbeat".to_string(), now_epoch_secs().to_string()),
            ("status".to_string(), "active".to_string()),
        ];
        if let Some(metadata) = metadata {
            fields.push(("metadata".to_string(), metadata.to_string()));
        }

        conn.hset_multiple(Self::key(worker_id), &fields).await?;
        Ok(())
    }

    pub async fn send_heartbeat(&self, worker_id: &str) -> Result<bool, RegistryError> {
        let mut conn = self.redis.clone();
        let updated: i32 = conn
            .hset(Self::key(worker_id), "last_heartbeat", now_epoch_secs().to_string())
            .await?;
        Ok(updated >= 0)
    }

    pub async fn unregister(&self, worker_id: &str) -> Result<bool, RegistryError> {
        let mut conn = self.redis.clone();
        let deleted: i64 = conn.del(Self::key(worker_id)).await?;
        Ok(deleted > 0)
    }

    pub async fn get_worker_info(&self, worker_id: &str) -> Result<Option<WorkerInfo>, RegistryError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(Self::key(worker_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.fields_to_info(worker_id, fields)))
    }

    async fn all_workers(&self) -> Result<Vec<WorkerInfo>, RegistryError> {
        let mut conn = self.redis.clone();
        let keys: Vec<String> = conn.keys(format!("{REGISTRY_PREFIX}:*")).await?;
        let mut workers = Vec::with_capacity(keys.len());
        for key in keys {
            let fields: HashMap<String, String> = conn.hgetall(&key).await?;
            if fields.is_empty() {
                continue;
            }
            let worker_id = key
                .strip_prefix(&format!("{REGISTRY_PREFIX}:"))
                .unwrap_or(&key)
                .to_string();
            workers.push(self.fields_to_info(&worker_id, fields));
        }
        Ok(workers)
    }

    pub async fn get_active_workers(&self) -> Result<Vec<WorkerInfo>, RegistryError> {
        Ok(self.all_workers().await?.into_iter().filter(|w| w.is_alive).collect())
    }

    pub async fn get_dead_workers(&self) -> Result<Vec<WorkerInfo>, RegistryError> {
        Ok(self.all_workers().await?.into_iter().filter(|w| !w.is_alive).collect())
    }

    /// Unregisters every worker whose heartbeat has expired. Returns the
    /// count removed.
    pub async fn cleanup_dead_workers(&self) -> Result<usize, RegistryError> {
        let dead = self.get_dead_workers().await?;
        let count = dead.len();
        for worker in dead {
            self.unregister(&worker.worker_id).await?;
        }
        Ok(count)
    }

    pub async fn stats(&self) -> Result<RegistryStats, RegistryError> {
        let workers = self.all_workers().await?;
        let active = workers.iter().filter(|w| w.is_alive).count();
        let dead = workers.len() - active;
        metrics::set_active_workers(active as i64);
        Ok(RegistryStats {
            total_registered: workers.len(),
            active,
            dead,
            heartbeat_timeout_seconds: self.heartbeat_timeout.as_secs(),
        })
    }

    pub async fn clear(&self) -> Result<(), RegistryError> {
        let mut conn = self.redis.clone();
        let keys: Vec<String> = conn.keys(format!("{REGISTRY_PREFIX}:*")).await?;
        for key in keys {
            let _: () = conn.del(&key).await?;
        }
        Ok(())
    }

    fn fields_to_info(&self, worker_id: &str, fields: HashMap<String, String>) -> WorkerInfo {
        compute_worker_info(worker_id, fields, self.heartbeat_timeout)
    }
}

fn compute_worker_info(worker_id: &str, fields: HashMap<String, String>, heartbeat_timeout: Duration) -> WorkerInfo {
    let last_heartbeat: f64 = fields.get("last_heartbeat").and_then(|v| v.parse().ok()).unwrap_or(0.0);
    let time_since_heartbeat = (now_epoch_secs() - last_heartbeat).max(0.0);
    let is_alive = time_since_heartbeat < heartbeat_timeout.as_secs_f64();

    WorkerInfo {
        worker_id: worker_id.to_string(),
        registered_at: fields.get("registered_at").cloned().unwrap_or_default(),
        last_heartbeat,
        status: fields.get("status").cloned().unwrap_or_default(),
        metadata: fields.get("metadata").and_then(|v| serde_json::from_str(v).ok()),
        time_since_heartbeat: (time_since_heartbeat * 100.0).round() / 100.0,
        is_alive,
    }
}

fn now_epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_invariant_matches_heartbeat_timeout() {
        let timeout = Duration::from_secs(30);
        let fresh = now_epoch_secs();

        let fields: HashMap<String, String> = [
            ("last_heartbeat".to_string(), fresh.to_string()),
            ("status".to_string(), "active".to_string()),
        ]
        .into_iter()
        .collect();
        let info = compute_worker_info("worker-1", fields, timeout);
        assert!(info.is_alive);

        let stale = fresh - 60.0;
        let fields: HashMap<String, String> = [("last_heartbeat".to_string(), stale.to_string())]
            .into_iter()
            .collect();
        let info = compute_worker_info("worker-2", fields, timeout);
        assert!(!info.is_alive);
    }
}
