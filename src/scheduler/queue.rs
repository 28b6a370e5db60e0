//! [`TaskQueue`]: the Redis-backed at-least-once task broker, grounded on
//! `scheduler/queue.rs`'s connection/list handling and on
//! `redis_task_queue_v2.py`'s exact claim/retry/dead-letter semantics.

use crate::error::QueueError;
use crate::metrics;
use crate::scheduler::task::{Task, TaskStatus};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub queue_name: String,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead_letter: u64,
    pub max_retries: u32,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.dead_letter
    }
}

/// A Redis-backed at-least-once task queue.
///
/// Key layout, namespaced under `queue_name`:
/// `pending`/`processing`/`completed`/`failed`/`dead_letter` (lists of task
/// ids) plus `task:{id}` (a hash holding the task record). `dead_letter` is
/// the canonical terminal-failure list; `failed` is a separate,
/// observability-only list of tasks that failed one retry attempt but were
/// re-enqueued (never scanned for recovery).
pub struct TaskQueue {
    redis: ConnectionManager,
    queue_name: String,
    pending_key: String,
    processing_key: String,
    completed_key: String,
    failed_key: String,
    dead_letter_key: String,
    task_key_prefix: String,
    max_retries: u32,
    processing_timeout: Duration,
}

impl TaskQueue {
    pub async fn connect(
        redis_url: &str,
        queue_name: impl Into<String>,
        max_retries: u32,
        processing_timeout: Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;
        Ok(Self::from_connection(redis, queue_name, max_retries, processing_timeout))
    }

    pub fn from_connection(
        redis: ConnectionManager,
        queue_name: impl Into<String>,
        max_retries: u32,
        processing_timeout: Duration,
    ) -> Self {
        let queue_name = queue_name.into();
        Self {
            pending_key: format!("{queue_name}:pending"),
            processing_key: format!("{queue_name}:processing"),
            completed_key: format!("{queue_name}:completed"),
            failed_key: format!("{queue_name}:failed"),
            dead_letter_key: format!("{queue_name}:dead_letter"),
            task_key_prefix: format!("{queue_name}:task:"),
            redis,
            queue_name,
            max_retries,
            processing_timeout,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn task_key(&self, id: &str) -> String {
        format!("{}{id}", self.task_key_prefix)
    }

    /// Mints an id if `task.id` is empty, writes the task hash with
    /// `status=pending, retry_count=0`, and pushes the id to the tail of
    /// `pending`. Submission order is preserved.
    pub async fn add_task(&self, mut task: Task) -> Result<String, QueueError> {
        if task.id.is_empty() {
            task.id = format!("task-{}", Utc::now().timestamp_millis());
        }
        task.status = TaskStatus::Pending;
        task.retry_count = 0;

        let mut conn = self.redis.clone();
        let fields = task_to_fields(&task)?;
        let mut pipe = redis::pipe();
        pipe.hset_multiple(self.task_key(&task.id), &fields).ignore();
        pipe.rpush(&self.pending_key, &task.id).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        Ok(task.id)
    }

    /// Atomically moves one id from the tail of `pending` to the head of
    /// `processing`, blocking up to `timeout`. Returns `None` on timeout.
    /// If the popped id's hash is missing, sweeps it out of `processing`
    /// (orphan sweep) and returns `None`.
    pub async fn claim(&self, worker_id: &str, timeout: Duration) -> Result<Option<Task>, QueueError> {
        let mut conn = self.redis.clone();
        let id: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.pending_key)
            .arg(&self.processing_key)
            .arg(timeout.as_secs())
            .query_async(&mut conn)
            .await?;

        let Some(id) = id else {
            return Ok(None);
        };

        let fields: HashMap<String, String> = conn.hgetall(self.task_key(&id)).await?;
        if fields.is_empty() {
            let _: () = conn.lrem(&self.processing_key, 1, &id).await?;
            return Ok(None);
        }

        let now = Utc::now();
        let mut pipe = redis::pipe();
        pipe.hset(self.task_key(&id), "status", "processing").ignore();
        pipe.hset(self.task_key(&id), "worker_id", worker_id).ignore();
        pipe.hset(self.task_key(&id), "started_at", now.to_rfc3339()).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;

        let mut task = fields_to_task(fields)?;
        task.id = id;
        task.status = TaskStatus::Processing;
        task.worker_id = Some(worker_id.to_string());
        task.started_at = Some(now);
        Ok(Some(task))
    }

    /// Idempotent: removes `id` from `processing` (a no-op if already
    /// removed), marks the hash `completed`, and pushes to `completed`.
    pub async fn mark_completed(&self, id: &str, result: Option<serde_json::Value>) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let _: () = conn.lrem(&self.processing_key, 1, id).await?;

        let mut pipe = redis::pipe();
        pipe.hset(self.task_key(id), "status", "completed").ignore();
        pipe.hset(self.task_key(id), "completed_at", Utc::now().to_rfc3339()).ignore();
        if let Some(result) = &result {
            pipe.hset(self.task_key(id), "result", result.to_string()).ignore();
        }
        pipe.rpush(&self.completed_key, id).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Removes `id` from `processing`, increments `retry_count`, and routes
    /// to either a retry at the tail of `pending` or `dead_letter`,
    /// matching `redis_task_queue_v2.py`'s `mark_failed`.
    pub async fn mark_failed(&self, id: &str, error: &str, should_retry: bool) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let _: () = conn.lrem(&self.processing_key, 1, id).await?;

        let current: Option<String> = conn.hget(self.task_key(id), "retry_count").await?;
        let retry_count: u32 = current.and_then(|v| v.parse().ok()).unwrap_or(0) + 1;

        let mut pipe = redis::pipe();
        pipe.hset(self.task_key(id), "retry_count", retry_count).ignore();
        pipe.hset(self.task_key(id), "last_error", error).ignore();
        pipe.hset(self.task_key(id), "failed_at", Utc::now().to_rfc3339()).ignore();

        let routed_to_dead_letter = !(should_retry && retry_count < self.max_retries);
        if routed_to_dead_letter {
            pipe.hset(self.task_key(id), "status", "dead").ignore();
            pipe.rpush(&self.dead_letter_key, id).ignore();
        } else {
            pipe.hset(self.task_key(id), "status", "failed").ignore();
            pipe.rpush(&self.pending_key, id).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;

        if routed_to_dead_letter {
            metrics::inc_dead_letter();
        }
        Ok(())
    }

    /// Sweeps `processing` for tasks whose `started_at` is older than
    /// `processing_timeout`, routing each through [`Self::mark_failed`].
    /// Returns the number recovered. Safe to call from multiple concurrent
    /// sweepers: a double-processed task is routed twice but `mark_failed`
    /// is idempotent on list membership (`LREM` is a no-op once removed).
    pub async fn recover_stuck_tasks(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn.lrange(&self.processing_key, 0, -1).await?;
        let mut recovered = 0usize;

        for id in ids {
            let started_at: Option<String> = conn.hget(self.task_key(&id), "started_at").await?;
            let Some(started_at) = started_at else {
                let _: () = conn.lrem(&self.processing_key, 1, &id).await?;
                continue;
            };
            let Ok(started_at) = DateTime::parse_from_rfc3339(&started_at) else {
                continue;
            };
            let elapsed = Utc::now().signed_duration_since(started_at.with_timezone(&Utc));
            if elapsed.num_seconds() as u64 > self.processing_timeout.as_secs() {
                let message = format!("stuck: no progress for {}s", elapsed.num_seconds());
                self.mark_failed(&id, &message, true).await?;
                metrics::inc_recovered();
                recovered += 1;
            }
        }

        Ok(recovered)
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, QueueError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.task_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let mut task = fields_to_task(fields)?;
        task.id = id.to_string();
        Ok(Some(task))
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut conn = self.redis.clone();
        let (pending, processing, completed, failed, dead_letter): (u64, u64, u64, u64, u64) = redis::pipe()
            .llen(&self.pending_key)
            .llen(&self.processing_key)
            .llen(&self.completed_key)
            .llen(&self.failed_key)
            .llen(&self.dead_letter_key)
            .query_async(&mut conn)
            .await?;

        metrics::set_queue_depth("pending", pending as i64);
        metrics::set_queue_depth("processing", processing as i64);
        metrics::set_queue_depth("completed", completed as i64);
        metrics::set_queue_depth("failed", failed as i64);
        metrics::set_queue_depth("dead_letter", dead_letter as i64);

        Ok(QueueStats {
            queue_name: self.queue_name.clone(),
            pending,
            processing,
            completed,
            failed,
            dead_letter,
            max_retries: self.max_retries,
        })
    }

    pub async fn dead_letter_ids(&self) -> Result<Vec<String>, QueueError> {
        let mut conn = self.redis.clone();
        Ok(conn.lrange(&self.dead_letter_key, 0, -1).await?)
    }

    /// Removes one occurrence of `id` from `dead_letter`, resets
    /// `retry_count` to 0, and re-enqueues at the tail of `pending`.
    pub async fn retry_dead_letter(&self, id: &str) -> Result<bool, QueueError> {
        let mut conn = self.redis.clone();
        let removed: i64 = conn.lrem(&self.dead_letter_key, 1, id).await?;
        if removed == 0 {
            return Ok(false);
        }

        let mut pipe = redis::pipe();
        pipe.hset(self.task_key(id), "retry_count", 0u32).ignore();
        pipe.hset(self.task_key(id), "status", "pending").ignore();
        pipe.rpush(&self.pending_key, id).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(true)
    }

    /// Deletes every list and task hash under this queue's namespace.
    pub async fn clear(&self) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let task_keys: Vec<String> = conn.keys(format!("{}*", self.task_key_prefix)).await?;

        let mut pipe = redis::pipe();
        pipe.del(&self.pending_key).ignore();
        pipe.del(&self.processing_key).ignore();
        pipe.del(&self.completed_key).ignore();
        pipe.del(&self.failed_key).ignore();
        pipe.del(&self.dead_letter_key).ignore();
        for key in &task_keys {
            pipe.del(key).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

fn task_to_fields(task: &Task) -> Result<Vec<(String, String)>, QueueError> {
    Ok(vec![
        ("input_path".to_string(), task.input_path.display().to_string()),
        ("output_path".to_string(), task.output_path.display().to_string()),
        ("filters".to_string(), serde_json::to_string(&task.filters)?),
        ("stop_on_error".to_string(), task.stop_on_error.to_string()),
        ("save_intermediate".to_string(), task.save_intermediate.to_string()),
        ("status".to_string(), task.status.to_string()),
        ("retry_count".to_string(), task.retry_count.to_string()),
        ("created_at".to_string(), task.created_at.to_rfc3339()),
    ])
}

fn fields_to_task(fields: HashMap<String, String>) -> Result<Task, QueueError> {
    let get = |key: &str| fields.get(key).cloned().unwrap_or_default();

    let filters = serde_json::from_str(&get("filters")).unwrap_or_default();
    let status = match get("status").as_str() {
        "processing" => TaskStatus::Processing,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "dead" => TaskStatus::Dead,
        _ => TaskStatus::Pending,
    };

    Ok(Task {
        id: String::new(),
        input_path: get("input_path").into(),
        output_path: get("output_path").into(),
        filters,
        stop_on_error: get("stop_on_error").parse().unwrap_or(true),
        save_intermediate: get("save_intermediate").parse().unwrap_or(false),
        status,
        retry_count: get("retry_count").parse().unwrap_or(0),
        last_error: fields.get("last_error").cloned(),
        created_at: fields
            .get("created_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
        started_at: fields
            .get("started_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc)),
        completed_at: fields
            .get("completed_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc)),
        failed_at: fields
            .get("failed_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|v| v.with_timezone(&Utc)),
        worker_id: fields.get("worker_id").cloned(),
        result: fields.get("result").and_then(|v| serde_json::from_str(v).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterDescriptor;

    #[test]
    fn task_round_trips_through_fields() {
        let task = Task::new("in.jpg", "out.jpg", vec![FilterDescriptor::new("grayscale")]);
        let fields_map: HashMap<String, String> = task_to_fields(&task).unwrap().into_iter().collect();
        let mut round_tripped = fields_to_task(fields_map).unwrap();
        round_tripped.id = task.id.clone();
        assert_eq!(round_tripped.id, task.id);
        assert_eq!(round_tripped.input_path, task.input_path);
        assert_eq!(round_tripped.filters.len(), 1);
        assert_eq!(round_tripped.status, TaskStatus::Pending);
        assert_eq!(round_tripped.failed_at, None);
    }

    #[test]
    fn failed_at_round_trips_once_set() {
        let mut fields_map: HashMap<String, String> = task_to_fields(&Task::new("in.jpg", "out.jpg", vec![])).unwrap().into_iter().collect();
        let failed_at = Utc::now();
        fields_map.insert("failed_at".to_string(), failed_at.to_rfc3339());
        let task = fields_to_task(fields_map).unwrap();
        assert_eq!(task.failed_at.unwrap().timestamp(), failed_at.timestamp());
    }

    #[test]
    fn queue_stats_total_sums_all_lists() {
        let stats = QueueStats {
            queue_name: "q".to_string(),
            pending: 1,
            processing: 2,
            completed: 3,
            failed: 4,
            dead_letter: 5,
            max_retries: 3,
        };
        assert_eq!(stats.total(), 15);
    }
}
