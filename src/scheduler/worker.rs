//! Worker pool: a claim loop, a heartbeat ticker and a recovery sweep
//! running as concurrent activities, grounded on `scheduler/worker_pool.rs`'s
//! broadcast-channel shutdown pattern plus `workers/__main__.py`'s env-var
//! wiring for the monitored worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::PoolError;
use crate::filters::FilterFactory;
use crate::metrics;
use crate::registry::WorkerRegistry;
use crate::scheduler::queue::TaskQueue;
use crate::scheduler::task::Task;

/// Statistics about the worker pool, point-in-time snapshot.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub num_workers: usize,
    pub active_workers: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub average_task_duration: Duration,
}

impl PoolStats {
    pub fn total_processed(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.tasks_completed as f64 / total as f64) * 100.0
    }
}

struct SharedPoolStats {
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self {
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            active_workers: AtomicU64::new(0),
        }
    }

    fn record_completion(&self, duration: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_failure(&self, duration: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::SeqCst);
        self.total_duration_ms.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.tasks_completed.load(Ordering::SeqCst);
        let failed = self.tasks_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);
        let total = completed + failed;
        let average = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            tasks_completed: completed,
            tasks_failed: failed,
            average_task_duration: average,
        }
    }
}

/// A pool of claim-loop workers plus one heartbeat ticker and one recovery
/// sweep, all sharing a single broadcast shutdown signal.
pub struct WorkerPool {
    config: Config,
    queue: Arc<TaskQueue>,
    registry: Arc<WorkerRegistry>,
    factory: Arc<FilterFactory>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
    is_running: AtomicBool,
}

impl WorkerPool {
    pub fn new(config: Config, queue: TaskQueue, registry: WorkerRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            queue: Arc::new(queue),
            registry: Arc::new(registry),
            factory: Arc::new(FilterFactory::new()),
            shutdown_tx,
            handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// Recovers any tasks stuck in `processing` from a previous run, then
    /// spawns `num_workers` claim-loop tasks, one heartbeat ticker and one
    /// recovery-sweep task.
    pub async fn start(&mut self) -> Result<(), PoolError> {
        match self.queue.recover_stuck_tasks().await {
            Ok(recovered) if recovered > 0 => {
                info!(recovered, "recovered stuck tasks from a previous run");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to recover stuck tasks on startup"),
        }

        self.registry.register(&self.config.worker_id, None).await?;

        for i in 0..self.config.num_workers {
            let claim_worker = ClaimWorker {
                id: format!("{}-{i}", self.config.worker_id),
                queue: Arc::clone(&self.queue),
                factory: Arc::clone(&self.factory),
                shutdown_rx: self.shutdown_tx.subscribe(),
                poll_interval: Duration::from_secs(1),
                stats: Arc::clone(&self.stats),
            };
            self.handles.push(tokio::spawn(async move { claim_worker.run().await }));
        }

        self.handles.push(tokio::spawn(heartbeat_loop(
            Arc::clone(&self.registry),
            self.config.worker_id.clone(),
            self.config.heartbeat_interval,
            self.shutdown_tx.subscribe(),
        )));

        self.handles.push(tokio::spawn(recovery_loop(
            Arc::clone(&self.queue),
            self.config.recovery_interval,
            self.shutdown_tx.subscribe(),
        )));

        self.is_running.store(true, Ordering::SeqCst);
        info!(num_workers = self.config.num_workers, "worker pool started");
        Ok(())
    }

    /// Broadcasts a shutdown signal and waits (with a fixed timeout) for
    /// every worker, heartbeat and recovery task to finish.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), PoolError> {
        let _ = self.shutdown_tx.send(());
        let pending = self.handles.len();

        let join_all = async {
            for handle in self.handles.drain(..) {
                if let Err(e) = handle.await {
                    error!(error = %e, "worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => {
                self.is_running.store(false, Ordering::SeqCst);
                let _ = self.registry.unregister(&self.config.worker_id).await;
                Ok(())
            }
            Err(_) => {
                self.is_running.store(false, Ordering::SeqCst);
                Err(PoolError::ShutdownTimeout(pending))
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }
}

/// One claim-loop worker: poll `TaskQueue::claim`, run the filter pipeline,
/// route to `mark_completed`/`mark_failed`.
struct ClaimWorker {
    id: String,
    queue: Arc<TaskQueue>,
    factory: Arc<FilterFactory>,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
    stats: Arc<SharedPoolStats>,
}

impl ClaimWorker {
    async fn run(mut self) {
        info!(worker_id = %self.id, "claim loop started");
        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                break;
            }

            match self.queue.claim(&self.id, self.poll_interval).await {
                Ok(Some(task)) => {
                    self.stats.increment_active();
                    metrics::inc_tasks_in_progress();
                    self.process_task(task).await;
                    metrics::dec_tasks_in_progress();
                    self.stats.decrement_active();
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "claim failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        info!(worker_id = %self.id, "claim loop stopped");
    }

    async fn process_task(&self, task: Task) {
        let start = Instant::now();
        let task_id = task.id.clone();

        let outcome = self.run_pipeline(&task).await;
        match outcome {
            Ok(result) => {
                if let Err(e) = self.queue.mark_completed(&task_id, Some(result)).await {
                    error!(task_id = %task_id, error = %e, "failed to mark task completed");
                }
                self.stats.record_completion(start.elapsed());
                metrics::observe_task("completed", start.elapsed());
                info!(task_id = %task_id, worker_id = %self.id, duration_ms = start.elapsed().as_millis() as u64, "task completed");
            }
            Err(error) => {
                if let Err(e) = self.queue.mark_failed(&task_id, &error, true).await {
                    error!(task_id = %task_id, error = %e, "failed to mark task failed");
                }
                self.stats.record_failure(start.elapsed());
                metrics::observe_task("failed", start.elapsed());
                warn!(task_id = %task_id, worker_id = %self.id, error = %error, "task failed");
            }
        }
    }

    async fn run_pipeline(&self, task: &Task) -> Result<serde_json::Value, String> {
        let image = image::open(&task.input_path).map_err(|e| e.to_string())?;
        let pipeline = self
            .factory
            .create_pipeline(&task.filters, task.stop_on_error, task.save_intermediate)
            .map_err(|e| e.to_string())?;

        let (result, stats) = pipeline.apply(&image, None).map_err(|e| e.to_string())?;
        let Some(result) = result else {
            return Err("pipeline failed completely".to_string());
        };

        if let Some(parent) = task.output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        result.to_rgb8().save(&task.output_path).map_err(|e| e.to_string())?;

        Ok(serde_json::json!({
            "output_path": task.output_path,
            "successful_steps": stats.successful,
            "failed_steps": stats.failed,
        }))
    }
}

async fn heartbeat_loop(
    registry: Arc<WorkerRegistry>,
    worker_id: String,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = registry.send_heartbeat(&worker_id).await {
                    warn!(worker_id = %worker_id, error = %e, "heartbeat failed");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

async fn recovery_loop(queue: Arc<TaskQueue>, interval: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match queue.recover_stuck_tasks().await {
                    Ok(recovered) if recovered > 0 => info!(recovered, "recovery sweep routed stuck tasks"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "recovery sweep failed"),
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_stats_success_rate_handles_zero_total() {
        let stats = PoolStats::default();
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn pool_stats_success_rate_computes_percentage() {
        let stats = PoolStats {
            num_workers: 2,
            active_workers: 0,
            tasks_completed: 3,
            tasks_failed: 1,
            average_task_duration: Duration::ZERO,
        };
        assert_eq!(stats.total_processed(), 4);
        assert_eq!(stats.success_rate(), 75.0);
    }

    #[test]
    fn shared_pool_stats_tracks_completion_and_failure() {
        let shared = SharedPoolStats::new();
        shared.record_completion(Duration::from_millis(100));
        shared.record_failure(Duration::from_millis(300));
        let stats = shared.to_pool_stats(1);
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(stats.tasks_failed, 1);
        assert_eq!(stats.average_task_duration, Duration::from_millis(200));
    }
}
