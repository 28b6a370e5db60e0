//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by imageforge and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{Counter, CounterVec, Encoder, Gauge, GaugeVec, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all imageforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total number of tasks processed, labeled by status (completed/failed/dead).
pub static TASKS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Task processing duration in seconds.
pub static TASK_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Depth of each named broker list (pending/processing/dead_letter/...), labeled by list name.
pub static QUEUE_DEPTH: OnceLock<GaugeVec> = OnceLock::new();

/// Number of tasks currently being processed across the pool.
pub static TASKS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Total tasks routed to the dead letter queue.
pub static DEAD_LETTER_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Total times a stuck task was recovered by the recovery sweep.
pub static RECOVERED_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Per-filter application duration in seconds, labeled by filter kind.
pub static FILTER_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Number of workers currently registered as alive.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Initializes all metrics and registers them with the registry.
///
/// Should be called once at application startup.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due
/// to duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let tasks_total = CounterVec::new(
        Opts::new("imageforge_tasks_total", "Total number of tasks processed"),
        &["status"],
    )?;

    let task_duration = HistogramVec::new(
        prometheus::HistogramOpts::new("imageforge_task_duration_seconds", "Task processing duration in seconds")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
        &["status"],
    )?;

    let queue_depth = GaugeVec::new(
        Opts::new("imageforge_queue_depth", "Depth of each broker list"),
        &["list"],
    )?;

    let tasks_in_progress = Gauge::new("imageforge_tasks_in_progress", "Number of tasks currently being processed")?;

    let dead_letter_total = Counter::new("imageforge_dead_letter_total", "Total tasks routed to the dead letter queue")?;

    let recovered_total = Counter::new("imageforge_recovered_total", "Total stuck tasks recovered by the sweep")?;

    let filter_duration = HistogramVec::new(
        prometheus::HistogramOpts::new("imageforge_filter_duration_seconds", "Per-filter application duration in seconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["filter"],
    )?;

    let active_workers = Gauge::new("imageforge_active_workers", "Number of workers currently registered as alive")?;

    registry.register(Box::new(tasks_total.clone()))?;
    registry.register(Box::new(task_duration.clone()))?;
    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(tasks_in_progress.clone()))?;
    registry.register(Box::new(dead_letter_total.clone()))?;
    registry.register(Box::new(recovered_total.clone()))?;
    registry.register(Box::new(filter_duration.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent).
    let _ = REGISTRY.set(registry);
    let _ = TASKS_TOTAL.set(tasks_total);
    let _ = TASK_DURATION.set(task_duration);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = TASKS_IN_PROGRESS.set(tasks_in_progress);
    let _ = DEAD_LETTER_TOTAL.set(dead_letter_total);
    let _ = RECOVERED_TOTAL.set(recovered_total);
    let _ = FILTER_DURATION.set(filter_duration);
    let _ = ACTIVE_WORKERS.set(active_workers);

    tracing::info!("prometheus metrics initialized");

    Ok(())
}

/// Records a finished task outcome (`status` is `"completed"`, `"failed"` or
/// `"dead"`). A no-op if [`init_metrics`] hasn't run yet.
pub fn observe_task(status: &str, duration: std::time::Duration) {
    if let Some(counter) = TASKS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
    if let Some(histogram) = TASK_DURATION.get() {
        histogram.with_label_values(&[status]).observe(duration.as_secs_f64());
    }
}

/// Records one filter step's apply duration, labeled by filter kind.
pub fn observe_filter_duration(filter: &str, duration: std::time::Duration) {
    if let Some(histogram) = FILTER_DURATION.get() {
        histogram.with_label_values(&[filter]).observe(duration.as_secs_f64());
    }
}

/// Increments the in-flight task gauge; call when a claim worker picks up a task.
pub fn inc_tasks_in_progress() {
    if let Some(gauge) = TASKS_IN_PROGRESS.get() {
        gauge.inc();
    }
}

/// Decrements the in-flight task gauge; call when a claim worker finishes a task.
pub fn dec_tasks_in_progress() {
    if let Some(gauge) = TASKS_IN_PROGRESS.get() {
        gauge.dec();
    }
}

/// Increments the dead-letter counter by one.
pub fn inc_dead_letter() {
    if let Some(counter) = DEAD_LETTER_TOTAL.get() {
        counter.inc();
    }
}

/// Increments the recovery-sweep counter by one.
pub fn inc_recovered() {
    if let Some(counter) = RECOVERED_TOTAL.get() {
        counter.inc();
    }
}

/// Sets the active-workers gauge.
pub fn set_active_workers(count: i64) {
    if let Some(gauge) = ACTIVE_WORKERS.get() {
        gauge.set(count as f64);
    }
}

/// Sets one named list's depth gauge (`pending`, `processing`, `completed`,
/// `failed`, `dead_letter`).
pub fn set_queue_depth(list: &str, depth: i64) {
    if let Some(gauge) = QUEUE_DEPTH.get() {
        gauge.with_label_values(&[list]).set(depth as f64);
    }
}

/// Gathers every registered metric and encodes it in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {e}\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {e}\n"))
}

/// HTTP handler for a `/metrics` endpoint in whatever web framework wires it up.
pub async fn metrics_handler() -> String {
    export_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_is_idempotent() {
        let result = init_metrics();
        assert!(result.is_ok() || REGISTRY.get().is_some());
        let again = init_metrics();
        assert!(again.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn export_metrics_after_init_is_valid_text() {
        let _ = init_metrics();
        let metrics = export_metrics();
        assert!(!metrics.is_empty());
        assert!(!metrics.starts_with("# Error"));
    }

    #[test]
    fn recorders_are_reflected_in_exported_text() {
        let _ = init_metrics();
        observe_task("completed", std::time::Duration::from_millis(50));
        observe_filter_duration("grayscale", std::time::Duration::from_millis(5));
        inc_dead_letter();
        inc_recovered();
        set_active_workers(3);
        inc_tasks_in_progress();
        dec_tasks_in_progress();
        set_queue_depth("pending", 7);

        let exported = export_metrics();
        assert!(exported.contains("imageforge_tasks_total"));
        assert!(exported.contains("imageforge_active_workers 3"));
        assert!(exported.contains("imageforge_queue_depth"));
    }
}
