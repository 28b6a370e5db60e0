//! Prometheus-based metrics for imageforge: queue depths, task throughput,
//! and active worker counts.
//!
//! ```ignore
//! use imageforge::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("failed to initialize metrics");
//! let metrics_text = export_metrics();
//! ```

pub mod prometheus;

pub use prometheus::{export_metrics, init_metrics, metrics_handler};
pub use prometheus::{
    dec_tasks_in_progress, inc_dead_letter, inc_recovered, inc_tasks_in_progress, observe_filter_duration,
    observe_task, set_active_workers, set_queue_depth,
};
pub use prometheus::{
    ACTIVE_WORKERS, DEAD_LETTER_TOTAL, FILTER_DURATION, QUEUE_DEPTH, RECOVERED_TOTAL, REGISTRY, TASKS_IN_PROGRESS,
    TASKS_TOTAL, TASK_DURATION,
};
