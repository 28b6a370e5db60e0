//! The [`Task`] record, grounded on `scheduler/job.rs`'s `Job`/`JobResult` shape.

use crate::filters::FilterDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// A unit of work: apply a filter pipeline to one input image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub filters: Vec<FilterDescriptor>,
    pub stop_on_error: bool,
    pub save_intermediate: bool,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Dead => "dead",
        };
        write!(f, "{s}")
    }
}

impl Task {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        filters: Vec<FilterDescriptor>,
    ) -> Self {
        Self {
            id: format!("task-{}", Utc::now().timestamp_millis()),
            input_path: input_path.into(),
            output_path: output_path.into(),
            filters,
            stop_on_error: true,
            save_intermediate: false,
            status: TaskStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            failed_at: None,
            worker_id: None,
            result: None,
        }
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn with_save_intermediate(mut self, save_intermediate: bool) -> Self {
        self.save_intermediate = save_intermediate;
        self
    }

    pub fn should_retry(&self, max_retries: u32) -> bool {
        self.retry_count < max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_pending_with_no_retries() {
        let task = Task::new("in.jpg", "out.jpg", vec![FilterDescriptor::new("grayscale")]);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert!(task.should_retry(3));
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let mut task = Task::new("in.jpg", "out.jpg", vec![]);
        task.retry_count = 3;
        assert!(!task.should_retry(3));
        task.retry_count = 2;
        assert!(task.should_retry(3));
    }

    #[test]
    fn status_display_matches_wire_value() {
        assert_eq!(TaskStatus::Dead.to_string(), "dead");
        assert_eq!(TaskStatus::Processing.to_string(), "processing");
    }
}
