//! Distributed task execution: a Redis-backed queue plus a worker pool
//! that claims, runs and retries tasks.
//!
//! ```text
//!                      ┌──────────────┐
//!                      │   Producer   │
//!                      │  (CLI/batch) │
//!                      └──────┬───────┘
//!                             │
//!                      ┌──────▼───────┐
//!                      │    Redis     │
//!                      │ Task Queue   │
//!                      └──────┬───────┘
//!                             │
//!         ┌───────────────────┼───────────────────┐
//!         │                   │                   │
//!         ▼                   ▼                   ▼
//!    ┌─────────┐         ┌─────────┐         ┌─────────┐
//!    │ Worker 1│         │ Worker 2│         │ Worker N│
//!    └─────────┘         └─────────┘         └─────────┘
//! ```
//!
//! Each worker pool also runs one heartbeat ticker (registers liveness in
//! the [`crate::registry::WorkerRegistry`]) and one recovery sweep (routes
//! tasks stuck in `processing` back to `pending` or `dead_letter`).
//!
//! # Reliability
//!
//! - Atomic dequeue via `BRPOPLPUSH`
//! - Crash recovery: stuck tasks are swept back onto the queue
//! - Dead-letter routing after `max_retries` attempts
//! - Graceful shutdown via a broadcast signal, workers finish their current task first

pub mod queue;
pub mod task;
pub mod worker;

pub use queue::{QueueStats, TaskQueue};
pub use task::{Task, TaskStatus};
pub use worker::{PoolStats, WorkerPool};
