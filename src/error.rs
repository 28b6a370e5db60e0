//! Error types for imageforge.
//!
//! One enum per subsystem rather than a single crate-wide error type:
//! filters, the factory, the pipeline, the task queue, the worker
//! registry and the worker pool all fail in distinct ways.

use thiserror::Error;

/// Errors that can occur while constructing or applying a [`crate::filters::Filter`].
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("blur radius must be >= 0.0, got {0}")]
    InvalidRadius(f32),

    #[error("brightness factor must be > 0.0, got {0}")]
    InvalidFactor(f32),

    #[error("image {width}x{height} is too small for edge detection, need at least 3x3")]
    ImageTooSmallForEdges { width: u32, height: u32 },

    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Errors raised by [`crate::filters::FilterFactory`].
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("unknown filter type '{requested}', available: {available}")]
    UnknownFilter { requested: String, available: String },

    #[error("missing 'type' key in filter descriptor")]
    MissingType,

    #[error("invalid parameters for filter '{filter_type}': {reason}")]
    InvalidParameters { filter_type: String, reason: String },

    #[error("filter at index {index} (type '{filter_type}') failed to build: {source}")]
    PipelineStepBuild {
        index: usize,
        filter_type: String,
        #[source]
        source: Box<FactoryError>,
    },
}

/// Errors raised while composing or running a [`crate::pipeline::FilterPipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a pipeline requires at least one filter")]
    EmptyPipeline,

    #[error("every step in the pipeline failed")]
    TotalFailure,

    #[error("I/O failure writing intermediate output: {0}")]
    Io(#[from] std::io::Error),

    #[error("index {0} out of range for pipeline of length {1}")]
    IndexOutOfRange(usize, usize),

    #[error("factory error: {0}")]
    Factory(#[from] FactoryError),
}

/// Errors raised by [`crate::scheduler::TaskQueue`].
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to connect to broker: {0}")]
    ConnectionFailed(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("task '{0}' not found")]
    TaskNotFound(String),

    #[error("queue is empty")]
    QueueEmpty,
}

/// Errors raised by [`crate::registry::WorkerRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("worker '{0}' not found")]
    WorkerNotFound(String),
}

/// Errors raised by [`crate::scheduler::WorkerPool`] / the worker loop.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("task '{0}' timed out after {1:?}")]
    Timeout(String, std::time::Duration),

    #[error("shutdown timed out waiting for {0} worker(s)")]
    ShutdownTimeout(usize),
}

/// Errors raised while loading [`crate::config::Config`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised by [`crate::pipeline::BatchProcessor`].
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("input directory does not exist: {0}")]
    InputDirNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}
