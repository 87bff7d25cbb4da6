//! Error types for the task queue

use thiserror::Error;

/// Result type alias for task queue operations
pub type TaskResult<T> = Result<T, TaskError>;

/// Error taxonomy for the task queue core (spec §7).
#[derive(Error, Debug)]
pub enum TaskError {
    /// Redis connection or transaction failure
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Payload encoding/decoding error. The core itself never parses `payload`;
    /// this exists for handler implementations that choose to JSON-encode theirs.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A registered handler returned an error while executing a task
    #[error("handler for task type '{task_type}' failed: {message}")]
    HandlerFailure { task_type: String, message: String },

    /// No handler registered for a dequeued task's type
    #[error("no handler registered for task type '{task_type}'")]
    NoHandler { task_type: String },

    /// A dequeue transaction returned an unexpected number of sub-replies.
    /// Never propagated from the hot path (dequeue returns `Ok(None)` instead);
    /// kept as a named variant for diagnostics and tests.
    #[error("unexpected transaction reply shape: expected {expected} sub-replies, got {actual}")]
    Shape { expected: usize, actual: usize },

    /// Invalid configuration
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Operation timed out
    #[error("operation timed out: {operation}")]
    Timeout { operation: String },
}

impl TaskError {
    pub fn handler_failure<S: Into<String>>(task_type: S, message: S) -> Self {
        Self::HandlerFailure {
            task_type: task_type.into(),
            message: message.into(),
        }
    }

    pub fn no_handler<S: Into<String>>(task_type: S) -> Self {
        Self::NoHandler {
            task_type: task_type.into(),
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// A permanent failure is routed straight to `Failed` without consuming a retry
    /// (spec §7: "Implementers SHOULD treat this as a permanent failure").
    pub fn is_permanent(&self) -> bool {
        matches!(self, TaskError::NoHandler { .. })
    }
}
