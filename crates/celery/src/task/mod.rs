//! Task handlers
//!
//! This module provides:
//! - [`TaskArgs`] - decoded arguments handed to a handler
//! - [`TaskError`] - the failure a handler reports
//! - [`TaskRegistry`] - name-based handler lookup shared by executors

mod args;
mod registry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use args::TaskArgs;
pub use registry::TaskRegistry;

/// Exception type recorded when a handler returns an error without one
pub const DEFAULT_EXC_TYPE: &str = "TaskError";

/// Exception type recorded for tasks nobody registered
pub const NOT_REGISTERED_EXC_TYPE: &str = "NotRegistered";

/// Exception type recorded when a handler panics
pub const PANICKED_EXC_TYPE: &str = "TaskPanicked";

/// Error reported by a task handler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskError {
    /// Exception type written to the result record
    pub exc_type: String,

    /// Failure description
    pub message: String,
}

impl TaskError {
    /// Create an error with the default exception type
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            exc_type: DEFAULT_EXC_TYPE.to_string(),
            message: message.into(),
        }
    }

    /// Set the exception type
    pub fn with_type(mut self, exc_type: impl Into<String>) -> Self {
        self.exc_type = exc_type.into();
        self
    }

    /// Error for a task name with no registered handler
    pub fn not_registered(task: &str) -> Self {
        Self::new(format!("unregistered task: {task}")).with_type(NOT_REGISTERED_EXC_TYPE)
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.exc_type, self.message)
    }
}

impl std::error::Error for TaskError {}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string()).with_type("ValueError")
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Handler execution result
pub type TaskResult = Result<serde_json::Value, TaskError>;

/// Handler function type
pub type TaskHandler =
    Arc<dyn Fn(TaskArgs) -> Pin<Box<dyn Future<Output = TaskResult> + Send>> + Send + Sync>;
