//! Error types surfaced to producers

use std::time::Duration;

use serde_json::Value;

use crate::backend::StoreError;
use crate::broker::BrokerError;
use crate::protocol::{ProtocolError, ResultMessage};

/// Errors returned by the client and by async results
#[derive(Debug, thiserror::Error)]
pub enum CeleryError {
    /// Task arguments could not be encoded; nothing was sent
    #[error("failed to encode task: {0}")]
    Encode(#[from] ProtocolError),

    /// The broker rejected the task; nothing was sent
    #[error("failed to send task: {0}")]
    Transport(#[from] BrokerError),

    /// A result store lookup failed
    #[error("failed to read result: {0}")]
    Store(#[from] StoreError),

    /// The task ran and reported failure
    #[error("{0}")]
    TaskFailed(TaskFailure),

    /// No terminal outcome within the allotted time
    #[error("{elapsed:?} timeout getting result for {task_id}")]
    Timeout { task_id: String, elapsed: Duration },

    /// The success value does not have the requested type
    #[error("failed to decode result of {task_id}: {message}")]
    Decode { task_id: String, message: String },
}

impl CeleryError {
    /// Whether this error is a terminal task outcome
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::TaskFailed(_))
    }

    /// The task failure, if this error is one
    pub fn as_task_failure(&self) -> Option<&TaskFailure> {
        match self {
            Self::TaskFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A failure record read back from the result store
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    /// Identity of the failed task
    pub task_id: String,

    /// Stored status (anything other than `SUCCESS`)
    pub status: String,

    /// Exception type, when the record carries one
    pub exc_type: Option<String>,

    /// Failure description
    pub message: String,

    /// The stored `result` payload, unchanged
    pub payload: Value,
}

impl TaskFailure {
    pub(crate) fn from_record(task_id: &str, record: ResultMessage) -> Self {
        Self {
            task_id: task_id.to_string(),
            exc_type: record.exc_type().map(str::to_string),
            message: record.failure_message(),
            status: record.status,
            payload: record.result,
        }
    }

    /// Whether the failure reports a task nobody registered
    pub fn is_not_registered(&self) -> bool {
        self.exc_type.as_deref() == Some(crate::task::NOT_REGISTERED_EXC_TYPE)
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.exc_type {
            Some(exc_type) => write!(
                f,
                "task {} failed with status {}: {}: {}",
                self.task_id, self.status, exc_type, self.message
            ),
            None => write!(
                f,
                "task {} failed with status {}: {}",
                self.task_id, self.status, self.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_from_record() {
        let record = ResultMessage::failure("t-1", "ValueError", "bad input");
        let failure = TaskFailure::from_record("t-1", record);

        assert_eq!(failure.status, "FAILURE");
        assert_eq!(failure.exc_type.as_deref(), Some("ValueError"));
        assert_eq!(failure.message, "bad input");
        assert!(!failure.is_not_registered());
        assert_eq!(
            failure.to_string(),
            "task t-1 failed with status FAILURE: ValueError: bad input"
        );
    }

    #[test]
    fn test_timeout_message_names_task() {
        let err = CeleryError::Timeout {
            task_id: "abc".to_string(),
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(err.to_string(), "1s timeout getting result for abc");
        assert!(!err.is_task_failure());
    }
}
