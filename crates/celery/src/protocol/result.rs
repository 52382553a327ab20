//! Result record written by workers

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ProtocolError;

/// Status of a successful task
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Status of a failed task
pub const STATUS_FAILURE: &str = "FAILURE";

/// Result record stored under the task identity
///
/// Readers compare `status` against [`STATUS_SUCCESS`] literally; any other
/// value is a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub task_id: String,
    pub status: String,

    #[serde(default)]
    pub traceback: Option<String>,

    #[serde(default)]
    pub result: Value,

    #[serde(default)]
    pub children: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_done: Option<String>,
}

impl ResultMessage {
    /// Record a successful execution
    pub fn success(task_id: impl Into<String>, result: Value) -> Self {
        Self {
            task_id: task_id.into(),
            status: STATUS_SUCCESS.to_string(),
            traceback: None,
            result,
            children: vec![],
            date_done: Some(now()),
        }
    }

    /// Record a failed execution
    ///
    /// The result holds the exception payload Celery clients expect.
    pub fn failure(
        task_id: impl Into<String>,
        exc_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            task_id: task_id.into(),
            status: STATUS_FAILURE.to_string(),
            traceback: Some(message.clone()),
            result: json!({
                "exc_type": exc_type.into(),
                "exc_message": message,
            }),
            children: vec![],
            date_done: Some(now()),
        }
    }

    /// Whether the record reports success
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Exception type of a failure record, when present
    pub fn exc_type(&self) -> Option<&str> {
        self.result.get("exc_type").and_then(Value::as_str)
    }

    /// Human-readable failure description
    ///
    /// Python workers store `exc_message` as a list of exception arguments.
    pub fn failure_message(&self) -> String {
        match self.result.get("exc_message") {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Array(parts)) if !parts.is_empty() => parts
                .iter()
                .map(|p| match p {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", "),
            _ => self
                .traceback
                .clone()
                .unwrap_or_else(|| self.result.to_string()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
