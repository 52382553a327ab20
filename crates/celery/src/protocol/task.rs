//! Task body (Celery protocol v1)

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::ProtocolError;

/// The body of a task message
///
/// Field names follow the Celery protocol v1 body so that workers written in
/// other languages can consume what this library produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Task identity, also the result store correlation key
    pub id: String,

    /// Registered task name
    pub task: String,

    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,

    /// Keyword arguments
    #[serde(default)]
    pub kwargs: Map<String, Value>,

    /// Number of times this task has been retried
    #[serde(default)]
    pub retries: u32,

    /// Scheduled execution time; carried through, never interpreted
    #[serde(default)]
    pub eta: Option<String>,

    /// Expiry time; carried through, never interpreted
    #[serde(default)]
    pub expires: Option<String>,
}

impl TaskMessage {
    /// Create a task message with a fresh identity
    pub fn new(task: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            args,
            kwargs: Map::new(),
            retries: 0,
            eta: None,
            expires: None,
        }
    }

    /// Set keyword arguments
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Encode as base64 JSON, the form carried in an envelope body
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let json = serde_json::to_vec(self).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(STANDARD.encode(json))
    }

    /// Decode from a base64 JSON envelope body
    pub fn decode(body: &str) -> Result<Self, ProtocolError> {
        let json = STANDARD
            .decode(body.trim())
            .map_err(|e| ProtocolError::Decode(format!("invalid base64 body: {e}")))?;
        serde_json::from_slice(&json).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Convert caller arguments into a positional argument list
///
/// Tuples, arrays, slices and `Vec`s become the list; `()` means no
/// arguments. Anything that does not serialize to a JSON array is rejected.
pub fn to_args<A: Serialize>(args: A) -> Result<Vec<Value>, ProtocolError> {
    match serde_json::to_value(args).map_err(|e| ProtocolError::InvalidArguments(e.to_string()))? {
        Value::Array(values) => Ok(values),
        Value::Null => Ok(Vec::new()),
        other => Err(ProtocolError::InvalidArguments(format!(
            "positional arguments must form a list, got {}",
            kind(&other)
        ))),
    }
}

/// Convert caller keyword arguments into an argument map
///
/// Structs and string-keyed maps are accepted; `()` means no arguments.
pub fn to_kwargs<K: Serialize>(kwargs: K) -> Result<Map<String, Value>, ProtocolError> {
    match serde_json::to_value(kwargs)
        .map_err(|e| ProtocolError::InvalidArguments(e.to_string()))?
    {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ProtocolError::InvalidArguments(format!(
            "keyword arguments must form an object, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
