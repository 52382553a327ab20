//! Arguments handed to task handlers

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::TaskError;
use crate::protocol::TaskMessage;

/// Decoded arguments of one task execution
#[derive(Debug, Clone, PartialEq)]
pub struct TaskArgs {
    task_id: String,
    task: String,
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    retries: u32,
}

impl TaskArgs {
    /// Create arguments directly (useful for calling handlers in tests)
    pub fn new(task: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            task_id: String::new(),
            task: task.into(),
            args,
            kwargs: Map::new(),
            retries: 0,
        }
    }

    /// Set keyword arguments
    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Identity of the running task
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Registered name of the running task
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Retry count carried in the envelope
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Raw positional arguments
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Raw keyword arguments
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Deserialize the positional argument at `index`
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, TaskError> {
        let value = self.args.get(index).ok_or_else(|| {
            TaskError::new(format!(
                "{} expected argument {} but got {}",
                self.task,
                index,
                self.args.len()
            ))
            .with_type("TypeError")
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            TaskError::new(format!("argument {index} of {}: {e}", self.task)).with_type("TypeError")
        })
    }

    /// Deserialize all positional arguments at once, e.g. as a tuple
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        serde_json::from_value(Value::Array(self.args.clone())).map_err(|e| {
            TaskError::new(format!("arguments of {}: {e}", self.task)).with_type("TypeError")
        })
    }

    /// Deserialize the keyword argument `name`
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<T, TaskError> {
        let value = self.kwargs.get(name).ok_or_else(|| {
            TaskError::new(format!("{} missing keyword argument '{name}'", self.task))
                .with_type("TypeError")
        })?;
        serde_json::from_value(value.clone()).map_err(|e| {
            TaskError::new(format!("keyword argument '{name}' of {}: {e}", self.task))
                .with_type("TypeError")
        })
    }

    /// Deserialize all keyword arguments into a struct
    pub fn parse_kwargs<T: DeserializeOwned>(&self) -> Result<T, TaskError> {
        serde_json::from_value(Value::Object(self.kwargs.clone())).map_err(|e| {
            TaskError::new(format!("keyword arguments of {}: {e}", self.task))
                .with_type("TypeError")
        })
    }
}

impl From<TaskMessage> for TaskArgs {
    fn from(message: TaskMessage) -> Self {
        Self {
            task_id: message.id,
            task: message.task,
            args: message.args,
            kwargs: message.kwargs,
            retries: message.retries,
        }
    }
}
