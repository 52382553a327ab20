//! Registry of task handlers
//!
//! Maps task names to handlers. The worker pool owns one registry, fills it
//! before starting, and hands each executor a shared read-only snapshot.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{TaskArgs, TaskHandler, TaskResult};

/// Registry of task handlers keyed by task name
#[derive(Clone, Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, TaskHandler>,
}

impl TaskRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, replacing any previous one
    ///
    /// # Example
    ///
    /// ```
    /// use everruns_celery::task::{TaskArgs, TaskRegistry};
    /// use serde_json::json;
    ///
    /// let mut registry = TaskRegistry::new();
    /// registry.register("add", |args: TaskArgs| async move {
    ///     let (a, b): (i64, i64) = args.parse()?;
    ///     Ok(json!(a + b))
    /// });
    /// assert!(registry.contains("add"));
    /// ```
    pub fn register<F, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let handler: TaskHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.handlers.insert(name.to_string(), handler);
    }

    /// Look up the handler for `name`
    pub fn get(&self, name: &str) -> Option<TaskHandler> {
        self.handlers.get(name).map(Arc::clone)
    }

    /// Check if a task name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered task names
    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::task::TaskError;

    #[test]
    fn test_empty_registry() {
        let registry = TaskRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut registry = TaskRegistry::new();
        registry.register("add", |args: TaskArgs| async move {
            let (a, b): (i64, i64) = args.parse()?;
            Ok(json!(a + b))
        });
        registry.register("boom", |_args: TaskArgs| async move {
            Err(TaskError::new("bad input"))
        });

        assert_eq!(registry.len(), 2);
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["add", "boom"]);

        let add = registry.get("add").unwrap();
        let sum = add(TaskArgs::new("add", vec![json!(2), json!(3)])).await;
        assert_eq!(sum, Ok(json!(5)));

        let boom = registry.get("boom").unwrap();
        let err = boom(TaskArgs::new("boom", vec![])).await.unwrap_err();
        assert_eq!(err.message, "bad input");
    }

    #[tokio::test]
    async fn test_register_replaces_existing() {
        let mut registry = TaskRegistry::new();
        registry.register("v", |_args: TaskArgs| async move { Ok(json!(1)) });
        registry.register("v", |_args: TaskArgs| async move { Ok(json!(2)) });

        assert_eq!(registry.len(), 1);
        let handler = registry.get("v").unwrap();
        assert_eq!(handler(TaskArgs::new("v", vec![])).await, Ok(json!(2)));
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut registry = TaskRegistry::new();
        registry.register("a", |_args: TaskArgs| async move { Ok(json!(null)) });
        let snapshot = registry.clone();
        registry.register("b", |_args: TaskArgs| async move { Ok(json!(null)) });

        assert!(!snapshot.contains("b"));
        assert!(registry.contains("b"));
    }
}
