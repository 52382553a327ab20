//! Producer-facing client
//!
//! Sends tasks to the broker and hands back [`AsyncResult`]s. Every client
//! owns a [`WorkerPool`] bound to the same broker and store, so one process
//! can both produce and consume a task set.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::backend::ResultBackend;
use crate::broker::Broker;
use crate::error::CeleryError;
use crate::protocol::{self, CeleryMessage, TaskMessage};
use crate::result::{AsyncResult, PollConfig};
use crate::task::{TaskArgs, TaskResult};
use crate::worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError};

/// Client for sending Celery tasks
///
/// # Example
///
/// ```
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use everruns_celery::{CeleryClient, InMemoryBroker, InMemoryResultBackend, TaskArgs};
/// use serde_json::json;
///
/// let client = CeleryClient::new(
///     Arc::new(InMemoryBroker::new()),
///     Arc::new(InMemoryResultBackend::new()),
///     2,
/// );
/// client.register("add", |args: TaskArgs| async move {
///     let (a, b): (i64, i64) = args.parse()?;
///     Ok(json!(a + b))
/// });
/// client.start_worker()?;
///
/// let result = client.delay("add", (2, 3)).await?;
/// assert_eq!(result.get(Duration::from_secs(1)).await?, json!(5));
///
/// client.stop_worker().await?;
/// # Ok(())
/// # }
/// ```
pub struct CeleryClient {
    broker: Arc<dyn Broker>,
    backend: Arc<dyn ResultBackend>,
    worker: WorkerPool,
    poll: PollConfig,
}

impl CeleryClient {
    /// Create a client whose worker pool runs `num_workers` executors
    pub fn new(
        broker: Arc<dyn Broker>,
        backend: Arc<dyn ResultBackend>,
        num_workers: usize,
    ) -> Self {
        Self::with_config(broker, backend, WorkerPoolConfig::new(num_workers))
    }

    /// Create a client with a full worker pool configuration
    pub fn with_config(
        broker: Arc<dyn Broker>,
        backend: Arc<dyn ResultBackend>,
        config: WorkerPoolConfig,
    ) -> Self {
        let worker = WorkerPool::new(Arc::clone(&broker), Arc::clone(&backend), config);
        Self {
            broker,
            backend,
            worker,
            poll: PollConfig::default(),
        }
    }

    /// Create a client configured from environment variables
    ///
    /// See [`WorkerPoolConfig::from_env`] and [`PollConfig::from_env`].
    pub fn from_env(broker: Arc<dyn Broker>, backend: Arc<dyn ResultBackend>) -> Self {
        Self::with_config(broker, backend, WorkerPoolConfig::from_env())
            .with_poll_config(PollConfig::from_env())
    }

    /// Set the polling backoff of returned results
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Register a task handler with the bound worker pool
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.worker.register(name, handler);
    }

    /// Start the bound worker pool
    pub fn start_worker(&self) -> Result<(), WorkerPoolError> {
        self.worker.start()
    }

    /// Stop the bound worker pool gracefully
    pub async fn stop_worker(&self) -> Result<(), WorkerPoolError> {
        self.worker.stop().await
    }

    /// The bound worker pool
    pub fn worker(&self) -> &WorkerPool {
        &self.worker
    }

    /// Send a task with positional arguments
    ///
    /// `args` must serialize to a list: a tuple, array, slice or `Vec`, or
    /// `()` for no arguments.
    pub async fn delay<A: Serialize>(
        &self,
        task: &str,
        args: A,
    ) -> Result<AsyncResult, CeleryError> {
        let args = protocol::to_args(args)?;
        self.send_task(TaskMessage::new(task, args)).await
    }

    /// Send a task with keyword arguments
    ///
    /// `kwargs` must serialize to an object: a struct or a string-keyed map.
    pub async fn delay_kwargs<K: Serialize>(
        &self,
        task: &str,
        kwargs: K,
    ) -> Result<AsyncResult, CeleryError> {
        let kwargs = protocol::to_kwargs(kwargs)?;
        self.send_task(TaskMessage::new(task, vec![]).with_kwargs(kwargs))
            .await
    }

    /// Send a prepared task message
    #[instrument(skip_all, fields(task_id = %task.id, task = %task.task))]
    pub async fn send_task(&self, task: TaskMessage) -> Result<AsyncResult, CeleryError> {
        let message = CeleryMessage::from_task(&task)?;
        self.broker.send(&message).await?;
        debug!("Task sent");
        Ok(self.async_result(task.id))
    }

    /// Bind a result handle to a task identity obtained elsewhere
    pub fn async_result(&self, task_id: impl Into<String>) -> AsyncResult {
        AsyncResult::new(task_id, Arc::clone(&self.backend)).with_poll_config(self.poll.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::broker::{BrokerError, InMemoryBroker};
    use crate::backend::InMemoryResultBackend;

    struct DownBroker;

    #[async_trait]
    impl Broker for DownBroker {
        async fn send(&self, _message: &CeleryMessage) -> Result<(), BrokerError> {
            Err(BrokerError::Connection("connection refused".to_string()))
        }

        async fn receive(&self) -> Result<Option<CeleryMessage>, BrokerError> {
            Ok(None)
        }
    }

    fn client() -> (CeleryClient, Arc<InMemoryBroker>, Arc<InMemoryResultBackend>) {
        let broker = Arc::new(InMemoryBroker::new());
        let backend = Arc::new(InMemoryResultBackend::new());
        let client = CeleryClient::new(broker.clone(), backend.clone(), 1);
        (client, broker, backend)
    }

    #[tokio::test]
    async fn test_delay_sends_envelope() {
        let (client, broker, backend) = client();

        let result = client.delay("add", (2, 3)).await.unwrap();
        assert_eq!(broker.len(), 1);

        let message = broker.receive().await.unwrap().unwrap();
        let task = message.task_message().unwrap();
        assert_eq!(task.id, result.task_id());
        assert_eq!(task.task, "add");
        assert_eq!(task.args, vec![json!(2), json!(3)]);

        // nothing has run yet
        assert_eq!(result.try_get().await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_delay_assigns_fresh_identities() {
        let (client, _, _) = client();
        let a = client.delay("noop", ()).await.unwrap();
        let b = client.delay("noop", ()).await.unwrap();
        assert_ne!(a.task_id(), b.task_id());
    }

    #[tokio::test]
    async fn test_delay_kwargs() {
        let (client, broker, _) = client();

        client
            .delay_kwargs("greet", HashMap::from([("name", "ada")]))
            .await
            .unwrap();

        let task = broker.receive().await.unwrap().unwrap().task_message().unwrap();
        assert!(task.args.is_empty());
        assert_eq!(task.kwargs["name"], json!("ada"));
    }

    #[tokio::test]
    async fn test_encode_error_sends_nothing() {
        let (client, broker, _) = client();

        let err = client.delay("add", 5).await.unwrap_err();
        assert!(matches!(err, CeleryError::Encode(_)));
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error() {
        let client = CeleryClient::new(
            Arc::new(DownBroker),
            Arc::new(InMemoryResultBackend::new()),
            1,
        );

        let err = client.delay("add", (1, 2)).await.unwrap_err();
        assert!(matches!(err, CeleryError::Transport(BrokerError::Connection(_))));
    }

    #[tokio::test]
    async fn test_async_result_rebinds_identity() {
        let (client, _, _) = client();
        let sent = client.delay("noop", ()).await.unwrap();

        let rebound = client.async_result(sent.task_id());
        assert_eq!(rebound.task_id(), sent.task_id());
    }
}
