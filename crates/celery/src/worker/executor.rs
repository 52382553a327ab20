//! Single executor loop
//!
//! Each executor receives one envelope at a time, runs the matching handler
//! and writes the outcome before asking the broker for the next envelope.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, instrument, trace, warn};

use crate::backend::{self, ResultBackend};
use crate::broker::{Broker, BrokerError};
use crate::protocol::{CeleryMessage, ResultMessage};
use crate::task::{TaskArgs, TaskError, TaskRegistry, PANICKED_EXC_TYPE};

/// Pause after a failed receive before asking the broker again
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

pub(crate) struct Executor {
    pub(crate) index: usize,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) backend: Arc<dyn ResultBackend>,
    pub(crate) registry: Arc<TaskRegistry>,
    pub(crate) in_flight: Arc<AtomicUsize>,
    pub(crate) rate_limit_period: Option<Duration>,
}

impl Executor {
    /// Run until shutdown is signaled or the signal sender is dropped
    pub(crate) async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(executor = self.index, "Executor started");

        let mut ticker = self.rate_limit_period.map(tokio::time::interval);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if let Some(ticker) = ticker.as_mut() {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown_rx.changed() => break,
                }
            }

            let received = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                received = self.broker.receive() => received,
            };

            match received {
                Ok(Some(message)) => self.process(message).await,
                Ok(None) => trace!(executor = self.index, "No message received"),
                Err(BrokerError::Closed) => {
                    warn!(executor = self.index, "Broker closed, executor exiting");
                    break;
                }
                Err(BrokerError::Serialization(e)) => {
                    error!(executor = self.index, "Dropping undecodable message: {}", e);
                }
                Err(e) => {
                    error!(executor = self.index, "Receive error: {}", e);
                    tokio::select! {
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                        _ = shutdown_rx.changed() => break,
                    }
                }
            }
        }

        debug!(executor = self.index, "Executor exited");
    }

    /// Execute one envelope and record its outcome
    #[instrument(skip_all, fields(executor = self.index))]
    pub(crate) async fn process(&self, message: CeleryMessage) {
        let task = match message.task_message() {
            Ok(task) => task,
            Err(e) => {
                error!("Dropping undecodable message: {}", e);
                return;
            }
        };

        let task_id = task.id.clone();
        let name = task.task.clone();

        let record = match self.registry.get(&name) {
            None => {
                warn!(%task_id, task = %name, "Task is not registered");
                let err = TaskError::not_registered(&name);
                ResultMessage::failure(&task_id, err.exc_type, err.message)
            }
            Some(handler) => {
                debug!(%task_id, task = %name, "Running task");
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                // Handlers may panic before returning their future
                let args = TaskArgs::from(task);
                let outcome = AssertUnwindSafe(async move { handler(args).await })
                    .catch_unwind()
                    .await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                match outcome {
                    Ok(Ok(value)) => {
                        debug!(%task_id, task = %name, "Task succeeded");
                        ResultMessage::success(&task_id, value)
                    }
                    Ok(Err(err)) => {
                        warn!(%task_id, task = %name, error = %err, "Task failed");
                        ResultMessage::failure(&task_id, err.exc_type, err.message)
                    }
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!(%task_id, task = %name, %reason, "Task panicked");
                        ResultMessage::failure(
                            &task_id,
                            PANICKED_EXC_TYPE,
                            format!("task {name} panicked: {reason}"),
                        )
                    }
                }
            }
        };

        if let Err(e) = backend::store_result(self.backend.as_ref(), &record).await {
            error!(%task_id, task = %name, "Failed to store result: {}", e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::{load_result, InMemoryResultBackend};
    use crate::broker::InMemoryBroker;
    use crate::protocol::TaskMessage;

    fn executor(registry: TaskRegistry) -> (Executor, Arc<InMemoryResultBackend>) {
        let backend = Arc::new(InMemoryResultBackend::new());
        let executor = Executor {
            index: 0,
            broker: Arc::new(InMemoryBroker::new()),
            backend: backend.clone(),
            registry: Arc::new(registry),
            in_flight: Arc::new(AtomicUsize::new(0)),
            rate_limit_period: None,
        };
        (executor, backend)
    }

    async fn process(executor: &Executor, task: &TaskMessage) {
        executor
            .process(CeleryMessage::from_task(task).unwrap())
            .await;
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let mut registry = TaskRegistry::new();
        registry.register("add", |args: TaskArgs| async move {
            let (a, b): (i64, i64) = args.parse()?;
            Ok(json!(a + b))
        });
        let (executor, backend) = executor(registry);

        let task = TaskMessage::new("add", vec![json!(2), json!(3)]);
        process(&executor, &task).await;

        let record = load_result(backend.as_ref(), &task.id).await.unwrap().unwrap();
        assert!(record.is_success());
        assert_eq!(record.result, json!(5));
        assert_eq!(record.task_id, task.id);
        assert_eq!(executor.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_recorded() {
        let mut registry = TaskRegistry::new();
        registry.register("boom", |_args: TaskArgs| async move {
            Err(TaskError::new("bad input").with_type("ValueError"))
        });
        let (executor, backend) = executor(registry);

        let task = TaskMessage::new("boom", vec![]);
        process(&executor, &task).await;

        let record = load_result(backend.as_ref(), &task.id).await.unwrap().unwrap();
        assert!(!record.is_success());
        assert_eq!(record.exc_type(), Some("ValueError"));
        assert_eq!(record.failure_message(), "bad input");
    }

    #[tokio::test]
    async fn test_unregistered_task_is_recorded() {
        let (executor, backend) = executor(TaskRegistry::new());

        let task = TaskMessage::new("ghost", vec![]);
        process(&executor, &task).await;

        let record = load_result(backend.as_ref(), &task.id).await.unwrap().unwrap();
        assert_eq!(record.exc_type(), Some("NotRegistered"));
        assert_eq!(record.failure_message(), "unregistered task: ghost");
    }

    #[tokio::test]
    async fn test_panic_is_recorded() {
        let mut registry = TaskRegistry::new();
        registry.register("panics", |_args: TaskArgs| async move {
            if true {
                panic!("kaboom");
            }
            Ok(json!(null))
        });
        let (executor, backend) = executor(registry);

        let task = TaskMessage::new("panics", vec![]);
        process(&executor, &task).await;

        let record = load_result(backend.as_ref(), &task.id).await.unwrap().unwrap();
        assert_eq!(record.exc_type(), Some(PANICKED_EXC_TYPE));
        assert!(record.failure_message().contains("kaboom"));
        assert_eq!(executor.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_before_future_is_recorded() {
        let mut registry = TaskRegistry::new();
        registry.register("sync_boom", |args: TaskArgs| {
            let first = args.args()[0].clone();
            async move { Ok(first) }
        });
        let (executor, backend) = executor(registry);

        let task = TaskMessage::new("sync_boom", vec![]);
        process(&executor, &task).await;

        let record = load_result(backend.as_ref(), &task.id).await.unwrap().unwrap();
        assert_eq!(record.exc_type(), Some(PANICKED_EXC_TYPE));
        assert!(record.failure_message().contains("index out of bounds"));
        assert_eq!(executor.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_message_writes_nothing() {
        let (executor, backend) = executor(TaskRegistry::new());

        executor
            .process(CeleryMessage::new("%%% not base64".to_string()))
            .await;

        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_skips_receive_backoff() {
        let mut registry = TaskRegistry::new();
        registry.register("echo", |args: TaskArgs| async move { Ok(args.args()[0].clone()) });
        let broker = Arc::new(InMemoryBroker::with_receive_timeout(Duration::from_millis(20)));
        let backend = Arc::new(InMemoryResultBackend::new());
        let executor = Executor {
            index: 0,
            broker: broker.clone(),
            backend: backend.clone(),
            registry: Arc::new(registry),
            in_flight: Arc::new(AtomicUsize::new(0)),
            rate_limit_period: None,
        };

        let task = TaskMessage::new("echo", vec![json!("after garbage")]);
        broker.push_raw(b"garbage".to_vec());
        broker
            .send(&CeleryMessage::from_task(&task).unwrap())
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(executor.run(shutdown_rx));

        // Well under RECEIVE_ERROR_BACKOFF
        let recorded = tokio::time::timeout(Duration::from_millis(300), async {
            loop {
                if let Some(record) = load_result(backend.as_ref(), &task.id).await.unwrap() {
                    return record;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task after malformed payload was not processed promptly");
        assert_eq!(recorded.result, json!("after garbage"));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
