//! Worker pool for task execution
//!
//! Manages a fixed number of concurrent executors with graceful shutdown.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::executor::Executor;
use crate::backend::ResultBackend;
use crate::broker::Broker;
use crate::task::{TaskArgs, TaskRegistry, TaskResult};

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    /// Worker ID used in logs (generated if not provided)
    pub worker_id: String,

    /// Number of concurrent executors
    pub num_workers: usize,

    /// Minimum time between two receives of one executor (None = no limit)
    #[serde(with = "option_duration_millis", default)]
    pub rate_limit_period: Option<Duration>,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::new_v4()),
            num_workers: 4,
            rate_limit_period: None,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a configuration with `num_workers` executors
    pub fn new(num_workers: usize) -> Self {
        Self::default().with_num_workers(num_workers)
    }

    /// Create configuration from environment variables
    ///
    /// - `CELERY_WORKER_ID`: worker ID (default: generated)
    /// - `CELERY_NUM_WORKERS`: executor count (default: 4)
    /// - `CELERY_RATE_LIMIT_MS`: per-executor receive period (default: none)
    /// - `CELERY_SHUTDOWN_TIMEOUT_MS`: grace period (default: 30000)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(id) = std::env::var("CELERY_WORKER_ID") {
            config = config.with_worker_id(id);
        }
        if let Some(n) = env_parse::<usize>("CELERY_NUM_WORKERS") {
            config = config.with_num_workers(n);
        }
        if let Some(ms) = env_parse::<u64>("CELERY_RATE_LIMIT_MS") {
            config = config.with_rate_limit_period(Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse::<u64>("CELERY_SHUTDOWN_TIMEOUT_MS") {
            config = config.with_shutdown_timeout(Duration::from_millis(ms));
        }

        config
    }

    /// Set the worker ID
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set the number of executors
    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n.max(1);
        self
    }

    /// Set the per-executor receive period; zero disables the limit
    pub fn with_rate_limit_period(mut self, period: Duration) -> Self {
        self.rate_limit_period = (!period.is_zero()).then_some(period);
        self
    }

    /// Set shutdown timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Executors are running and accepting tasks
    Running,
    /// Executors are finishing current tasks, not accepting new ones
    Draining,
    /// No executor is running
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// Worker already running
    #[error("worker pool is already running")]
    AlreadyRunning,

    /// Started outside a Tokio runtime
    #[error("worker pool must be started inside a Tokio runtime")]
    NoRuntime,

    /// Shutdown timeout
    #[error("graceful shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Worker pool consuming tasks from a broker
///
/// # Example
///
/// ```ignore
/// use everruns_celery::worker::{WorkerPool, WorkerPoolConfig};
///
/// let pool = WorkerPool::new(broker, backend, WorkerPoolConfig::new(2));
///
/// pool.register("add", |args| async move {
///     let (a, b): (i64, i64) = args.parse()?;
///     Ok(json!(a + b))
/// });
///
/// pool.start()?;
/// // ... later, graceful shutdown
/// pool.stop().await?;
/// ```
pub struct WorkerPool {
    broker: Arc<dyn Broker>,
    backend: Arc<dyn ResultBackend>,
    config: WorkerPoolConfig,
    registry: RwLock<TaskRegistry>,
    status: RwLock<WorkerPoolStatus>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(
        broker: Arc<dyn Broker>,
        backend: Arc<dyn ResultBackend>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            broker,
            backend,
            config,
            registry: RwLock::new(TaskRegistry::new()),
            status: RwLock::new(WorkerPoolStatus::Stopped),
            shutdown_tx: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register a task handler
    ///
    /// Executors see the registry as it was when [`start`](Self::start) was
    /// called; register everything first.
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(TaskArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        if self.status() != WorkerPoolStatus::Stopped {
            warn!(
                task = name,
                "Registering while running; visible after the next start"
            );
        }
        self.registry.write().register(name, handler);
    }

    /// Start the executors
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub fn start(&self) -> Result<(), WorkerPoolError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| WorkerPoolError::NoRuntime)?;

        let mut status = self.status.write();
        if *status != WorkerPoolStatus::Stopped {
            return Err(WorkerPoolError::AlreadyRunning);
        }

        let registry = Arc::new(self.registry.read().clone());
        info!(
            worker_id = %self.config.worker_id,
            num_workers = self.config.num_workers,
            tasks = ?registry.names(),
            "Starting worker pool"
        );

        // One channel per run, so executors left behind by a timed-out stop
        // never observe the next run's signal
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles = self.handles.lock();
        for index in 0..self.config.num_workers {
            let executor = Executor {
                index,
                broker: Arc::clone(&self.broker),
                backend: Arc::clone(&self.backend),
                registry: Arc::clone(&registry),
                in_flight: Arc::clone(&self.in_flight),
                rate_limit_period: self.config.rate_limit_period,
            };
            handles.push(runtime.spawn(executor.run(shutdown_rx.clone())));
        }

        *self.shutdown_tx.lock() = Some(shutdown_tx);
        *status = WorkerPoolStatus::Running;
        Ok(())
    }

    /// Stop the executors gracefully
    ///
    /// Returns once every executor has finished its current task, or with
    /// [`WorkerPoolError::ShutdownTimeout`] when the grace period elapses
    /// first. Handlers still running at that point are left to finish.
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn stop(&self) -> Result<(), WorkerPoolError> {
        {
            let mut status = self.status.write();
            if *status != WorkerPoolStatus::Running {
                return Ok(());
            }
            *status = WorkerPoolStatus::Draining;
        }

        info!(worker_id = %self.config.worker_id, "Initiating graceful shutdown");

        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(true);
        }

        let handles = std::mem::take(&mut *self.handles.lock());
        let grace = self.config.shutdown_timeout;
        let result = match tokio::time::timeout(grace, futures::future::join_all(handles)).await {
            Ok(joined) => {
                for outcome in joined {
                    if let Err(e) = outcome {
                        error!("Executor terminated abnormally: {}", e);
                    }
                }
                debug!("All executors completed");
                Ok(())
            }
            Err(_) => {
                warn!(
                    in_flight = self.in_flight(),
                    "Shutdown timeout reached"
                );
                Err(WorkerPoolError::ShutdownTimeout(grace))
            }
        };

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "Worker pool stopped");
        result
    }

    /// Get current status
    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Number of configured executors
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Number of handlers currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Get the worker ID
    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Get the configuration
    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Check whether a task name is registered
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Dropping the sender stops executors once their current task ends
        if self.shutdown_tx.get_mut().take().is_some() {
            debug!(worker_id = %self.config.worker_id, "Worker pool dropped while running");
        }
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration> as milliseconds
mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
