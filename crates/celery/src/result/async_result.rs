//! Handle to an eventual task outcome

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use super::{PollConfig, ResultPoller};
use crate::backend::{self, ResultBackend};
use crate::error::{CeleryError, TaskFailure};

/// Pending result of a sent task
///
/// Holds no cached state: every call reads the result store again, so any
/// number of handles (in any process) bound to the same identity observe the
/// same record.
#[derive(Clone)]
pub struct AsyncResult {
    task_id: String,
    backend: Arc<dyn ResultBackend>,
    poll: PollConfig,
}

impl AsyncResult {
    /// Bind a handle to a task identity
    pub fn new(task_id: impl Into<String>, backend: Arc<dyn ResultBackend>) -> Self {
        Self {
            task_id: task_id.into(),
            backend,
            poll: PollConfig::default(),
        }
    }

    /// Set the backoff used by [`get`](Self::get)
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Identity of the task
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Read the result once without waiting
    ///
    /// - `Ok(None)`: no record yet, the task is pending
    /// - `Ok(Some(value))`: the task succeeded
    /// - `Err(CeleryError::TaskFailed)`: the task failed
    /// - `Err(CeleryError::Store)`: the lookup itself failed
    pub async fn try_get(&self) -> Result<Option<Value>, CeleryError> {
        let Some(record) = backend::load_result(self.backend.as_ref(), &self.task_id).await? else {
            return Ok(None);
        };

        if record.is_success() {
            Ok(Some(record.result))
        } else {
            Err(CeleryError::TaskFailed(TaskFailure::from_record(
                &self.task_id,
                record,
            )))
        }
    }

    /// Whether any record exists, regardless of its status
    pub async fn ready(&self) -> Result<bool, CeleryError> {
        let record = self
            .backend
            .get(&backend::result_key(&self.task_id))
            .await?;
        Ok(record.is_some())
    }

    /// Block until the task finishes or `timeout` elapses
    ///
    /// Store errors while waiting are logged and treated as "not ready yet".
    #[instrument(skip(self), fields(task_id = %self.task_id))]
    pub async fn get(&self, timeout: Duration) -> Result<Value, CeleryError> {
        let started = Instant::now();
        // `None` when the timeout is too large to represent: wait without bound
        let deadline = started.checked_add(timeout);
        let mut poller = ResultPoller::new(self.poll.clone());

        loop {
            match self.try_get().await {
                Ok(Some(value)) => {
                    debug!(elapsed = ?started.elapsed(), "Result ready");
                    return Ok(value);
                }
                Ok(None) => trace!("Result pending"),
                Err(e @ CeleryError::TaskFailed(_)) => return Err(e),
                Err(e) => warn!(error = %e, "Error getting result, retrying"),
            }

            let mut delay = poller.next_delay();
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(CeleryError::Timeout {
                        task_id: self.task_id.clone(),
                        elapsed: now - started,
                    });
                }
                delay = delay.min(deadline - now);
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// Like [`get`](Self::get), deserializing the value into `T`
    pub async fn get_as<T: DeserializeOwned>(&self, timeout: Duration) -> Result<T, CeleryError> {
        let value = self.get(timeout).await?;
        serde_json::from_value(value).map_err(|e| CeleryError::Decode {
            task_id: self.task_id.clone(),
            message: e.to_string(),
        })
    }
}

impl fmt::Debug for AsyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("task_id", &self.task_id)
            .finish_non_exhaustive()
    }
}
