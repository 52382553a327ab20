//! In-memory implementation of Broker

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use super::{Broker, BrokerError};
use crate::protocol::CeleryMessage;

/// How long `receive` waits before reporting an empty queue
const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// In-memory FIFO broker
///
/// Envelopes are kept as their serialized JSON bytes, exactly as a network
/// transport would carry them.
///
/// # Example
///
/// ```
/// use everruns_celery::InMemoryBroker;
///
/// let broker = InMemoryBroker::new();
/// assert_eq!(broker.len(), 0);
/// ```
pub struct InMemoryBroker {
    queue: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    closed: AtomicBool,
    receive_timeout: Duration,
}

impl InMemoryBroker {
    /// Create a new in-memory broker
    pub fn new() -> Self {
        Self::with_receive_timeout(DEFAULT_RECEIVE_TIMEOUT)
    }

    /// Create a broker whose `receive` gives up after `timeout`
    pub fn with_receive_timeout(timeout: Duration) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            receive_timeout: timeout,
        }
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Push raw bytes, bypassing envelope serialization
    ///
    /// Lets foreign producers (and tests) inject arbitrary payloads.
    pub fn push_raw(&self, bytes: Vec<u8>) {
        self.queue.lock().push_back(bytes);
        self.notify.notify_one();
    }

    /// Close the broker; further sends and receives fail
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn pop(&self) -> Option<Vec<u8>> {
        self.queue.lock().pop_front()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn send(&self, message: &CeleryMessage) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        let bytes = message.to_bytes()?;
        self.push_raw(bytes);
        Ok(())
    }

    async fn receive(&self) -> Result<Option<CeleryMessage>, BrokerError> {
        let deadline = tokio::time::Instant::now() + self.receive_timeout;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(BrokerError::Closed);
            }

            if let Some(bytes) = self.pop() {
                return CeleryMessage::from_bytes(&bytes)
                    .map(Some)
                    .map_err(BrokerError::Serialization);
            }

            // notify_one stores a permit, so a send racing this check still wakes us
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                trace!("Receive timed out on empty queue");
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::protocol::TaskMessage;

    fn message(name: &str) -> CeleryMessage {
        CeleryMessage::from_task(&TaskMessage::new(name, vec![json!(1)])).unwrap()
    }

    #[tokio::test]
    async fn test_send_and_receive_fifo() {
        let broker = InMemoryBroker::new();
        broker.send(&message("first")).await.unwrap();
        broker.send(&message("second")).await.unwrap();
        assert_eq!(broker.len(), 2);

        let first = broker.receive().await.unwrap().unwrap();
        let second = broker.receive().await.unwrap().unwrap();
        assert_eq!(first.task_message().unwrap().task, "first");
        assert_eq!(second.task_message().unwrap().task, "second");
        assert!(broker.is_empty());
    }

    #[tokio::test]
    async fn test_receive_times_out_on_empty_queue() {
        let broker = InMemoryBroker::with_receive_timeout(Duration::from_millis(20));
        let start = std::time::Instant::now();
        assert!(broker.receive().await.unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_receive_wakes_on_send() {
        let broker = Arc::new(InMemoryBroker::with_receive_timeout(Duration::from_secs(5)));
        let receiver = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.receive().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.send(&message("late")).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), receiver)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(received.task_message().unwrap().task, "late");
    }

    #[tokio::test]
    async fn test_closed_broker_rejects_operations() {
        let broker = InMemoryBroker::new();
        broker.close();
        assert!(matches!(
            broker.send(&message("x")).await,
            Err(BrokerError::Closed)
        ));
        assert!(matches!(broker.receive().await, Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_receive_error() {
        let broker = InMemoryBroker::new();
        broker.push_raw(b"not an envelope".to_vec());
        assert!(matches!(
            broker.receive().await,
            Err(BrokerError::Serialization(_))
        ));
        // the bad payload is consumed, not redelivered forever
        assert!(broker.is_empty());
    }
}
