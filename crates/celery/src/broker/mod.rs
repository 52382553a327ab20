//! Broker port
//!
//! This module provides:
//! - [`Broker`] trait for moving task envelopes between producers and workers
//! - [`InMemoryBroker`] for in-process use and testing
//!
//! Concrete network transports (Redis lists, AMQP queues) implement
//! [`Broker`] outside this crate.

mod memory;

use async_trait::async_trait;

use crate::protocol::{CeleryMessage, ProtocolError};

pub use memory::InMemoryBroker;

/// Error type for broker operations
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The transport could not be reached or rejected the operation
    #[error("broker connection error: {0}")]
    Connection(String),

    /// The envelope could not be serialized for the transport
    #[error("broker serialization error: {0}")]
    Serialization(#[from] ProtocolError),

    /// The broker was closed
    #[error("broker is closed")]
    Closed,
}

/// Send/receive capability shared by clients and workers
///
/// Implementations must be safe for concurrent use by many senders and
/// receivers. A successfully sent envelope must eventually be delivered to
/// one receiver; at-least-once delivery is acceptable.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue an envelope
    async fn send(&self, message: &CeleryMessage) -> Result<(), BrokerError>;

    /// Wait a bounded time for the next envelope
    ///
    /// Returns `Ok(None)` when nothing arrived within the implementation's
    /// wait interval. Must be cancel safe: dropping the future before it
    /// completes must not lose an envelope.
    async fn receive(&self) -> Result<Option<CeleryMessage>, BrokerError>;
}
