//! # Celery-protocol task queue
//!
//! A client/worker library for distributed task execution that speaks the
//! Celery message and result formats, so producers and workers built on it
//! interoperate with other Celery implementations sharing the same broker
//! and result store.
//!
//! ## Features
//!
//! - **Celery wire format**: protocol v1 task bodies in base64 JSON envelopes
//! - **Pluggable transports**: [`Broker`] and [`ResultBackend`] ports with
//!   in-memory adapters
//! - **Worker pool**: fixed number of concurrent executors, graceful shutdown
//! - **Async results**: non-blocking reads and bounded blocking waits with
//!   backoff
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  TaskMessage   ┌──────────────┐  CeleryMessage  ┌────────┐
//! │ CeleryClient │ ─────────────▶ │   protocol   │ ──────────────▶ │ Broker │
//! └──────┬───────┘                └──────────────┘                 └───┬────┘
//!        │ AsyncResult                                                 │
//!        ▼                                                             ▼
//! ┌──────────────┐      get       ┌───────────────┐      set     ┌────────────┐
//! │ AsyncResult  │ ◀───────────── │ ResultBackend │ ◀─────────── │ WorkerPool │
//! └──────────────┘                └───────────────┘              └────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use everruns_celery::prelude::*;
//!
//! let client = CeleryClient::new(broker, backend, 4);
//!
//! client.register("add", |args| async move {
//!     let (a, b): (i64, i64) = args.parse()?;
//!     Ok(json!(a + b))
//! });
//! client.start_worker()?;
//!
//! let result = client.delay("add", (2, 3)).await?;
//! assert_eq!(result.get(Duration::from_secs(1)).await?, json!(5));
//! ```

pub mod backend;
pub mod broker;
pub mod client;
pub mod error;
pub mod protocol;
pub mod result;
pub mod task;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::backend::{InMemoryResultBackend, ResultBackend, StoreError};
    pub use crate::broker::{Broker, BrokerError, InMemoryBroker};
    pub use crate::client::CeleryClient;
    pub use crate::error::{CeleryError, TaskFailure};
    pub use crate::result::{AsyncResult, PollConfig};
    pub use crate::task::{TaskArgs, TaskError, TaskResult};
    pub use crate::worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use backend::{InMemoryResultBackend, ResultBackend, StoreError};
pub use broker::{Broker, BrokerError, InMemoryBroker};
pub use client::CeleryClient;
pub use error::{CeleryError, TaskFailure};
pub use protocol::{CeleryMessage, ProtocolError, ResultMessage, TaskMessage};
pub use result::{AsyncResult, PollConfig};
pub use task::{TaskArgs, TaskError, TaskRegistry, TaskResult};
pub use worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};
