//! Worker pool for task execution
//!
//! This module provides:
//! - [`WorkerPool`] - fixed-size pool of concurrent executors
//! - [`WorkerPoolConfig`] - pool size, rate limit and shutdown grace period
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │        TaskRegistry snapshot (Arc, read-only)         │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  [Executor 1] [Executor 2] ... [Executor N]                  │
//! │   receive ─▶ decode ─▶ handler ─▶ ResultBackend::set         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use everruns_celery::worker::{WorkerPool, WorkerPoolConfig};
//!
//! let pool = WorkerPool::new(broker, backend, WorkerPoolConfig::new(4));
//!
//! pool.register("add", |args| async move {
//!     let (a, b): (i64, i64) = args.parse()?;
//!     Ok(json!(a + b))
//! });
//!
//! pool.start()?;
//!
//! // Graceful shutdown
//! pool.stop().await?;
//! ```

mod executor;
mod pool;

pub(crate) use pool::env_parse;
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};
