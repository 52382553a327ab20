//! Async result retrieval
//!
//! This module provides:
//! - [`AsyncResult`] - handle bound to one task identity
//! - [`PollConfig`] - backoff used while blocking on a result

mod async_result;
mod poll;

pub use async_result::AsyncResult;
pub use poll::{PollConfig, ResultPoller};
