//! Result store port
//!
//! This module provides:
//! - [`ResultBackend`] trait for persisting and reading task outcomes
//! - [`InMemoryResultBackend`] for in-process use and testing
//! - [`result_key`] and helpers that apply the record encoding
//!
//! The store only sees keys and bytes. Record encoding lives in
//! [`crate::protocol::ResultMessage`].

mod memory;

use async_trait::async_trait;

use crate::protocol::ResultMessage;

pub use memory::InMemoryResultBackend;

/// Key prefix shared with other Celery result backends
pub const RESULT_KEY_PREFIX: &str = "celery-task-meta-";

/// Error type for result store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the operation
    #[error("result store error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded
    #[error("result serialization error: {0}")]
    Serialization(String),
}

/// Get/set capability over task outcomes
///
/// Implementations must be safe for concurrent use and give read-your-writes
/// consistency for a single key.
#[async_trait]
pub trait ResultBackend: Send + Sync {
    /// Fetch the raw record under `key`; `Ok(None)` means no record yet
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store the raw record under `key`
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;
}

/// Store key for a task identity
pub fn result_key(task_id: &str) -> String {
    format!("{RESULT_KEY_PREFIX}{task_id}")
}

/// Read and decode the record for a task
pub(crate) async fn load_result(
    backend: &dyn ResultBackend,
    task_id: &str,
) -> Result<Option<ResultMessage>, StoreError> {
    match backend.get(&result_key(task_id)).await? {
        Some(bytes) => ResultMessage::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Encode and write the record for a task
pub(crate) async fn store_result(
    backend: &dyn ResultBackend,
    record: &ResultMessage,
) -> Result<(), StoreError> {
    let bytes = record
        .to_bytes()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    backend.set(&result_key(&record.task_id), bytes).await
}
