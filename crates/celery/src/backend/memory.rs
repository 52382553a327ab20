//! In-memory implementation of ResultBackend

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ResultBackend, StoreError};

/// In-memory result store
///
/// Mirrors a key-value service: plain `get`/`set` over bytes, last write
/// wins.
///
/// # Example
///
/// ```
/// use everruns_celery::InMemoryResultBackend;
///
/// let backend = InMemoryResultBackend::new();
/// assert!(backend.is_empty());
/// ```
pub struct InMemoryResultBackend {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryResultBackend {
    /// Create a new in-memory result store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether no record is stored
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Whether a record exists under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.records.read().contains_key(key)
    }

    /// Clear all data (for testing)
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl Default for InMemoryResultBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultBackend for InMemoryResultBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.records.write().insert(key.to_string(), value);
        Ok(())
    }
}
