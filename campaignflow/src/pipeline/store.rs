//! Persistence collaborator.

use crate::errors::PersistenceError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Upsert-by-identifier storage for assembled results.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Inserts or replaces the record stored under `identifier`.
    async fn upsert(&self, identifier: &str, record: &Value) -> Result<(), PersistenceError>;
}

/// A result store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    records: RwLock<HashMap<String, Value>>,
    writes: RwLock<usize>,
}

impl InMemoryResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record stored under `identifier`.
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<Value> {
        self.records.read().get(identifier).cloned()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns how many upserts were made.
    #[must_use]
    pub fn write_count(&self) -> usize {
        *self.writes.read()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn upsert(&self, identifier: &str, record: &Value) -> Result<(), PersistenceError> {
        self.records
            .write()
            .insert(identifier.to_string(), record.clone());
        *self.writes.write() += 1;
        Ok(())
    }
}
