//! In-memory object store with fault injection.

use super::ObjectStore;
use crate::errors::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A recorded store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `put(key)`.
    Put(String),
    /// `get(key)`.
    Get(String),
    /// `delete(key)`.
    Delete(String),
}

/// Object store backed by a concurrent map.
///
/// Faults can be switched on per operation. With `drop_writes` enabled the
/// store acknowledges writes without ever making them visible, which models a
/// write path that never becomes consistent.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    name: String,
    objects: DashMap<String, Vec<u8>>,
    ops: Mutex<Vec<StoreOp>>,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
    drop_writes: AtomicBool,
}

impl InMemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Makes every `put` fail.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Makes every `get` fail.
    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    /// Makes every `delete` fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Acknowledges writes without storing them.
    pub fn drop_writes(&self, drop: bool) {
        self.drop_writes.store(drop, Ordering::SeqCst);
    }

    /// Returns true if an object exists under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Returns a copy of the object under `key`.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the store holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns every operation performed, in order.
    #[must_use]
    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().clone()
    }

    /// Returns the number of `put` calls.
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, StoreOp::Put(_)))
            .count()
    }

    fn record(&self, op: StoreOp) {
        self.ops.lock().push(op);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        self.record(StoreOp::Put(key.to_string()));
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::new(key, "put rejected"));
        }
        if !self.drop_writes.load(Ordering::SeqCst) {
            self.objects.insert(key.to_string(), body);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.record(StoreOp::Get(key.to_string()));
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(StorageError::new(key, "get rejected"));
        }
        Ok(self.object(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.record(StoreOp::Delete(key.to_string()));
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::new(key, "delete rejected"));
        }
        self.objects.remove(key);
        Ok(())
    }
}
