//! Object storage used for pipeline artifacts, probe records and captured data.
//!
//! All three stores share the same minimal interface: put, get and delete by
//! key. Each call is awaited to completion by the caller before it advances.

mod artifacts;
mod memory;

pub use artifacts::ArtifactStore;
pub use memory::{InMemoryObjectStore, StoreOp};

use crate::errors::StorageError;
use async_trait::async_trait;

/// Key-value object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns the store (bucket) name.
    fn name(&self) -> &str;

    /// Writes an object, replacing any previous value.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Reads an object; `Ok(None)` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Deletes an object. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
