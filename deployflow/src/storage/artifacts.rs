//! Content-addressed artifact store.

use super::ObjectStore;
use crate::core::Artifact;
use crate::errors::StorageError;
use std::sync::Arc;
use tracing::debug;

/// Stores pipeline artifacts under content-derived keys.
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<dyn ObjectStore>,
}

impl ArtifactStore {
    /// Wraps an object store.
    #[must_use]
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Returns the underlying store name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Writes content and returns its immutable handle.
    pub async fn publish(
        &self,
        name: &str,
        produced_by: &str,
        content: Vec<u8>,
    ) -> Result<Artifact, StorageError> {
        let artifact = Artifact::for_content(self.inner.name(), name, produced_by, &content);
        self.inner.put(artifact.key(), content).await?;
        debug!(artifact = %artifact.name, location = %artifact.location, "Artifact published");
        Ok(artifact)
    }

    /// Reads the content behind a handle.
    pub async fn fetch(&self, artifact: &Artifact) -> Result<Vec<u8>, StorageError> {
        self.inner
            .get(artifact.key())
            .await?
            .ok_or_else(|| StorageError::new(artifact.key(), "artifact not found"))
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("name", &self.inner.name())
            .finish()
    }
}
