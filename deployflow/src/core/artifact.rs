//! Artifact handles produced by pipeline actions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An immutable handle to a versioned blob in the artifact store.
///
/// Produced by exactly one action and consumed by any number of later ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical artifact name (e.g. "SourceArtifact").
    pub name: String,
    /// Store location of the blob.
    pub location: String,
    /// SHA-256 of the content, hex encoded.
    pub digest: String,
    /// The action that produced the artifact.
    pub produced_by: String,
    /// When the artifact was created (RFC 3339).
    pub created_at: String,
}

impl Artifact {
    /// Creates an artifact handle for content stored under `store`.
    #[must_use]
    pub fn for_content(
        store: &str,
        name: impl Into<String>,
        produced_by: impl Into<String>,
        content: &[u8],
    ) -> Self {
        let name = name.into();
        let digest = content_digest(content);
        Self {
            location: format!("{store}/{name}/{digest}"),
            name,
            digest,
            produced_by: produced_by.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Returns the object key of the blob within its store.
    #[must_use]
    pub fn key(&self) -> &str {
        self.location
            .split_once('/')
            .map_or(self.location.as_str(), |(_, key)| key)
    }
}

/// Computes the hex SHA-256 digest of some content.
#[must_use]
pub fn content_digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_is_content_addressed() {
        let a = Artifact::for_content("artifacts", "SourceArtifact", "Repository", b"rev-1");
        let b = Artifact::for_content("artifacts", "SourceArtifact", "Repository", b"rev-1");
        let c = Artifact::for_content("artifacts", "SourceArtifact", "Repository", b"rev-2");

        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
        assert_eq!(a.digest.len(), 64);
    }

    #[test]
    fn test_artifact_key() {
        let artifact = Artifact::for_content("artifacts", "BuildArtifact", "Build", b"zip");
        assert!(artifact.location.starts_with("artifacts/BuildArtifact/"));
        assert_eq!(artifact.key(), format!("BuildArtifact/{}", artifact.digest));
    }
}
