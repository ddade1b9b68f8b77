//! Write-once variable and artifact bags scoped to one execution.

use crate::core::Artifact;
use crate::errors::{ArtifactConflictError, VariableConflictError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Exported variables of one pipeline execution, keyed by namespace.
///
/// Each `namespace.name` pair can be written once.
#[derive(Debug, Default)]
pub struct VariableBag {
    data: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl VariableBag {
    /// Creates a new empty variable bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets a published variable.
    #[must_use]
    pub fn get(&self, namespace: &str, name: &str) -> Option<String> {
        self.data
            .read()
            .get(namespace)
            .and_then(|vars| vars.get(name))
            .cloned()
    }

    /// Publishes a single variable.
    ///
    /// # Errors
    ///
    /// Returns `VariableConflictError` if the variable was already published.
    pub fn publish(
        &self,
        namespace: &str,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), VariableConflictError> {
        let name = name.into();
        let mut data = self.data.write();
        let vars = data.entry(namespace.to_string()).or_default();

        if vars.contains_key(&name) {
            return Err(VariableConflictError::new(namespace, name));
        }

        vars.insert(name, value.into());
        Ok(())
    }

    /// Publishes a set of variables atomically: either all are written or none.
    ///
    /// # Errors
    ///
    /// Returns `VariableConflictError` for the first name that already exists.
    pub fn publish_all(
        &self,
        namespace: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<(), VariableConflictError> {
        let mut data = self.data.write();
        let vars = data.entry(namespace.to_string()).or_default();

        if let Some(existing) = variables.keys().find(|name| vars.contains_key(*name)) {
            return Err(VariableConflictError::new(namespace, existing.clone()));
        }

        vars.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    /// Returns a copy of the variables in one namespace.
    #[must_use]
    pub fn namespace(&self, namespace: &str) -> BTreeMap<String, String> {
        self.data.read().get(namespace).cloned().unwrap_or_default()
    }

    /// Returns the number of published variables across namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing has been published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Artifacts produced during one pipeline execution.
#[derive(Debug, Default)]
pub struct ArtifactBag {
    artifacts: RwLock<HashMap<String, Artifact>>,
}

impl ArtifactBag {
    /// Creates a new empty artifact bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets an artifact by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Artifact> {
        self.artifacts.read().get(name).cloned()
    }

    /// Records a produced artifact.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactConflictError` if an artifact with that name exists.
    pub fn insert(&self, artifact: Artifact) -> Result<(), ArtifactConflictError> {
        let mut artifacts = self.artifacts.write();
        if artifacts.contains_key(&artifact.name) {
            return Err(ArtifactConflictError::new(&artifact.name));
        }
        artifacts.insert(artifact.name.clone(), artifact);
        Ok(())
    }

    /// Returns the number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Returns true if no artifact was produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }
}
