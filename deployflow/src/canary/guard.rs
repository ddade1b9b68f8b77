//! Probe key leases and abnormal-termination cleanup.

use crate::storage::ObjectStore;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Serializes validation runs that would touch the same probe key.
#[derive(Debug, Default)]
pub struct ProbeLeases {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProbeLeases {
    /// Creates an empty lease table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other run holds `key`, then holds it.
    pub async fn acquire(self: &Arc<Self>, key: &str) -> ProbeLease {
        // Created before waiting so a cancelled waiter still forgets an idle lock.
        let mut lease = ProbeLease {
            leases: self.clone(),
            key: key.to_string(),
            guard: None,
        };
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lease.guard = Some(lock.lock_owned().await);
        debug!(key = %key, "Probe lease acquired");
        lease
    }

    /// Returns the number of keys currently leased or waited on.
    #[must_use]
    pub fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Exclusive hold on one probe key. Released on drop.
#[derive(Debug)]
pub struct ProbeLease {
    leases: Arc<ProbeLeases>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ProbeLease {
    /// Returns the leased key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ProbeLease {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Forget the lock unless another run is waiting on it.
        self.leases
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Deletes the probe record if the run ends before its cleanup step.
///
/// Dropping an armed guard spawns a best-effort delete on the current tokio
/// runtime.
pub struct ProbeGuard {
    store: Option<Arc<dyn ObjectStore>>,
    key: String,
}

impl ProbeGuard {
    /// Arms a guard for `key`.
    #[must_use]
    pub fn arm(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store: Some(store),
            key: key.into(),
        }
    }

    /// Disarms the guard once cleanup has been attempted.
    pub fn disarm(&mut self) {
        self.store = None;
    }

    /// Returns true if dropping the guard would delete the record.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.store.is_some()
    }
}

impl std::fmt::Debug for ProbeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeGuard")
            .field("key", &self.key)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(key = %key, "Validation ended before cleanup; deleting probe record");
                handle.spawn(async move {
                    if let Err(e) = store.delete(&key).await {
                        warn!(key = %key, error = %e, "Abandoned probe record could not be deleted");
                    }
                });
            }
            Err(_) => warn!(key = %key, "No runtime to delete abandoned probe record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryObjectStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_armed_guard_deletes_on_drop() {
        let store = Arc::new(InMemoryObjectStore::new("probes"));
        store.put("user_x.json", b"{}".to_vec()).await.unwrap();

        drop(ProbeGuard::arm(store.clone(), "user_x.json"));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!store.contains("user_x.json"));
    }

    #[tokio::test]
    async fn test_disarmed_guard_leaves_record() {
        let store = Arc::new(InMemoryObjectStore::new("probes"));
        store.put("user_x.json", b"{}".to_vec()).await.unwrap();

        let mut guard = ProbeGuard::arm(store.clone(), "user_x.json");
        guard.disarm();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(store.contains("user_x.json"));
    }

    #[tokio::test]
    async fn test_leases_serialize_same_key() {
        let leases = Arc::new(ProbeLeases::new());
        let first = leases.acquire("user_a.json").await;

        let contender = leases.clone();
        let waiting = tokio::spawn(async move { contender.acquire("user_a.json").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiting.is_finished());

        // A different key is not blocked.
        let other = leases.acquire("user_b.json").await;
        assert_eq!(other.key(), "user_b.json");

        drop(first);
        let second = waiting.await.unwrap();
        assert_eq!(second.key(), "user_a.json");

        drop(second);
        drop(other);
        assert_eq!(leases.active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_lock() {
        let leases = Arc::new(ProbeLeases::new());
        let first = leases.acquire("user_a.json").await;

        let contender = leases.clone();
        let waiting = tokio::spawn(async move { contender.acquire("user_a.json").await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Release while the waiter is queued, then cancel the waiter.
        drop(first);
        waiting.abort();
        drop(waiting.await);

        assert_eq!(leases.active(), 0);
    }
}
