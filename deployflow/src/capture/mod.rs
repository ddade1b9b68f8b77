//! The data-capture function a canary validation exercises.
//!
//! Given a sign-up event whose user status is `CONFIRMED`, the handler stores
//! the whole event under `user_<sub>.json`. Any other event passes through
//! untouched. Storage failures are logged and handed back as a value so that
//! user confirmation is never blocked on the record being written.

use crate::canary::{record_key, CandidateInvoker, SyntheticEvent, CONFIRMED, USER_STATUS_ATTRIBUTE};
use crate::errors::StorageError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the handler did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// The event was stored under `key`.
    Stored {
        /// The object key.
        key: String,
        /// The event, unchanged.
        event: Value,
    },
    /// The user is not confirmed; nothing was written.
    PassedThrough(Value),
    /// The write failed. The event is returned with the error.
    StoreFailed {
        /// The event, unchanged.
        event: Value,
        /// The storage failure.
        error: StorageError,
    },
}

impl CaptureOutcome {
    /// Returns the event, whatever happened to it.
    #[must_use]
    pub fn event(&self) -> &Value {
        match self {
            Self::Stored { event, .. } | Self::StoreFailed { event, .. } => event,
            Self::PassedThrough(event) => event,
        }
    }

    /// Consumes the outcome and returns the event.
    #[must_use]
    pub fn into_event(self) -> Value {
        match self {
            Self::Stored { event, .. } | Self::StoreFailed { event, .. } => event,
            Self::PassedThrough(event) => event,
        }
    }
}

/// Persists confirmed sign-up events.
#[derive(Clone)]
pub struct CaptureHandler {
    store: Arc<dyn ObjectStore>,
}

impl CaptureHandler {
    /// Creates a handler writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Handles one event.
    pub async fn handle(&self, event: Value) -> CaptureOutcome {
        debug!(event = %event, "Received event");

        let attributes = event.pointer("/request/userAttributes");
        let confirmed = attributes
            .and_then(|attrs| attrs.get(USER_STATUS_ATTRIBUTE))
            .and_then(Value::as_str)
            == Some(CONFIRMED);
        if !confirmed {
            info!("The user has not been confirmed");
            return CaptureOutcome::PassedThrough(event);
        }

        let Some(subject) = attributes.and_then(|attrs| attrs.get("sub")).and_then(Value::as_str) else {
            warn!("Confirmed event carries no subject; not stored");
            return CaptureOutcome::PassedThrough(event);
        };
        let key = record_key(subject);

        let body = match serde_json::to_vec(&event) {
            Ok(body) => body,
            Err(e) => {
                let error = StorageError::new(&key, e.to_string());
                warn!(key = %key, error = %error, "Event could not be serialized");
                return CaptureOutcome::StoreFailed { event, error };
            }
        };

        match self.store.put(&key, body).await {
            Ok(()) => {
                info!(key = %key, store = %self.store.name(), "User data stored");
                CaptureOutcome::Stored { key, event }
            }
            Err(error) => {
                warn!(key = %key, error = %error, "User data could not be stored");
                CaptureOutcome::StoreFailed { event, error }
            }
        }
    }
}

impl std::fmt::Debug for CaptureHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandler")
            .field("store", &self.store.name())
            .finish()
    }
}

/// Runs a [`CaptureHandler`] in-process as the candidate version.
///
/// Invocations are dispatched onto a spawned task and not awaited.
#[derive(Debug)]
pub struct LocalCandidateInvoker {
    function: String,
    handler: CaptureHandler,
    dispatched: AtomicUsize,
}

impl LocalCandidateInvoker {
    /// Registers `handler` under the function identifier `function`.
    #[must_use]
    pub fn new(function: impl Into<String>, handler: CaptureHandler) -> Self {
        Self {
            function: function.into(),
            handler,
            dispatched: AtomicUsize::new(0),
        }
    }

    /// Returns how many events were dispatched.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateInvoker for LocalCandidateInvoker {
    async fn invoke(&self, function: &str, event: &SyntheticEvent) -> anyhow::Result<()> {
        if function != self.function {
            anyhow::bail!("function '{function}' not found");
        }
        let payload = event.to_value()?;
        let handler = self.handler.clone();
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            handler.handle(payload).await;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryObjectStore, StoreOp};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn handler() -> (CaptureHandler, Arc<InMemoryObjectStore>) {
        let store = Arc::new(InMemoryObjectStore::new("new-user-data"));
        (CaptureHandler::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_confirmed_event_is_stored() {
        let (handler, store) = handler();
        let event = json!({
            "request": {
                "userAttributes": {"sub": "abc-123", "cognito:user_status": "CONFIRMED"}
            }
        });

        let outcome = handler.handle(event.clone()).await;

        assert_eq!(
            outcome,
            CaptureOutcome::Stored {
                key: "user_abc-123.json".to_string(),
                event: event.clone(),
            }
        );
        let body = store.object("user_abc-123.json").unwrap();
        assert_eq!(String::from_utf8(body.clone()).unwrap(), serde_json::to_string(&event).unwrap());
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), event);
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn test_stored_body_is_byte_identical_to_wire_event() {
        let (handler, store) = handler();
        let wire = r#"{"version":"1","triggerSource":"PostConfirmation_ConfirmSignUp","request":{"userAttributes":{"sub":"abc-123","email":"test@unittest.com","cognito:user_status":"CONFIRMED"}},"response":{}}"#;
        let event: Value = serde_json::from_str(wire).unwrap();

        handler.handle(event).await;

        let body = store.object("user_abc-123.json").unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), wire);
    }

    #[tokio::test]
    async fn test_unconfirmed_event_passes_through() {
        let (handler, store) = handler();
        for status in ["UNCONFIRMED", "FORCE_CHANGE_PASSWORD", "confirmed"] {
            let event = json!({
                "request": {"userAttributes": {"sub": "abc-123", "cognito:user_status": status}}
            });
            let outcome = handler.handle(event.clone()).await;
            assert_eq!(outcome, CaptureOutcome::PassedThrough(event));
        }
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_event_passes_through() {
        let (handler, store) = handler();
        let event = json!({"triggerSource": "PostConfirmation_ConfirmSignUp"});

        assert_eq!(handler.handle(event.clone()).await.into_event(), event);
        assert!(store.ops().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_returned_as_value() {
        let (handler, store) = handler();
        store.fail_puts(true);
        let event = SyntheticEvent::confirmed_user("abc-123").to_value().unwrap();

        let outcome = handler.handle(event.clone()).await;

        match outcome {
            CaptureOutcome::StoreFailed { event: returned, error } => {
                assert_eq!(returned, event);
                assert_eq!(error.key, "user_abc-123.json");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(store.ops(), vec![StoreOp::Put("user_abc-123.json".to_string())]);
    }

    #[tokio::test]
    async fn test_local_invoker_dispatches_in_background() {
        let (handler, store) = handler();
        let invoker = LocalCandidateInvoker::new("new-user:2", handler);
        let event = SyntheticEvent::confirmed_user("abc-123");

        invoker.invoke("new-user:2", &event).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(invoker.dispatched(), 1);
        assert!(store.contains("user_abc-123.json"));
        assert!(invoker.invoke("new-user:1", &event).await.is_err());
    }
}
