//! Listener registry.
//!
//! Maps every [`HubEvent`] to an ordered set of listeners. The map is fully
//! populated at construction, so subscribing and unsubscribing never create
//! or drop an entry.

use crate::error::{ListenerError, ListenerResult};
use crate::event::HubEvent;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, trace, warn};

/// Listener callback.
pub type Listener = Arc<dyn Fn(&serde_json::Value) -> ListenerResult + Send + Sync>;

/// Registration handle of one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registry of listeners per event.
pub struct ListenerRegistry {
    listeners: RwLock<HashMap<HubEvent, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        let listeners = HubEvent::ALL
            .into_iter()
            .map(|event| (event, Vec::new()))
            .collect();
        Self {
            listeners: RwLock::new(listeners),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `listener` for `event`; it runs after all earlier
    /// registrations for the same event.
    pub fn add(&self, event: HubEvent, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Some(set) = self.listeners.write().get_mut(&event) {
            set.push((id, listener));
        }
        trace!(%event, ?id, "Listener added");
        id
    }

    /// Remove one listener. Returns false if it was already removed.
    pub fn remove(&self, event: HubEvent, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(set) = listeners.get_mut(&event) else {
            return false;
        };
        let before = set.len();
        set.retain(|(listener_id, _)| *listener_id != id);
        before != set.len()
    }

    pub fn count(&self, event: HubEvent) -> usize {
        self.listeners.read().get(&event).map_or(0, Vec::len)
    }

    /// Invoke every listener of `event` in registration order.
    ///
    /// The set is snapshotted before invocation, so a listener may subscribe
    /// or unsubscribe without deadlocking. A listener that fails or panics is
    /// logged and skipped. Returns the number of listeners that succeeded.
    pub fn dispatch(&self, event: HubEvent, payload: &serde_json::Value) -> usize {
        let snapshot: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .get(&event)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!(%event, ?id, error = %e, "Listener failed");
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(%event, ?id, %reason, "Listener panicked");
                }
            }
        }
        delivered
    }
}

/// Box a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&serde_json::Value) -> ListenerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a typed handler so the payload is decoded before it runs.
pub fn typed<T, F>(handler: F) -> Listener
where
    T: DeserializeOwned,
    F: Fn(T) + Send + Sync + 'static,
{
    listener(move |payload| {
        let decoded = T::deserialize(payload).map_err(ListenerError::Decode)?;
        handler(decoded);
        Ok(())
    })
}

/// Handle returned by `subscribe`.
///
/// Dropping it keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove exactly this listener.
#[must_use = "dropping a Subscription does not unsubscribe; keep it to call unsubscribe()"]
pub struct Subscription {
    event: HubEvent,
    id: ListenerId,
    registry: Weak<ListenerRegistry>,
}

impl Subscription {
    pub(crate) fn new(event: HubEvent, id: ListenerId, registry: &Arc<ListenerRegistry>) -> Self {
        Self {
            event,
            id,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn event(&self) -> HubEvent {
        self.event
    }

    pub fn unsubscribe(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.event, self.id))
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}
