//! Event bus: in-process publish/subscribe between components.
//!
//! DESIGN
//! ======
//! Delivery is synchronous and ordered: `publish` invokes every handler
//! currently subscribed to the event name, in subscription order, exactly
//! once. Handlers are snapshotted before delivery and the lock is released,
//! so a handler may publish or subscribe without deadlocking.
//!
//! The bus also remembers the last JSON payload published under each name.
//! A view that mounts after a ready event fired can pick the data up from
//! [`EventBus::last_json`] instead of missing it.

#[cfg(test)]
#[path = "bus_test.rs"]
mod bus_test;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;

use crate::registry::Component;

// =============================================================================
// EVENT
// =============================================================================

/// Payload carried by a [`DomainEvent`].
#[derive(Clone)]
pub enum Payload {
    /// No detail (e.g. `requestExamsData`).
    Empty,
    /// Structured data: request parameters or fetched records.
    Json(Value),
    /// A freshly constructed component, carried by `router-update`.
    View(Arc<dyn Component>),
}

impl Payload {
    /// Borrow the JSON body, if this payload carries one.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Empty | Self::View(_) => None,
        }
    }

    /// Clone out the component, if this payload carries one.
    #[must_use]
    pub fn as_view(&self) -> Option<Arc<dyn Component>> {
        match self {
            Self::View(view) => Some(Arc::clone(view)),
            Self::Empty | Self::Json(_) => None,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::View(view) => f.debug_tuple("View").field(&view.tag_name()).finish(),
        }
    }
}

/// A named, transient message on the bus.
#[derive(Clone, Debug)]
pub struct DomainEvent {
    pub name: String,
    pub payload: Payload,
}

impl DomainEvent {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self { name: name.into(), payload }
    }

    /// Event with no detail.
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Payload::Empty)
    }

    /// Event carrying a JSON detail.
    pub fn json(name: impl Into<String>, value: Value) -> Self {
        Self::new(name, Payload::Json(value))
    }
}

// =============================================================================
// BUS
// =============================================================================

type Handler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

struct Listener {
    id: u64,
    name: String,
    handler: Handler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<Listener>,
    last_json: HashMap<String, Value>,
}

/// Shared publish/subscribe bus. Cheap to clone; all clones share listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for events named `name`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or explicitly unsubscribed.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(Listener { id, name: name.into(), handler: Arc::new(handler) });
        Subscription { bus: Arc::downgrade(&self.inner), id }
    }

    /// Deliver `event` to every current subscriber of its name, in order.
    pub fn publish(&self, event: &DomainEvent) {
        let handlers: Vec<Handler> = {
            let mut inner = self.lock();
            if let Payload::Json(value) = &event.payload {
                inner.last_json.insert(event.name.clone(), value.clone());
            }
            inner
                .listeners
                .iter()
                .filter(|l| l.name == event.name)
                .map(|l| Arc::clone(&l.handler))
                .collect()
        };

        tracing::trace!(event = %event.name, listeners = handlers.len(), "publish");
        for handler in handlers {
            handler(event);
        }
    }

    /// Last JSON payload published under `name`, if any.
    #[must_use]
    pub fn last_json(&self, name: &str) -> Option<Value> {
        self.lock().last_json.get(name).cloned()
    }

    /// Number of live subscriptions for `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.lock().listeners.iter().filter(|l| l.name == name).count()
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Handle for a bus registration. Dropping it removes the handler.
pub struct Subscription {
    bus: Weak<Mutex<BusInner>>,
    id: u64,
}

impl Subscription {
    /// Remove the handler now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        // The handler may own other subscriptions; drop it outside the lock.
        let removed = {
            let mut inner = bus.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .listeners
                .iter()
                .position(|l| l.id == self.id)
                .map(|idx| inner.listeners.remove(idx))
        };
        drop(removed);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
