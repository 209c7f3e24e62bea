//! View shell: mounts whatever view the router publishes.
//!
//! Each `router-update` replaces the mounted view: the old instance is
//! disconnected first, then the new one is connected with the app context.
//! The router never mounts anything itself.

#[cfg(test)]
#[path = "shell_test.rs"]
mod shell_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::app::AppContext;
use crate::bus::{DomainEvent, Subscription};
use crate::events::ROUTER_UPDATE;
use crate::registry::Component;

pub struct ViewShell {
    ctx: AppContext,
    current: Mutex<Option<Arc<dyn Component>>>,
}

impl ViewShell {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx, current: Mutex::new(None) }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<dyn Component>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow `router-update` on the context's bus until the handle drops.
    #[must_use = "dropping the subscription stops view updates"]
    pub fn connect(self: &Arc<Self>) -> Subscription {
        let shell: Weak<Self> = Arc::downgrade(self);
        self.ctx.bus.subscribe(ROUTER_UPDATE, move |event| {
            if let Some(shell) = shell.upgrade() {
                shell.handle_update(event);
            }
        })
    }

    fn handle_update(&self, event: &DomainEvent) {
        match event.payload.as_view() {
            Some(view) => self.mount(view),
            None => warn!(payload = ?event.payload, "router-update without a view"),
        }
    }

    /// Replace the mounted view with `view`.
    pub fn mount(&self, view: Arc<dyn Component>) {
        let previous = self.lock().replace(Arc::clone(&view));
        if let Some(previous) = previous {
            previous.disconnected();
        }
        debug!(view = view.tag_name(), "mounting view");
        view.connected(&self.ctx);
    }

    /// Disconnect and forget the mounted view.
    pub fn unmount(&self) {
        let previous = self.lock().take();
        if let Some(previous) = previous {
            previous.disconnected();
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn Component>> {
        self.lock().clone()
    }

    /// Rendering of the mounted view, empty when nothing is mounted.
    #[must_use]
    pub fn render(&self) -> String {
        self.current().map(|view| view.render()).unwrap_or_default()
    }

    /// Forward a row pick to the mounted view.
    pub fn select(&self, row: usize) -> bool {
        self.current().is_some_and(|view| view.select(row))
    }
}
