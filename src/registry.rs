//! Component registry: each tag is loaded and defined at most once.
//!
//! DESIGN
//! ======
//! A tag slot is either `Loading` (a shared in-flight load) or `Defined` (a
//! factory). `ensure_registered` on a defined tag returns without I/O; on a
//! loading tag it joins the existing load; otherwise it starts one. Every
//! concurrent caller awaits the same [`Shared`] future, so the loader runs
//! once per tag no matter how many callers race.
//!
//! A failed load clears the slot (only if it is still the same load), so the
//! next call retries. Defining an already-defined tag is a silent no-op.

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info};

use crate::app::AppContext;

// =============================================================================
// COMPONENT
// =============================================================================

/// A UI element instance. Lifecycle hooks mirror attach/detach on a page.
pub trait Component: Send + Sync {
    /// Tag this instance was created under.
    fn tag_name(&self) -> &str;

    /// Mounted: subscribe to events, request data.
    fn connected(&self, _ctx: &AppContext) {}

    /// Unmounted: drop subscriptions.
    fn disconnected(&self) {}

    /// Current textual rendering.
    fn render(&self) -> String {
        String::new()
    }

    /// The user picked row `row` of whatever this component lists.
    /// Returns `false` if nothing handles it.
    fn select(&self, _row: usize) -> bool {
        false
    }
}

/// Builds a fresh component instance.
pub type ComponentFactory = Arc<dyn Fn() -> Arc<dyn Component> + Send + Sync>;

// =============================================================================
// LOADER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The loader knows nothing at this locator.
    #[error("component not found at {locator}")]
    NotFound { locator: String },

    /// The loader found the locator but could not produce a factory.
    #[error("failed to load component from {locator}: {message}")]
    Failed { locator: String, message: String },
}

/// Resolves a locator (module path, URL, ...) to a component factory.
#[async_trait::async_trait]
pub trait ComponentLoader: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`LoadError`] if nothing can be built from `locator`.
    async fn load(&self, locator: &str) -> Result<ComponentFactory, LoadError>;
}

/// Loader backed by a fixed locator table.
#[derive(Default)]
pub struct StaticLoader {
    factories: HashMap<String, ComponentFactory>,
}

impl StaticLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `locator`.
    #[must_use]
    pub fn with<F>(mut self, locator: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Component> + Send + Sync + 'static,
    {
        self.factories.insert(locator.into(), Arc::new(factory));
        self
    }
}

#[async_trait::async_trait]
impl ComponentLoader for StaticLoader {
    async fn load(&self, locator: &str) -> Result<ComponentFactory, LoadError> {
        self.factories
            .get(locator)
            .cloned()
            .ok_or_else(|| LoadError::NotFound { locator: locator.to_owned() })
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

type LoadFuture = Shared<BoxFuture<'static, Result<ComponentFactory, LoadError>>>;

enum Slot {
    Loading(LoadFuture),
    Defined(ComponentFactory),
}

pub struct ComponentRegistry {
    loader: Arc<dyn ComponentLoader>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ComponentRegistry {
    pub fn new(loader: Arc<dyn ComponentLoader>) -> Self {
        Self { loader, slots: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make sure `tag` is defined, loading it from `locator` on first use.
    ///
    /// # Errors
    ///
    /// Returns the loader's [`LoadError`]; the tag stays undefined and a later
    /// call will retry the load.
    pub async fn ensure_registered(&self, tag: &str, locator: &str) -> Result<(), LoadError> {
        let load = {
            let mut slots = self.lock();
            match slots.get(tag) {
                Some(Slot::Defined(_)) => return Ok(()),
                Some(Slot::Loading(load)) => load.clone(),
                None => {
                    let loader = Arc::clone(&self.loader);
                    let owned_locator = locator.to_owned();
                    let load = async move { loader.load(&owned_locator).await }.boxed().shared();
                    slots.insert(tag.to_owned(), Slot::Loading(load.clone()));
                    load
                }
            }
        };

        let result = load.clone().await;

        let mut slots = self.lock();
        let still_ours = matches!(slots.get(tag), Some(Slot::Loading(current)) if current.ptr_eq(&load));
        match result {
            Ok(factory) => {
                if still_ours {
                    info!(tag, locator, "component defined");
                    slots.insert(tag.to_owned(), Slot::Defined(factory));
                }
                Ok(())
            }
            Err(e) => {
                if still_ours {
                    slots.remove(tag);
                }
                Err(e)
            }
        }
    }

    /// Define `tag` directly. Returns `false` (and changes nothing) if the
    /// tag is already defined.
    pub fn define(&self, tag: &str, factory: ComponentFactory) -> bool {
        let mut slots = self.lock();
        if matches!(slots.get(tag), Some(Slot::Defined(_))) {
            debug!(tag, "component already defined");
            return false;
        }
        info!(tag, "component defined");
        slots.insert(tag.to_owned(), Slot::Defined(factory));
        true
    }

    #[must_use]
    pub fn is_registered(&self, tag: &str) -> bool {
        matches!(self.lock().get(tag), Some(Slot::Defined(_)))
    }

    /// Factory for a defined tag.
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<ComponentFactory> {
        match self.lock().get(tag) {
            Some(Slot::Defined(factory)) => Some(Arc::clone(factory)),
            Some(Slot::Loading(_)) | None => None,
        }
    }

    /// Instantiate a defined tag.
    #[must_use]
    pub fn create(&self, tag: &str) -> Option<Arc<dyn Component>> {
        let factory = self.get(tag)?;
        Some(factory())
    }
}
