//! Hash router: keeps one active view consistent with the navigation hash.
//!
//! DESIGN
//! ======
//! Routes are tested in registration order; the first matcher that accepts
//! the hash wins. A match makes sure the view's tag is defined (through the
//! registry, loading on first use), builds a fresh instance and publishes it
//! as `router-update`. Mounting is the view shell's job.
//!
//! ORDERING
//! ========
//! Hash changes are routed concurrently, and loads are asynchronous, so a
//! slow earlier load may finish after a fast later one. Each matched
//! navigation takes a new generation number when the change is received,
//! before its task is spawned, so generations follow hash order no matter
//! how tasks are scheduled. When a load finishes it publishes only if its
//! generation is still the newest. That check, the active-view store and the
//! publish happen under one lock, so an older activation can never publish
//! after a newer one. Hashes that match no route leave the generation alone,
//! so the view already on screen (or on its way) stays.

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use regex::Regex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{DomainEvent, EventBus, Payload};
use crate::events::ROUTER_UPDATE;
use crate::navigation::Navigation;
use crate::registry::{Component, ComponentRegistry, LoadError};

/// Hash evaluated when the navigation hash is empty.
pub const DEFAULT_HASH: &str = "#/";

// =============================================================================
// ROUTE
// =============================================================================

/// Predicate deciding whether a route handles a hash.
#[derive(Clone)]
pub enum Matcher {
    Pattern(Regex),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Matcher {
    #[must_use]
    pub fn matches(&self, hash: &str) -> bool {
        match self {
            Self::Pattern(re) => re.is_match(hash),
            Self::Predicate(f) => f(hash),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// `(tag, loader locator, matcher)` triple.
#[derive(Clone, Debug)]
pub struct Route {
    pub name: String,
    pub loader_path: String,
    pub matcher: Matcher,
}

impl Route {
    /// Route matched by a regular expression.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid `pattern`.
    pub fn new(name: impl Into<String>, loader_path: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self { name: name.into(), loader_path: loader_path.into(), matcher: Matcher::Pattern(Regex::new(pattern)?) })
    }

    /// Route matched by an arbitrary predicate.
    pub fn with_predicate<F>(name: impl Into<String>, loader_path: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self { name: name.into(), loader_path: loader_path.into(), matcher: Matcher::Predicate(Arc::new(predicate)) }
    }
}

// =============================================================================
// ERRORS / OUTCOMES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// The matched view could not be loaded.
    #[error("route {route} failed to load: {source}")]
    Load {
        route: String,
        #[source]
        source: LoadError,
    },

    /// `initialize` was called twice on the same router.
    #[error("router already initialized")]
    AlreadyInitialized,
}

/// What one routing pass did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A fresh instance of `route` was published.
    Activated { route: String },
    /// A newer navigation started while this one was loading.
    Superseded { route: String },
    /// No route accepts the hash.
    NoMatch,
}

// =============================================================================
// ROUTER
// =============================================================================

pub struct Router {
    routes: Vec<Route>,
    registry: Arc<ComponentRegistry>,
    bus: EventBus,
    navigation: Arc<Navigation>,
    generation: AtomicU64,
    active: Mutex<Option<Arc<dyn Component>>>,
    activation: Mutex<()>,
    initialized: AtomicBool,
}

impl Router {
    pub fn new(routes: Vec<Route>, registry: Arc<ComponentRegistry>, bus: EventBus, navigation: Arc<Navigation>) -> Self {
        Self {
            routes,
            registry,
            bus,
            navigation,
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
            activation: Mutex::new(()),
            initialized: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First route accepting `hash`, in registration order.
    #[must_use]
    pub fn match_route(&self, hash: &str) -> Option<&Route> {
        self.routes.iter().find(|route| route.matcher.matches(hash))
    }

    /// The view most recently published.
    #[must_use]
    pub fn active_view(&self) -> Option<Arc<dyn Component>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Start following hash changes and route the current hash.
    ///
    /// Returns the listener task; abort it to stop following hash changes.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::AlreadyInitialized`] on a second call.
    pub fn initialize(self: &Arc<Self>) -> Result<JoinHandle<()>, RouterError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(RouterError::AlreadyInitialized);
        }

        // Subscribe before reading the hash so no change slips between.
        let mut changes = self.navigation.subscribe();
        let current = self.navigation.hash();
        let initial = if current.is_empty() { DEFAULT_HASH.to_owned() } else { current };
        self.spawn_route(initial);

        let router = Arc::clone(self);
        Ok(tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(hash) => router.spawn_route(hash),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "hash changes lagged; routing current hash");
                        router.spawn_route(router.navigation.hash());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    fn spawn_route(self: &Arc<Self>, hash: String) {
        let Some(generation) = self.claim(&hash) else {
            debug!(%hash, "no route matches");
            return;
        };
        let router = Arc::clone(self);
        tokio::spawn(async move {
            match router.route_at(&hash, generation).await {
                Ok(outcome) => debug!(%hash, ?outcome, "routed"),
                Err(e) => error!(%hash, error = %e, "routing failed"),
            }
        });
    }

    /// Take a new generation for `hash` if any route accepts it.
    fn claim(&self, hash: &str) -> Option<u64> {
        self.match_route(hash)?;
        Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Evaluate `hash` once: match, load, instantiate, publish.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Load`] if the matched view cannot be loaded.
    pub async fn route(&self, hash: &str) -> Result<RouteOutcome, RouterError> {
        let Some(generation) = self.claim(hash) else {
            debug!(%hash, "no route matches");
            return Ok(RouteOutcome::NoMatch);
        };
        self.route_at(hash, generation).await
    }

    async fn route_at(&self, hash: &str, generation: u64) -> Result<RouteOutcome, RouterError> {
        let Some(route) = self.match_route(hash) else {
            return Ok(RouteOutcome::NoMatch);
        };

        self.registry
            .ensure_registered(&route.name, &route.loader_path)
            .await
            .map_err(|source| RouterError::Load { route: route.name.clone(), source })?;

        if !self.is_current(generation) {
            debug!(%hash, route = %route.name, "navigation superseded while loading");
            return Ok(RouteOutcome::Superseded { route: route.name.clone() });
        }

        let Some(view) = self.registry.create(&route.name) else {
            return Err(RouterError::Load {
                route: route.name.clone(),
                source: LoadError::NotFound { locator: route.loader_path.clone() },
            });
        };

        let _activation = self.activation.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_current(generation) {
            debug!(%hash, route = %route.name, "navigation superseded before activation");
            return Ok(RouteOutcome::Superseded { route: route.name.clone() });
        }
        info!(route = %route.name, path = %route.loader_path, generation, "activating view");
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&view));
        self.bus.publish(&DomainEvent::new(ROUTER_UPDATE, Payload::View(view)));

        Ok(RouteOutcome::Activated { route: route.name.clone() })
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}
