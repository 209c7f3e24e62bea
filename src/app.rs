//! Application wiring: one bus, one navigation, one registry, shared by all.
//!
//! ARCHITECTURE
//! ============
//! [`App`] owns the coordination pieces and hands components an
//! [`AppContext`] when they mount. Nothing is global: two apps in one process
//! never see each other's events.
//!
//! Startup order matters. Layout components are loaded first (a load failure
//! aborts startup and can be retried), then the broker and the view shell
//! start listening, and only then does the router evaluate the first hash,
//! so the first `router-update` and the first data request both have a
//! listener.

#[cfg(test)]
#[path = "app_test.rs"]
mod app_test;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::try_join_all;
use tokio::task::JoinHandle;
use tracing::info;

use crate::broker::EventBroker;
use crate::bus::{EventBus, Subscription};
use crate::config::{AppConfig, ConfigError};
use crate::fetch::{FetchError, Fetcher, HttpFetcher};
use crate::navigation::Navigation;
use crate::registry::{Component, ComponentLoader, ComponentRegistry, LoadError};
use crate::router::{Route, Router, RouterError};
use crate::shell::ViewShell;
use crate::views;

// =============================================================================
// CONTEXT
// =============================================================================

/// What a mounted component may reach: the bus, the hash and the registry.
#[derive(Clone)]
pub struct AppContext {
    pub bus: EventBus,
    pub navigation: Arc<Navigation>,
    pub registry: Arc<ComponentRegistry>,
}

impl AppContext {
    pub fn new(bus: EventBus, navigation: Arc<Navigation>, registry: Arc<ComponentRegistry>) -> Self {
        Self { bus, navigation, registry }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("fetch setup error: {0}")]
    Fetch(#[from] FetchError),

    /// A layout component failed to load during startup.
    #[error("{0}")]
    Load(#[from] LoadError),

    #[error("{0}")]
    Router(#[from] RouterError),

    #[error("invalid route pattern: {0}")]
    Route(#[from] regex::Error),

    #[error("app already started")]
    AlreadyStarted,
}

// =============================================================================
// ROUTES
// =============================================================================

/// The built-in route table: exams at `#/` and `#/exams`, students under
/// `#/students`.
///
/// # Errors
///
/// Returns a regex error if a pattern fails to compile.
pub fn default_routes() -> Result<Vec<Route>, regex::Error> {
    Ok(vec![
        Route::new(views::exams::TAG, views::exams::LOCATOR, r"^#/(exams)?$")?,
        Route::new(views::students::TAG, views::students::LOCATOR, r"^#/students")?,
    ])
}

// =============================================================================
// APP
// =============================================================================

/// Live state between `start` and `stop`.
struct Running {
    _subscriptions: Vec<Subscription>,
    listener: JoinHandle<()>,
    header: Arc<dyn Component>,
    footer: Arc<dyn Component>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.listener.abort();
        self.header.disconnected();
        self.footer.disconnected();
    }
}

pub struct App {
    config: AppConfig,
    context: AppContext,
    broker: EventBroker,
    router: Arc<Router>,
    shell: Arc<ViewShell>,
    starting: AtomicBool,
    running: Mutex<Option<Running>>,
}

impl App {
    pub fn new(config: AppConfig, fetcher: Arc<dyn Fetcher>, loader: Arc<dyn ComponentLoader>, routes: Vec<Route>) -> Self {
        let bus = EventBus::new();
        let navigation = Arc::new(Navigation::new(&config.initial_hash));
        let registry = Arc::new(ComponentRegistry::new(loader));
        let context = AppContext::new(bus.clone(), Arc::clone(&navigation), Arc::clone(&registry));

        let broker = EventBroker::new(config.api_base_url.clone(), fetcher, bus.clone(), Arc::clone(&navigation));
        let router = Arc::new(Router::new(routes, registry, bus, navigation));
        let shell = Arc::new(ViewShell::new(context.clone()));

        Self {
            config,
            context,
            broker,
            router,
            shell,
            starting: AtomicBool::new(false),
            running: Mutex::new(None),
        }
    }

    /// App talking to the configured API with the built-in views and routes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] if the HTTP client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, AppError> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        let routes = default_routes()?;
        Ok(Self::new(config, fetcher, Arc::new(views::builtin_loader()), routes))
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the layout, connect broker and shell, then start routing.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Load`] if a layout component fails to load (the
    /// app stays stopped and `start` may be retried), or
    /// [`AppError::AlreadyStarted`].
    pub async fn start(&self) -> Result<(), AppError> {
        if self.starting.swap(true, Ordering::SeqCst) {
            return Err(AppError::AlreadyStarted);
        }

        match self.launch().await {
            Ok(running) => {
                *self.lock_running() = Some(running);
                info!(api = %self.config.api_base_url, hash = %self.context.navigation.hash(), "app started");
                Ok(())
            }
            Err(e) => {
                self.starting.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<Running, AppError> {
        let registry = &self.context.registry;
        try_join_all(
            views::LAYOUT
                .iter()
                .map(|(tag, locator)| registry.ensure_registered(tag, locator)),
        )
        .await?;

        let header = self.mount_layout(views::layout::HEADER_TAG, views::layout::HEADER_LOCATOR)?;
        let footer = self.mount_layout(views::layout::FOOTER_TAG, views::layout::FOOTER_LOCATOR)?;

        let mut subscriptions = self.broker.connect();
        subscriptions.push(self.shell.connect());
        let listener = self.router.initialize()?;

        Ok(Running { _subscriptions: subscriptions, listener, header, footer })
    }

    fn mount_layout(&self, tag: &str, locator: &str) -> Result<Arc<dyn Component>, LoadError> {
        let component = self
            .context
            .registry
            .create(tag)
            .ok_or_else(|| LoadError::NotFound { locator: locator.to_owned() })?;
        component.connected(&self.context);
        Ok(component)
    }

    /// Detach broker, shell and router listener. The router cannot be
    /// initialized again, so a stopped app stays stopped.
    pub fn stop(&self) {
        let running = self.lock_running().take();
        drop(running);
        self.shell.unmount();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Header, mounted view and footer, separated by blank lines.
    #[must_use]
    pub fn render(&self) -> String {
        let (header, footer) = match self.lock_running().as_ref() {
            Some(running) => (running.header.render(), running.footer.render()),
            None => (String::new(), String::new()),
        };
        [header, self.shell.render(), footer]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn context(&self) -> &AppContext {
        &self.context
    }

    #[must_use]
    pub fn broker(&self) -> &EventBroker {
        &self.broker
    }

    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    #[must_use]
    pub fn shell(&self) -> &Arc<ViewShell> {
        &self.shell
    }
}
