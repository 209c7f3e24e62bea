use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Dummy(&'static str);

impl Component for Dummy {
    fn tag_name(&self) -> &str {
        self.0
    }

    fn render(&self) -> String {
        format!("<{}>", self.0)
    }
}

fn dummy_factory(tag: &'static str) -> ComponentFactory {
    Arc::new(move || Arc::new(Dummy(tag)) as Arc<dyn Component>)
}

// =========================================================================
// CountingLoader
// =========================================================================

/// Counts loads, sleeps before answering, and fails the first `failures` calls.
struct CountingLoader {
    loads: AtomicUsize,
    delay: Duration,
    failures: usize,
}

impl CountingLoader {
    fn new(delay: Duration, failures: usize) -> Self {
        Self { loads: AtomicUsize::new(0), delay, failures }
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ComponentLoader for CountingLoader {
    async fn load(&self, locator: &str) -> Result<ComponentFactory, LoadError> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if n < self.failures {
            return Err(LoadError::Failed { locator: locator.to_owned(), message: "boom".into() });
        }
        Ok(dummy_factory("app-table"))
    }
}

// =========================================================================
// ensure_registered
// =========================================================================

#[tokio::test]
async fn concurrent_registration_loads_once() {
    let loader = Arc::new(CountingLoader::new(Duration::from_millis(30), 0));
    let registry = ComponentRegistry::new(loader.clone());

    let (a, b) = tokio::join!(
        registry.ensure_registered("app-table", "/static/js/components/app-table/app-table.js"),
        registry.ensure_registered("app-table", "/static/js/components/app-table/app-table.js"),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(loader.loads(), 1);
    assert!(registry.is_registered("app-table"));
}

#[tokio::test]
async fn registered_tag_skips_loader() {
    let loader = Arc::new(CountingLoader::new(Duration::ZERO, 0));
    let registry = ComponentRegistry::new(loader.clone());

    registry.ensure_registered("app-table", "table.js").await.unwrap();
    registry.ensure_registered("app-table", "table.js").await.unwrap();
    registry.ensure_registered("app-table", "somewhere-else.js").await.unwrap();

    assert_eq!(loader.loads(), 1);
}

#[tokio::test]
async fn failed_load_propagates_to_all_waiters_and_allows_retry() {
    let loader = Arc::new(CountingLoader::new(Duration::from_millis(20), 1));
    let registry = ComponentRegistry::new(loader.clone());

    let (a, b) = tokio::join!(
        registry.ensure_registered("app-table", "table.js"),
        registry.ensure_registered("app-table", "table.js"),
    );
    assert!(matches!(a, Err(LoadError::Failed { .. })));
    assert_eq!(a, b);
    assert_eq!(loader.loads(), 1);
    assert!(!registry.is_registered("app-table"));

    registry.ensure_registered("app-table", "table.js").await.unwrap();
    assert_eq!(loader.loads(), 2);
    assert!(registry.is_registered("app-table"));
}

#[tokio::test]
async fn static_loader_reports_unknown_locator() {
    let registry = ComponentRegistry::new(Arc::new(StaticLoader::new()));
    let err = registry.ensure_registered("app-ghost", "/nowhere.js").await.unwrap_err();
    assert_eq!(err, LoadError::NotFound { locator: "/nowhere.js".into() });
    assert!(registry.create("app-ghost").is_none());
}

#[tokio::test]
async fn static_loader_resolves_known_locator() {
    let loader = StaticLoader::new().with("/header.js", || Arc::new(Dummy("app-header")) as Arc<dyn Component>);
    let registry = ComponentRegistry::new(Arc::new(loader));

    registry.ensure_registered("app-header", "/header.js").await.unwrap();
    let instance = registry.create("app-header").unwrap();
    assert_eq!(instance.tag_name(), "app-header");
    assert_eq!(instance.render(), "<app-header>");
}

// =========================================================================
// define / create
// =========================================================================

#[test]
fn duplicate_define_is_silent_noop() {
    let registry = ComponentRegistry::new(Arc::new(StaticLoader::new()));
    assert!(registry.define("app-footer", dummy_factory("first")));
    assert!(!registry.define("app-footer", dummy_factory("second")));

    let instance = registry.create("app-footer").unwrap();
    assert_eq!(instance.tag_name(), "first");
}

#[test]
fn create_builds_fresh_instances() {
    let registry = ComponentRegistry::new(Arc::new(StaticLoader::new()));
    registry.define("app-footer", dummy_factory("app-footer"));

    let a = registry.create("app-footer").unwrap();
    let b = registry.create("app-footer").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn define_during_load_wins_and_load_still_succeeds() {
    let loader = Arc::new(CountingLoader::new(Duration::from_millis(30), 0));
    let registry = Arc::new(ComponentRegistry::new(loader.clone()));

    let pending = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.ensure_registered("app-table", "table.js").await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(registry.define("app-table", dummy_factory("defined-directly")));

    pending.await.unwrap().unwrap();
    assert_eq!(registry.create("app-table").unwrap().tag_name(), "defined-directly");
}
