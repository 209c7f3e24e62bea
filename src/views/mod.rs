//! Built-in components and the loader that resolves their locators.
//!
//! Locators keep the module paths the web build serves them from, so a route
//! table written for the browser works unchanged.

pub mod exams;
pub mod layout;
pub mod students;
pub mod table;
pub mod toggle;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::app::AppContext;
use crate::registry::{Component, StaticLoader};

/// Layout components loaded at startup, `(tag, locator)`.
pub const LAYOUT: [(&str, &str); 2] = [
    (layout::HEADER_TAG, layout::HEADER_LOCATOR),
    (layout::FOOTER_TAG, layout::FOOTER_LOCATOR),
];

/// Loader resolving every built-in locator.
#[must_use]
pub fn builtin_loader() -> StaticLoader {
    StaticLoader::new()
        .with(exams::LOCATOR, || Arc::new(exams::ExamsView::new()) as Arc<dyn Component>)
        .with(students::LOCATOR, || Arc::new(students::StudentsView::new()) as Arc<dyn Component>)
        .with(toggle::LOCATOR, || Arc::new(toggle::ViewToggle::new()) as Arc<dyn Component>)
        .with(table::LOCATOR, || Arc::new(table::DataTable::new()) as Arc<dyn Component>)
        .with(layout::HEADER_LOCATOR, || Arc::new(layout::Header) as Arc<dyn Component>)
        .with(layout::FOOTER_LOCATOR, || Arc::new(layout::Footer) as Arc<dyn Component>)
}

/// Define a view's child tags in the background.
fn register_children(ctx: &AppContext, children: &'static [(&'static str, &'static str)]) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        debug!("no runtime, child registration skipped");
        return;
    };
    let registry = Arc::clone(&ctx.registry);
    runtime.spawn(async move {
        for (tag, locator) in children {
            if let Err(e) = registry.ensure_registered(tag, locator).await {
                warn!(tag, error = %e, "child component failed to load");
            }
        }
    });
}
