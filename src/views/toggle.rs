//! `app-view-toggle`: the exams/students switch in each view's sidebar.
//!
//! On its first activation the toggle requests the data for the current
//! path, so a freshly mounted view always gets its listing even if it missed
//! the broker's last ready event. Clicking a tab requests that tab's data;
//! the broker's navigation side effect then swaps the view.

#[cfg(test)]
#[path = "toggle_test.rs"]
mod toggle_test;

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::app::AppContext;
use crate::bus::EventBus;
use crate::events::Request;
use crate::registry::Component;

pub const TAG: &str = "app-view-toggle";
pub const LOCATOR: &str = "/static/js/components/app-view-toggle/app-view-toggle.js";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tab {
    Exams,
    Students,
}

impl Tab {
    pub const ALL: [Tab; 2] = [Tab::Exams, Tab::Students];

    /// Tab shown as active for a hash path (`#` stripped).
    #[must_use]
    pub fn for_path(path: &str) -> Option<Self> {
        match path {
            "" | "/" | "/exams" => Some(Self::Exams),
            "/students" => Some(Self::Students),
            _ => None,
        }
    }

    /// Data request issued when this tab is activated or clicked.
    #[must_use]
    pub fn request(self) -> Request {
        match self {
            Self::Exams => Request::Exams,
            Self::Students => Request::Students,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Exams => "Exams",
            Self::Students => "Students",
        }
    }

    fn badge(self) -> char {
        match self {
            Self::Exams => 'E',
            Self::Students => 'S',
        }
    }
}

#[derive(Default)]
struct ToggleState {
    initialized: bool,
    active: Option<Tab>,
    bus: Option<EventBus>,
}

#[derive(Default)]
pub struct ViewToggle {
    state: Mutex<ToggleState>,
}

impl ViewToggle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ToggleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tab highlighted at the last activation.
    #[must_use]
    pub fn active(&self) -> Option<Tab> {
        self.lock().active
    }

    /// Request `tab`'s data. Returns `false` while disconnected.
    pub fn click(&self, tab: Tab) -> bool {
        let Some(bus) = self.lock().bus.clone() else {
            return false;
        };
        debug!(tab = tab.label(), "toggle clicked");
        bus.publish(&tab.request().to_event());
        true
    }
}

impl Component for ViewToggle {
    fn tag_name(&self) -> &str {
        TAG
    }

    fn connected(&self, ctx: &AppContext) {
        let active = Tab::for_path(&ctx.navigation.current_path());
        let first_activation = {
            let mut state = self.lock();
            state.active = active;
            state.bus = Some(ctx.bus.clone());
            !std::mem::replace(&mut state.initialized, true)
        };

        if first_activation {
            if let Some(tab) = active {
                ctx.bus.publish(&tab.request().to_event());
            }
        }
    }

    fn disconnected(&self) {
        self.lock().bus = None;
    }

    fn render(&self) -> String {
        let active = self.active();
        Tab::ALL
            .iter()
            .map(|&tab| {
                let marker = if active == Some(tab) { '>' } else { ' ' };
                format!("{marker} ({}) {}", tab.badge(), tab.label())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
