//! Navigation: the single shared hash fragment and its change notifications.
//!
//! DESIGN
//! ======
//! Stands in for `window.location.hash` plus the `hashchange` event. The hash
//! is written by user navigation and by the broker's post-fetch side effect,
//! and read by the router and by views rendering an active indicator.
//! Writing an identical hash is a no-op and notifies nobody.

#[cfg(test)]
#[path = "navigation_test.rs"]
mod navigation_test;

use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

/// Hash-change channel capacity. Lagging observers re-read the current hash.
pub const CHANNEL_CAPACITY: usize = 64;

pub struct Navigation {
    hash: Mutex<String>,
    changes: broadcast::Sender<String>,
}

impl Navigation {
    /// Start at `initial` (normalized to a leading `#` unless empty).
    #[must_use]
    pub fn new(initial: &str) -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { hash: Mutex::new(normalize(initial)), changes }
    }

    /// Current hash, including the leading `#` (empty when unset).
    #[must_use]
    pub fn hash(&self) -> String {
        self.hash.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the hash. Returns `true` and notifies observers if it changed.
    pub fn set_hash(&self, hash: &str) -> bool {
        let next = normalize(hash);
        {
            let mut current = self.hash.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == next {
                return false;
            }
            current.clone_from(&next);
        }
        tracing::debug!(hash = %next, "hash changed");
        if self.changes.send(next).is_err() {
            tracing::trace!("hash changed with no observers");
        }
        true
    }

    /// Observe subsequent hash changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }

    /// The hash without its leading `#` (`"#/exams"` → `"/exams"`).
    #[must_use]
    pub fn current_path(&self) -> String {
        let hash = self.hash();
        hash.strip_prefix('#').unwrap_or(&hash).to_owned()
    }

    /// Exam id from a `#/exams/{id}` hash, if present.
    #[must_use]
    pub fn exam_id_from_hash(&self) -> Option<String> {
        let hash = self.hash();
        let rest = hash.strip_prefix("#/exams/")?;
        let id: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '_').collect();
        if id.is_empty() { None } else { Some(id) }
    }

    /// Last non-empty `/`-separated segment of the hash.
    #[must_use]
    pub fn url_ending(&self) -> Option<String> {
        let hash = self.hash();
        let ending = hash.rsplit('/').next()?;
        if ending.is_empty() { None } else { Some(ending.to_owned()) }
    }

    /// URL ending when it looks like a slug (`name-abc123`).
    #[must_use]
    pub fn slug(&self) -> Option<String> {
        let ending = self.url_ending()?;
        is_slug(&ending).then_some(ending)
    }
}

impl Default for Navigation {
    fn default() -> Self {
        Self::new("")
    }
}

fn normalize(hash: &str) -> String {
    if hash.is_empty() || hash.starts_with('#') {
        hash.to_owned()
    } else {
        format!("#{hash}")
    }
}

/// `<anything>-<1..=100 lowercase alphanumerics>` at the end of the segment.
fn is_slug(segment: &str) -> bool {
    let Some((_, tail)) = segment.rsplit_once('-') else {
        return false;
    };
    !tail.is_empty() && tail.len() <= 100 && tail.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
