//! Event broker: request events in, ready events out.
//!
//! ARCHITECTURE
//! ============
//! Views never fetch. They publish a request event (`requestExamsData`, ...);
//! the broker turns it into one GET against the API and republishes the body
//! as the matching ready event (`eb-examsData`, ...). Requests that name a
//! view destination also move the navigation hash, so "get exam list" both
//! fetches and navigates.
//!
//! SINGLE FLIGHT
//! =============
//! The broker owns one pending slot: a sequence number plus a cancellation
//! token. Dispatching cancels the previous token and installs a fresh one
//! before the new fetch starts. A completing fetch commits only if it can
//! take its own, uncancelled entry back out of the slot. Anything superseded
//! is dropped without an event, a log line, or a hash change, even if its
//! HTTP call resolved.
//!
//! Committing frees the slot before the ready event goes out, so a newer
//! request can start, finish and publish in between. Publishing therefore
//! goes through a second check: the broker remembers the last sequence it
//! published and drops any result older than that.
//!
//! States: `Idle → Fetching → {Published | Cancelled | Failed} → Idle`.

#[cfg(test)]
#[path = "broker_test.rs"]
mod broker_test;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::{DomainEvent, EventBus, Subscription};
use crate::events::{REQUEST_EVENTS, RecordId, Request, Resource};
use crate::fetch::Fetcher;
use crate::navigation::Navigation;

/// Observable broker state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerState {
    Idle,
    Fetching,
}

/// Terminal state of one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    Published,
    Cancelled,
    Failed,
}

struct PendingRequest {
    seq: u64,
    cancel: CancellationToken,
}

struct BrokerInner {
    base_url: String,
    fetcher: Arc<dyn Fetcher>,
    bus: EventBus,
    navigation: Arc<Navigation>,
    pending: Mutex<Option<PendingRequest>>,
    next_seq: AtomicU64,
    /// Sequence of the newest published result; 0 before the first.
    last_published: Mutex<u64>,
}

/// Shared handle to the broker. Clones drive the same pending slot.
#[derive(Clone)]
pub struct EventBroker {
    inner: Arc<BrokerInner>,
}

impl EventBroker {
    pub fn new(base_url: impl Into<String>, fetcher: Arc<dyn Fetcher>, bus: EventBus, navigation: Arc<Navigation>) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                base_url: base_url.into(),
                fetcher,
                bus,
                navigation,
                pending: Mutex::new(None),
                next_seq: AtomicU64::new(1),
                last_published: Mutex::new(0),
            }),
        }
    }

    // =========================================================================
    // PUBLIC CONTRACT
    // =========================================================================

    /// Fetch the whole collection for `resource`.
    pub fn request_all(&self, resource: Resource) {
        self.dispatch(Request::all(resource));
    }

    /// Fetch one record of `resource`.
    pub fn request_by_id(&self, resource: Resource, id: RecordId) {
        self.dispatch(Request::by_id(resource, id));
    }

    pub fn get_exams(&self) {
        self.dispatch(Request::Exams);
    }

    pub fn get_students(&self) {
        self.dispatch(Request::Students);
    }

    pub fn get_exam_results_by_id(&self, exam_id: RecordId) {
        self.dispatch(Request::ExamResults { exam_id });
    }

    pub fn get_student_by_id(&self, student_id: RecordId) {
        self.dispatch(Request::Student { student_id });
    }

    /// Cancel whatever is in flight and start `request`.
    ///
    /// Fire-and-forget: results arrive on the bus. Must be called from within
    /// a tokio runtime.
    pub fn dispatch(&self, request: Request) {
        self.spawn_request(request);
    }

    /// Like [`dispatch`](Self::dispatch), returning the task so callers can
    /// wait for this request to reach a terminal state.
    pub fn spawn_request(&self, request: Request) -> JoinHandle<RequestOutcome> {
        let (seq, cancel) = self.inner.begin();
        let url = request.url(&self.inner.base_url);
        debug!(seq, %url, "request started");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run(seq, request, url, cancel).await })
    }

    /// Listen for request events on the broker's bus.
    ///
    /// Dropping the returned subscriptions detaches the broker.
    #[must_use = "dropping the subscriptions detaches the broker"]
    pub fn connect(&self) -> Vec<Subscription> {
        REQUEST_EVENTS
            .iter()
            .map(|name| {
                let broker = self.clone();
                self.inner.bus.subscribe(*name, move |event| broker.handle_request_event(event))
            })
            .collect()
    }

    fn handle_request_event(&self, event: &DomainEvent) {
        match Request::from_event(event) {
            Some(request) => self.dispatch(request),
            None => warn!(event = %event.name, payload = ?event.payload, "ignoring malformed request event"),
        }
    }

    #[must_use]
    pub fn state(&self) -> BrokerState {
        if self.inner.lock_pending().is_some() { BrokerState::Fetching } else { BrokerState::Idle }
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

impl BrokerInner {
    fn lock_pending(&self) -> MutexGuard<'_, Option<PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel the previous request and install a fresh token.
    fn begin(&self) -> (u64, CancellationToken) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let previous = self
            .lock_pending()
            .replace(PendingRequest { seq, cancel: cancel.clone() });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        (seq, cancel)
    }

    /// Take the slot back if `seq` still owns it. This is the commit point.
    fn commit(&self, seq: u64) -> bool {
        let mut pending = self.lock_pending();
        let owns = pending
            .as_ref()
            .is_some_and(|p| p.seq == seq && !p.cancel.is_cancelled());
        if owns {
            *pending = None;
        }
        owns
    }

    async fn run(&self, seq: u64, request: Request, url: String, cancel: CancellationToken) -> RequestOutcome {
        let result = self.fetcher.get_json(&url, &cancel).await;

        if !self.commit(seq) {
            return RequestOutcome::Cancelled;
        }

        match result {
            Ok(body) => {
                if self.publish(seq, request, body) {
                    RequestOutcome::Published
                } else {
                    RequestOutcome::Cancelled
                }
            }
            Err(e) if e.is_cancelled() => RequestOutcome::Cancelled,
            Err(e) => {
                error!(event = request.ready_event(), %url, error = %e, "fetch failed");
                RequestOutcome::Failed
            }
        }
    }

    /// Publish the ready event and navigate, unless a newer request already
    /// published. Returns whether this result went out.
    fn publish(&self, seq: u64, request: Request, body: Value) -> bool {
        let mut last_published = self.last_published.lock().unwrap_or_else(PoisonError::into_inner);
        if *last_published > seq {
            debug!(seq, newer = *last_published, "dropping result older than the last published one");
            return false;
        }
        *last_published = seq;

        let name = request.ready_event();
        let payload = shape_payload(request, body);
        info!(event = name, "publishing ready event");
        debug!(event = name, payload = %payload, "ready payload");
        self.bus.publish(&DomainEvent::json(name, payload));

        if let Some(destination) = request.destination_hash() {
            if self.navigation.hash() != destination {
                self.navigation.set_hash(&destination);
            }
        }
        true
    }
}

/// Add the request's identifier to the body when the body lacks it.
///
/// Non-object bodies are wrapped as `{ "results": body, <key>: id }`.
fn shape_payload(request: Request, body: Value) -> Value {
    let Some((key, id)) = request.carried_id() else {
        return body;
    };

    match body {
        Value::Object(mut map) => {
            map.entry(key).or_insert_with(|| Value::from(id));
            Value::Object(map)
        }
        other => {
            let mut map = Map::new();
            map.insert("results".to_owned(), other);
            map.insert(key.to_owned(), Value::from(id));
            Value::Object(map)
        }
    }
}
