use super::*;
use crate::events::{EXAM_RESULTS_READY, EXAMS_READY, STUDENT_READY, STUDENTS_READY};
use crate::fetch::FetchError;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;

const BASE: &str = "http://api.test/v1";

// =========================================================================
// MockFetcher
// =========================================================================

#[derive(Clone)]
enum Body {
    Json(Value),
    Status(u16),
    Malformed,
}

#[derive(Clone)]
struct Reply {
    gate: Option<Arc<Notify>>,
    body: Body,
}

/// Scripted fetcher. Gated replies wait for their gate; the cancellation token
/// is deliberately ignored so stale responses really do arrive late.
#[derive(Default)]
struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    fn reply(&self, path: &str, body: Value) {
        self.script(path, Reply { gate: None, body: Body::Json(body) });
    }

    fn reply_status(&self, path: &str, status: u16) {
        self.script(path, Reply { gate: None, body: Body::Status(status) });
    }

    fn reply_malformed(&self, path: &str) {
        self.script(path, Reply { gate: None, body: Body::Malformed });
    }

    fn gated(&self, path: &str, body: Value) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script(path, Reply { gate: Some(Arc::clone(&gate)), body: Body::Json(body) });
        gate
    }

    fn script(&self, path: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(format!("{BASE}{path}"), reply);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for MockFetcher {
    async fn get_json(&self, url: &str, _cancel: &CancellationToken) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(url.to_owned());
        let reply = self.replies.lock().unwrap().get(url).cloned();
        let Some(reply) = reply else {
            return Err(FetchError::Request(format!("no scripted reply for {url}")));
        };
        if let Some(gate) = reply.gate {
            gate.notified().await;
        }
        match reply.body {
            Body::Json(value) => Ok(value),
            Body::Status(status) => Err(FetchError::Status { status, body: String::new() }),
            Body::Malformed => Err(FetchError::Parse("expected value".into())),
        }
    }
}

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    broker: EventBroker,
    fetcher: Arc<MockFetcher>,
    bus: EventBus,
    navigation: Arc<Navigation>,
    events: mpsc::UnboundedReceiver<DomainEvent>,
    _subs: Vec<Subscription>,
}

fn harness(initial_hash: &str) -> Harness {
    let fetcher = Arc::new(MockFetcher::default());
    let bus = EventBus::new();
    let navigation = Arc::new(Navigation::new(initial_hash));
    let broker = EventBroker::new(BASE, fetcher.clone(), bus.clone(), Arc::clone(&navigation));

    let (tx, events) = mpsc::unbounded_channel();
    let subs: Vec<Subscription> = [EXAMS_READY, STUDENTS_READY, EXAM_RESULTS_READY, STUDENT_READY]
        .into_iter()
        .map(|name| {
            let tx = tx.clone();
            bus.subscribe(name, move |event| {
                let _ = tx.send(event.clone());
            })
        })
        .collect();

    Harness { broker, fetcher, bus, navigation, events, _subs: subs }
}

async fn recv_event(rx: &mut mpsc::UnboundedReceiver<DomainEvent>) -> DomainEvent {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("ready event receive timed out")
        .expect("event channel closed unexpectedly")
}

async fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<DomainEvent>) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(80), rx.recv()).await {
        panic!("expected no ready event, got {}", event.name);
    }
}

fn payload(event: &DomainEvent) -> &Value {
    event.payload.as_json().expect("ready event carries JSON")
}

// =========================================================================
// Single flight
// =========================================================================

#[tokio::test]
async fn later_request_wins_over_earlier_one() {
    let mut h = harness("#/exams");
    let gate1 = h.fetcher.gated("/exams/1", json!({ "results": [{ "studentId": 1, "score": 0.1 }] }));
    let gate2 = h.fetcher.gated("/exams/2", json!({ "results": [{ "studentId": 2, "score": 0.2 }] }));

    let first = h.broker.spawn_request(Request::ExamResults { exam_id: 1 });
    let second = h.broker.spawn_request(Request::ExamResults { exam_id: 2 });

    gate2.notify_one();
    assert_eq!(second.await.unwrap(), RequestOutcome::Published);
    gate1.notify_one();
    assert_eq!(first.await.unwrap(), RequestOutcome::Cancelled);

    let event = recv_event(&mut h.events).await;
    assert_eq!(event.name, EXAM_RESULTS_READY);
    assert_eq!(payload(&event)["examId"], 2);
    assert_eq!(payload(&event)["results"][0]["studentId"], 2);
    assert_no_event(&mut h.events).await;
    assert_eq!(h.navigation.hash(), "#/exams/2");
}

#[tokio::test]
async fn stale_response_arriving_last_is_dropped() {
    let mut h = harness("#/exams");
    let gate1 = h.fetcher.gated("/exams/1", json!({ "results": [] }));
    let gate2 = h.fetcher.gated("/exams/2", json!({ "results": [] }));

    let first = h.broker.spawn_request(Request::ExamResults { exam_id: 1 });
    let second = h.broker.spawn_request(Request::ExamResults { exam_id: 2 });

    gate1.notify_one();
    assert_eq!(first.await.unwrap(), RequestOutcome::Cancelled);
    assert_no_event(&mut h.events).await;

    gate2.notify_one();
    assert_eq!(second.await.unwrap(), RequestOutcome::Published);
    let event = recv_event(&mut h.events).await;
    assert_eq!(payload(&event)["examId"], 2);
}

#[tokio::test]
async fn burst_publishes_exactly_once_for_last_request() {
    let mut h = harness("#/exams");
    let gates: Vec<_> = (1..=5)
        .map(|id| h.fetcher.gated(&format!("/exams/{id}"), json!({ "results": [] })))
        .collect();

    let handles: Vec<_> = (1..=5)
        .map(|id| h.broker.spawn_request(Request::ExamResults { exam_id: id }))
        .collect();
    for gate in &gates {
        gate.notify_one();
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }
    assert_eq!(outcomes[..4], [RequestOutcome::Cancelled; 4]);
    assert_eq!(outcomes[4], RequestOutcome::Published);

    let event = recv_event(&mut h.events).await;
    assert_eq!(payload(&event)["examId"], 5);
    assert_no_event(&mut h.events).await;
    assert_eq!(h.fetcher.calls().len(), 5);
}

#[tokio::test]
async fn result_older_than_last_published_is_dropped() {
    let mut h = harness("#/exams");
    let inner = &h.broker.inner;

    // Request 1 commits, then request 2 runs to completion before 1 publishes.
    let (first, _) = inner.begin();
    assert!(inner.commit(first));
    let (second, _) = inner.begin();
    assert!(inner.commit(second));
    assert!(inner.publish(second, Request::ExamResults { exam_id: 2 }, json!({ "results": [] })));
    assert!(!inner.publish(first, Request::ExamResults { exam_id: 1 }, json!({ "results": [] })));

    let event = recv_event(&mut h.events).await;
    assert_eq!(payload(&event)["examId"], 2);
    assert_no_event(&mut h.events).await;
    assert_eq!(h.bus.last_json(EXAM_RESULTS_READY).unwrap()["examId"], 2);
    assert_eq!(h.navigation.hash(), "#/exams/2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn back_to_back_requests_settle_on_the_last_one_across_threads() {
    for _ in 0..200 {
        let mut h = harness("#/exams");
        h.fetcher.reply("/exams/1", json!({ "results": [] }));
        h.fetcher.reply("/exams/2", json!({ "results": [] }));

        let first = h.broker.spawn_request(Request::ExamResults { exam_id: 1 });
        let second = h.broker.spawn_request(Request::ExamResults { exam_id: 2 });
        assert_eq!(second.await.unwrap(), RequestOutcome::Published);
        first.await.unwrap();

        let mut last = None;
        while let Ok(event) = h.events.try_recv() {
            last = Some(payload(&event)["examId"].clone());
        }
        assert_eq!(last, Some(json!(2)));
        assert_eq!(h.bus.last_json(EXAM_RESULTS_READY).unwrap()["examId"], 2);
        assert_eq!(h.navigation.hash(), "#/exams/2");
        assert_eq!(h.broker.state(), BrokerState::Idle);
    }
}

#[tokio::test]
async fn state_tracks_in_flight_request() {
    let h = harness("#/exams");
    let gate = h.fetcher.gated("/exams", json!({ "exams": [] }));
    assert_eq!(h.broker.state(), BrokerState::Idle);

    let handle = h.broker.spawn_request(Request::Exams);
    assert_eq!(h.broker.state(), BrokerState::Fetching);

    gate.notify_one();
    assert_eq!(handle.await.unwrap(), RequestOutcome::Published);
    assert_eq!(h.broker.state(), BrokerState::Idle);
}

// =========================================================================
// Navigation side effect
// =========================================================================

#[tokio::test]
async fn exams_request_navigates_to_exams_view() {
    let mut h = harness("#/students");
    let mut changes = h.navigation.subscribe();
    h.fetcher.reply("/exams", json!({ "exams": [] }));

    assert_eq!(h.broker.spawn_request(Request::Exams).await.unwrap(), RequestOutcome::Published);

    let event = recv_event(&mut h.events).await;
    assert_eq!(event.name, EXAMS_READY);
    assert_no_event(&mut h.events).await;
    assert_eq!(h.navigation.hash(), "#/exams");
    assert_eq!(changes.try_recv().unwrap(), "#/exams");
    assert!(changes.try_recv().is_err());
}

#[tokio::test]
async fn no_hash_mutation_when_already_there() {
    let mut h = harness("#/exams");
    let mut changes = h.navigation.subscribe();
    h.fetcher.reply("/exams", json!({ "exams": [] }));

    h.broker.spawn_request(Request::Exams).await.unwrap();

    recv_event(&mut h.events).await;
    assert!(changes.try_recv().is_err());
    assert_eq!(h.navigation.hash(), "#/exams");
}

#[tokio::test]
async fn students_request_navigates_to_students_view() {
    let mut h = harness("#/exams");
    h.fetcher.reply("/students", json!([{ "id": 1, "name": "Ada" }]));

    h.broker.get_students();

    let event = recv_event(&mut h.events).await;
    assert_eq!(event.name, STUDENTS_READY);
    assert_eq!(payload(&event), &json!([{ "id": 1, "name": "Ada" }]));
    assert_eq!(h.navigation.hash(), "#/students");
}

#[tokio::test]
async fn student_request_has_no_destination() {
    let mut h = harness("#/students");
    let mut changes = h.navigation.subscribe();
    h.fetcher.reply("/students/4", json!({ "id": 4, "name": "Grace" }));

    h.broker.spawn_request(Request::Student { student_id: 4 }).await.unwrap();

    let event = recv_event(&mut h.events).await;
    assert_eq!(event.name, STUDENT_READY);
    assert_eq!(payload(&event)["studentId"], 4);
    assert!(changes.try_recv().is_err());
}

// =========================================================================
// Silent cancellation
// =========================================================================

#[tokio::test]
async fn cancelled_request_has_no_side_effects() {
    let mut h = harness("#/students");
    let mut changes = h.navigation.subscribe();
    let gate = h.fetcher.gated("/exams", json!({ "exams": [] }));
    h.fetcher.reply("/students/4", json!({ "id": 4 }));

    let stale = h.broker.spawn_request(Request::Exams);
    let fresh = h.broker.spawn_request(Request::Student { student_id: 4 });
    assert_eq!(fresh.await.unwrap(), RequestOutcome::Published);

    gate.notify_one();
    assert_eq!(stale.await.unwrap(), RequestOutcome::Cancelled);

    let event = recv_event(&mut h.events).await;
    assert_eq!(event.name, STUDENT_READY);
    assert_no_event(&mut h.events).await;
    assert_eq!(h.navigation.hash(), "#/students");
    assert!(changes.try_recv().is_err());
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn bad_status_publishes_nothing() {
    let mut h = harness("#/students");
    h.fetcher.reply_status("/exams", 500);

    assert_eq!(h.broker.spawn_request(Request::Exams).await.unwrap(), RequestOutcome::Failed);

    assert_no_event(&mut h.events).await;
    assert_eq!(h.navigation.hash(), "#/students");
    assert_eq!(h.broker.state(), BrokerState::Idle);
}

#[tokio::test]
async fn malformed_body_publishes_nothing() {
    let mut h = harness("#/exams");
    h.fetcher.reply_malformed("/exams/3");

    assert_eq!(
        h.broker.spawn_request(Request::ExamResults { exam_id: 3 }).await.unwrap(),
        RequestOutcome::Failed
    );
    assert_no_event(&mut h.events).await;
    assert_eq!(h.navigation.hash(), "#/exams");
}

#[tokio::test]
async fn transport_error_publishes_nothing() {
    let mut h = harness("#/exams");

    assert_eq!(h.broker.spawn_request(Request::Students).await.unwrap(), RequestOutcome::Failed);
    assert_no_event(&mut h.events).await;
}

#[tokio::test]
async fn next_request_after_failure_succeeds() {
    let mut h = harness("#/exams");
    h.fetcher.reply_status("/exams", 503);
    assert_eq!(h.broker.spawn_request(Request::Exams).await.unwrap(), RequestOutcome::Failed);

    h.fetcher.reply("/exams", json!({ "exams": [] }));
    assert_eq!(h.broker.spawn_request(Request::Exams).await.unwrap(), RequestOutcome::Published);
    recv_event(&mut h.events).await;
}

// =========================================================================
// Request events on the bus
// =========================================================================

#[tokio::test]
async fn connected_broker_answers_request_events() {
    let mut h = harness("#/exams");
    let _subs = h.broker.connect();
    h.fetcher.reply("/exams/8", json!({ "results": [], "average": 0.5 }));

    h.bus.publish(&Request::ExamResults { exam_id: 8 }.to_event());

    let event = recv_event(&mut h.events).await;
    assert_eq!(event.name, EXAM_RESULTS_READY);
    assert_eq!(payload(&event)["examId"], 8);
    assert_eq!(h.fetcher.calls(), vec![format!("{BASE}/exams/8")]);
}

#[tokio::test]
async fn malformed_request_event_is_ignored() {
    let mut h = harness("#/exams");
    let _subs = h.broker.connect();

    h.bus.publish(&DomainEvent::json(crate::events::REQUEST_EXAM_RESULTS, json!({ "id": 1 })));

    assert_no_event(&mut h.events).await;
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn dropping_subscriptions_detaches_broker() {
    let mut h = harness("#/exams");
    let subs = h.broker.connect();
    drop(subs);
    h.fetcher.reply("/exams", json!({ "exams": [] }));

    h.bus.publish(&Request::Exams.to_event());

    assert_no_event(&mut h.events).await;
    assert!(h.fetcher.calls().is_empty());
}

#[tokio::test]
async fn resource_operations_hit_expected_endpoints() {
    let mut h = harness("#/exams");
    for path in ["/exams", "/students", "/exams/2", "/students/3"] {
        h.fetcher.reply(path, json!({}));
    }

    h.broker.request_all(Resource::Exams);
    recv_event(&mut h.events).await;
    h.broker.request_all(Resource::Students);
    recv_event(&mut h.events).await;
    h.broker.request_by_id(Resource::Exams, 2);
    recv_event(&mut h.events).await;
    h.broker.request_by_id(Resource::Students, 3);
    recv_event(&mut h.events).await;

    assert_eq!(
        h.fetcher.calls(),
        vec![
            format!("{BASE}/exams"),
            format!("{BASE}/students"),
            format!("{BASE}/exams/2"),
            format!("{BASE}/students/3"),
        ]
    );
}

// =========================================================================
// shape_payload
// =========================================================================

#[test]
fn shape_adds_missing_identifier() {
    let shaped = shape_payload(Request::ExamResults { exam_id: 3 }, json!({ "results": [], "average": 0.4 }));
    assert_eq!(shaped, json!({ "results": [], "average": 0.4, "examId": 3 }));
}

#[test]
fn shape_keeps_identifier_from_server() {
    let shaped = shape_payload(Request::ExamResults { exam_id: 3 }, json!({ "examId": "3", "results": [] }));
    assert_eq!(shaped["examId"], "3");
}

#[test]
fn shape_wraps_bare_collections() {
    let shaped = shape_payload(Request::ExamResults { exam_id: 6 }, json!([{ "studentId": 1, "score": 0.9 }]));
    assert_eq!(shaped, json!({ "results": [{ "studentId": 1, "score": 0.9 }], "examId": 6 }));
}

#[test]
fn shape_leaves_collection_requests_alone() {
    let body = json!([1, 2, 3]);
    assert_eq!(shape_payload(Request::Exams, body.clone()), body);
}
