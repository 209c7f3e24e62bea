use super::*;
use crate::bus::DomainEvent;
use crate::events::{REQUEST_EXAMS, REQUEST_STUDENTS};
use crate::navigation::Navigation;
use crate::registry::{ComponentRegistry, StaticLoader};
use std::sync::{Arc, Mutex};

fn context(hash: &str) -> AppContext {
    AppContext::new(
        EventBus::new(),
        Arc::new(Navigation::new(hash)),
        Arc::new(ComponentRegistry::new(Arc::new(StaticLoader::new()))),
    )
}

/// Names of request events published on `ctx`'s bus.
fn record_requests(ctx: &AppContext) -> (Arc<Mutex<Vec<String>>>, Vec<crate::bus::Subscription>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let subs = [REQUEST_EXAMS, REQUEST_STUDENTS]
        .into_iter()
        .map(|name| {
            let seen = Arc::clone(&seen);
            ctx.bus.subscribe(name, move |event: &DomainEvent| seen.lock().unwrap().push(event.name.clone()))
        })
        .collect();
    (seen, subs)
}

#[test]
fn path_maps_to_tab() {
    assert_eq!(Tab::for_path(""), Some(Tab::Exams));
    assert_eq!(Tab::for_path("/"), Some(Tab::Exams));
    assert_eq!(Tab::for_path("/exams"), Some(Tab::Exams));
    assert_eq!(Tab::for_path("/students"), Some(Tab::Students));
    assert_eq!(Tab::for_path("/exams/4"), None);
}

#[test]
fn first_activation_requests_current_tab() {
    let ctx = context("");
    let (seen, _subs) = record_requests(&ctx);
    let toggle = ViewToggle::new();

    toggle.connected(&ctx);

    assert_eq!(*seen.lock().unwrap(), vec![REQUEST_EXAMS.to_owned()]);
    assert_eq!(toggle.active(), Some(Tab::Exams));
}

#[test]
fn students_path_requests_students() {
    let ctx = context("#/students");
    let (seen, _subs) = record_requests(&ctx);
    let toggle = ViewToggle::new();

    toggle.connected(&ctx);

    assert_eq!(*seen.lock().unwrap(), vec![REQUEST_STUDENTS.to_owned()]);
    assert_eq!(toggle.active(), Some(Tab::Students));
}

#[test]
fn unknown_path_requests_nothing() {
    let ctx = context("#/exams/4");
    let (seen, _subs) = record_requests(&ctx);
    let toggle = ViewToggle::new();

    toggle.connected(&ctx);

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(toggle.active(), None);
}

#[test]
fn reconnecting_does_not_request_again() {
    let ctx = context("#/exams");
    let (seen, _subs) = record_requests(&ctx);
    let toggle = ViewToggle::new();

    toggle.connected(&ctx);
    toggle.disconnected();
    toggle.connected(&ctx);

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn click_publishes_tab_request_while_connected() {
    let ctx = context("#/exams");
    let (seen, _subs) = record_requests(&ctx);
    let toggle = ViewToggle::new();
    assert!(!toggle.click(Tab::Students));

    toggle.connected(&ctx);
    assert!(toggle.click(Tab::Students));
    toggle.disconnected();
    assert!(!toggle.click(Tab::Exams));

    assert_eq!(*seen.lock().unwrap(), vec![REQUEST_EXAMS.to_owned(), REQUEST_STUDENTS.to_owned()]);
}

#[test]
fn render_marks_active_tab() {
    let ctx = context("#/students");
    let toggle = ViewToggle::new();
    toggle.connected(&ctx);

    let text = toggle.render();
    assert!(text.contains("  (E) Exams"));
    assert!(text.contains("> (S) Students"));
}
