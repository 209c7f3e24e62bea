//! End-to-end: a local API, the real HTTP fetcher, built-in views and routes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::extract::Path;
use axum::routing::get;
use serde_json::{Value, json};

use exam_shell::app::App;
use exam_shell::bus::Subscription;
use exam_shell::config::AppConfig;
use exam_shell::console::{Command, Reply, execute};
use exam_shell::events::{EXAMS_READY, STUDENTS_READY};
use exam_shell::views;

async fn spawn_api(exams_delay: Duration) -> String {
    let app = axum::Router::new()
        .route(
            "/api/v1/exams",
            get(move || async move {
                tokio::time::sleep(exams_delay).await;
                Json(json!({
                    "exams": [
                        { "id": 3, "studentCount": 2, "average": 0.8 },
                        { "id": 9, "studentCount": 1, "average": 0.6 }
                    ]
                }))
            }),
        )
        .route(
            "/api/v1/exams/{id}",
            get(|Path(id): Path<u64>| async move {
                Json(json!({
                    "average": 0.8,
                    "results": [
                        { "studentId": format!("s{id}-a"), "score": 0.9 },
                        { "studentId": format!("s{id}-b"), "score": 0.7 }
                    ]
                }))
            }),
        )
        .route(
            "/api/v1/students",
            get(|| async { Json(json!([{ "id": 1, "name": "Ada" }, { "id": 2, "name": "Lin" }])) }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1")
}

fn app(base: &str, hash: &str) -> App {
    let config = AppConfig { initial_hash: hash.to_owned(), ..AppConfig::default() }
        .with_api_base_url(base)
        .unwrap();
    App::from_config(config).unwrap()
}

async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn mounted(app: &App) -> Option<String> {
    app.shell().current().map(|view| view.tag_name().to_owned())
}

#[tokio::test]
async fn browse_exams_drill_down_and_switch_to_students() {
    let base = spawn_api(Duration::ZERO).await;
    let app = app(&base, "");
    app.start().await.unwrap();

    wait_for("exam list", || {
        app.context().navigation.hash() == "#/exams" && app.render().contains("80.00%")
    })
    .await;
    assert_eq!(mounted(&app).as_deref(), Some(views::exams::TAG));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Row 0 is exam 3.
    assert_eq!(execute(&app, Command::Select(0)), Reply::Silent);
    wait_for("exam results", || app.render().contains("Exam 3")).await;
    assert_eq!(app.context().navigation.hash(), "#/exams/3");
    assert_eq!(mounted(&app).as_deref(), Some(views::exams::TAG));
    let page = app.render();
    assert!(page.contains("s3-a"));
    assert!(page.contains("Average 80.00%"));

    assert_eq!(execute(&app, Command::Students), Reply::Silent);
    wait_for("students view", || {
        mounted(&app).as_deref() == Some(views::students::TAG) && app.render().contains("Lin")
    })
    .await;
    assert_eq!(app.context().navigation.hash(), "#/students");

    app.stop();
}

#[tokio::test]
async fn superseded_fetch_never_publishes() {
    let base = spawn_api(Duration::from_millis(300)).await;
    let app = app(&base, "#/students");

    let ready: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let _subs: Vec<Subscription> = [EXAMS_READY, STUDENTS_READY]
        .into_iter()
        .map(|name| {
            let ready = Arc::clone(&ready);
            app.context().bus.subscribe(name, move |event| ready.lock().unwrap().push(event.name.clone()))
        })
        .collect();

    app.broker().get_exams();
    app.broker().get_students();

    wait_for("students ready", || !ready.lock().unwrap().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(*ready.lock().unwrap(), vec![STUDENTS_READY.to_owned()]);
    assert!(app.context().bus.last_json(EXAMS_READY).is_none());
    assert_eq!(app.context().bus.last_json(STUDENTS_READY).map(|v: Value| v.is_array()), Some(true));
    assert_eq!(app.context().navigation.hash(), "#/students");
}
