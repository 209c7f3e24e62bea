//! `app-students-view`: student list and the student picked from it.

#[cfg(test)]
#[path = "students_test.rs"]
mod students_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{info, warn};

use crate::app::AppContext;
use crate::bus::{EventBus, Subscription};
use crate::events::{Request, STUDENT_READY, STUDENTS_READY, Student};
use crate::registry::Component;
use crate::views::table::{Column, DataTable, Row, cell_text};
use crate::views::toggle::{self, ViewToggle};

pub const TAG: &str = "app-students-view";
pub const LOCATOR: &str = "/static/js/components/views/app-students-view.js";

const CHILDREN: &[(&str, &str)] = &[(toggle::TAG, toggle::LOCATOR)];

const STUDENT_COLUMNS: [Column; 2] = [Column::new("id", "Student ID"), Column::new("name", "Name")];

/// Accepts a bare array or `{"students": [...]}`.
fn parse_students(detail: &Value) -> Result<Vec<Student>, serde_json::Error> {
    let list = detail.get("students").unwrap_or(detail);
    serde_json::from_value(list.clone())
}

fn describe(student: &Student) -> String {
    match &student.name {
        Some(name) => format!("Student {}: {name}", cell_text(Some(&student.id))),
        None => format!("Student {}", cell_text(Some(&student.id))),
    }
}

#[derive(Default)]
struct StudentsState {
    selected: Option<String>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct StudentsInner {
    toggle: ViewToggle,
    table: DataTable,
    state: Mutex<StudentsState>,
}

#[derive(Default)]
pub struct StudentsView {
    inner: Arc<StudentsInner>,
}

impl StudentsView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Description of the student last fetched by id.
    #[must_use]
    pub fn selected(&self) -> Option<String> {
        self.inner.lock().selected.clone()
    }

    #[must_use]
    pub fn table(&self) -> &DataTable {
        &self.inner.table
    }
}

impl Component for StudentsView {
    fn tag_name(&self) -> &str {
        TAG
    }

    fn connected(&self, ctx: &AppContext) {
        if !self.inner.lock().subscriptions.is_empty() {
            return;
        }

        let list = {
            let weak = Arc::downgrade(&self.inner);
            let bus = ctx.bus.clone();
            ctx.bus.subscribe(STUDENTS_READY, move |event| {
                if let (Some(inner), Some(detail)) = (weak.upgrade(), event.payload.as_json()) {
                    inner.show_students(&bus, detail);
                }
            })
        };
        let single = {
            let weak = Arc::downgrade(&self.inner);
            ctx.bus.subscribe(STUDENT_READY, move |event| {
                if let (Some(inner), Some(detail)) = (weak.upgrade(), event.payload.as_json()) {
                    inner.show_student(detail);
                }
            })
        };
        self.inner.lock().subscriptions = vec![list, single];

        super::register_children(ctx, CHILDREN);

        if let Some(detail) = ctx.bus.last_json(STUDENTS_READY) {
            self.inner.show_students(&ctx.bus, &detail);
        }

        self.inner.toggle.connected(ctx);
    }

    fn disconnected(&self) {
        let subscriptions = std::mem::take(&mut self.inner.lock().subscriptions);
        drop(subscriptions);
        self.inner.toggle.disconnected();
    }

    fn render(&self) -> String {
        let mut parts = vec![self.inner.toggle.render()];
        if !self.inner.table.columns().is_empty() {
            parts.push("Students".to_owned());
            parts.push(self.inner.table.render());
        }
        if let Some(selected) = self.selected() {
            parts.push(selected);
        }
        parts.join("\n")
    }

    fn select(&self, row: usize) -> bool {
        self.inner.table.click_row(row)
    }
}

impl StudentsInner {
    fn lock(&self) -> MutexGuard<'_, StudentsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show_students(self: &Arc<Self>, bus: &EventBus, detail: &Value) {
        let students = match parse_students(detail) {
            Ok(students) => students,
            Err(e) => {
                warn!(event = STUDENTS_READY, error = %e, "unexpected students payload");
                return;
            }
        };

        let rows = students
            .iter()
            .map(|student| {
                let mut row = Row::new();
                row.insert("id".to_owned(), student.id.clone());
                row.insert("name".to_owned(), student.name.clone().map_or(Value::Null, Value::from));
                row
            })
            .collect();

        let weak: Weak<Self> = Arc::downgrade(self);
        let bus = bus.clone();
        self.table.set_rows(&STUDENT_COLUMNS, rows, move |row| {
            if weak.upgrade().is_some() {
                request_student(&bus, row);
            }
        });
    }

    fn show_student(&self, detail: &Value) {
        match serde_json::from_value::<Student>(detail.clone()) {
            Ok(student) => self.lock().selected = Some(describe(&student)),
            Err(e) => warn!(event = STUDENT_READY, error = %e, "unexpected student payload"),
        }
    }
}

fn request_student(bus: &EventBus, row: &Row) {
    let Some(student_id) = row.get("id").and_then(Value::as_u64) else {
        warn!(row = ?row, "student row without a numeric id");
        return;
    };
    info!(student_id, "student selected");
    bus.publish(&Request::Student { student_id }.to_event());
}
