//! `app-exams-view`: exam list with drill-down into one exam's results.
//!
//! Listens for `eb-examsData` (the list) and `eb-examResults` (one exam's
//! scores). Picking a row of the list publishes `requestExamResultsById`;
//! the broker fetches and moves the hash to `#/exams/{id}`, which no route
//! matches, so this view stays mounted and shows the results.

#[cfg(test)]
#[path = "exams_test.rs"]
mod exams_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::bus::{EventBus, Subscription};
use crate::events::{EXAM_RESULTS_READY, EXAMS_READY, ExamResultDetail, ExamsDetail, Request};
use crate::registry::Component;
use crate::views::table::{self, Column, DataTable, Row, cell_text, format_percent};
use crate::views::toggle::{self, ViewToggle};

pub const TAG: &str = "app-exams-view";
pub const LOCATOR: &str = "/static/js/components/views/app-exams-view.js";

const CHILDREN: &[(&str, &str)] = &[(toggle::TAG, toggle::LOCATOR), (table::TAG, table::LOCATOR)];

const EXAM_COLUMNS: [Column; 3] = [
    Column::new("id", "Exam ID"),
    Column::new("average", "Avg Exam Grade"),
    Column::new("studentCount", "Students"),
];

const RESULT_COLUMNS: [Column; 3] = [
    Column::new("studentId", "Student Name"),
    Column::new("score", "Grade"),
    Column::new("rank", "Rank"),
];

#[derive(Default)]
struct ExamsState {
    heading: String,
    average: Option<String>,
    exam_id: Option<Value>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct ExamsInner {
    toggle: ViewToggle,
    table: DataTable,
    state: Mutex<ExamsState>,
}

#[derive(Default)]
pub struct ExamsView {
    inner: Arc<ExamsInner>,
}

impl ExamsView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `All Exams`, `Exam {id}`, or empty before any data arrived.
    #[must_use]
    pub fn heading(&self) -> String {
        self.inner.lock().heading.clone()
    }

    /// Average of the exam being shown, formatted as a percentage.
    #[must_use]
    pub fn average(&self) -> Option<String> {
        self.inner.lock().average.clone()
    }

    /// Exam last picked or shown.
    #[must_use]
    pub fn exam_id(&self) -> Option<Value> {
        self.inner.lock().exam_id.clone()
    }

    #[must_use]
    pub fn table(&self) -> &DataTable {
        &self.inner.table
    }

    #[must_use]
    pub fn toggle(&self) -> &ViewToggle {
        &self.inner.toggle
    }
}

impl Component for ExamsView {
    fn tag_name(&self) -> &str {
        TAG
    }

    fn connected(&self, ctx: &AppContext) {
        if !self.inner.lock().subscriptions.is_empty() {
            return;
        }

        let exams = {
            let weak = Arc::downgrade(&self.inner);
            let bus = ctx.bus.clone();
            ctx.bus.subscribe(EXAMS_READY, move |event| {
                if let (Some(inner), Some(detail)) = (weak.upgrade(), event.payload.as_json()) {
                    inner.show_exams(&bus, detail);
                }
            })
        };
        let results = {
            let weak = Arc::downgrade(&self.inner);
            ctx.bus.subscribe(EXAM_RESULTS_READY, move |event| {
                if let (Some(inner), Some(detail)) = (weak.upgrade(), event.payload.as_json()) {
                    inner.show_results(detail);
                }
            })
        };
        self.inner.lock().subscriptions = vec![exams, results];

        super::register_children(ctx, CHILDREN);

        // The list may have been published before this instance mounted.
        if let Some(detail) = ctx.bus.last_json(EXAMS_READY) {
            self.inner.show_exams(&ctx.bus, &detail);
        }

        self.inner.toggle.connected(ctx);
    }

    fn disconnected(&self) {
        let subscriptions = std::mem::take(&mut self.inner.lock().subscriptions);
        drop(subscriptions);
        self.inner.toggle.disconnected();
    }

    fn render(&self) -> String {
        let (heading, average) = {
            let state = self.inner.lock();
            (state.heading.clone(), state.average.clone())
        };
        let mut parts = vec![self.inner.toggle.render()];
        if !heading.is_empty() {
            parts.push(heading);
        }
        if let Some(average) = average {
            parts.push(format!("Average {average}"));
        }
        parts.push(self.inner.table.render());
        parts.join("\n")
    }

    fn select(&self, row: usize) -> bool {
        self.inner.table.click_row(row)
    }
}

impl ExamsInner {
    fn lock(&self) -> MutexGuard<'_, ExamsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show_exams(self: &Arc<Self>, bus: &EventBus, detail: &Value) {
        let exams = match serde_json::from_value::<ExamsDetail>(detail.clone()) {
            Ok(parsed) => parsed.exams,
            Err(e) => {
                warn!(event = EXAMS_READY, error = %e, "unexpected exams payload");
                return;
            }
        };

        {
            let mut state = self.lock();
            state.heading = "All Exams".to_owned();
            state.average = None;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let bus = bus.clone();
        self.table.set_exams_data(&EXAM_COLUMNS, &exams, move |row| {
            if let Some(inner) = weak.upgrade() {
                inner.request_results(&bus, row);
            }
        });
    }

    fn request_results(&self, bus: &EventBus, row: &Row) {
        let Some(exam_id) = row.get("id").and_then(Value::as_u64) else {
            warn!(row = ?row, "exam row without a numeric id");
            return;
        };
        self.lock().exam_id = Some(Value::from(exam_id));
        info!(exam_id, "exam selected");
        bus.publish(&Request::ExamResults { exam_id }.to_event());
    }

    fn show_results(&self, detail: &Value) {
        let parsed = match serde_json::from_value::<ExamResultDetail>(detail.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(event = EXAM_RESULTS_READY, error = %e, "unexpected exam results payload");
                return;
            }
        };

        {
            let mut state = self.lock();
            state.average = parsed.average.map(format_percent);
            if parsed.exam_id.is_some() {
                state.exam_id = parsed.exam_id;
            }
            state.heading = format!("Exam {}", cell_text(state.exam_id.as_ref()));
        }

        self.table.set_exam_results_data(&RESULT_COLUMNS, &parsed.results, |row| {
            debug!(row = ?row, "result row selected");
        });
    }
}
