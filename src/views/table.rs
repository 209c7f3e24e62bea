//! `app-table`: column-defined table with clickable rows.
//!
//! Rows are JSON objects; each column names the key its cell is read from.
//! Exam rows show the average as a percentage. Result rows are ranked by
//! score (ties share a rank) and keep the order the API returned them in.

#[cfg(test)]
#[path = "table_test.rs"]
mod table_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use comfy_table::{ContentArrangement, Table};
use serde_json::{Map, Value};

use crate::events::{ExamData, StudentResult};
use crate::registry::Component;

pub const TAG: &str = "app-table";
pub const LOCATOR: &str = "/static/js/components/app-table/app-table.js";

/// Rendered when no columns have been set yet.
pub const PLACEHOLDER: &str = "Loading...";

/// One table row, keyed by column key.
pub type Row = Map<String, Value>;

type RowHandler = Arc<dyn Fn(&Row) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub key: &'static str,
    pub label: &'static str,
}

impl Column {
    #[must_use]
    pub const fn new(key: &'static str, label: &'static str) -> Self {
        Self { key, label }
    }
}

#[derive(Default)]
struct TableState {
    columns: Vec<Column>,
    rows: Vec<Row>,
    on_row_click: Option<RowHandler>,
}

#[derive(Default)]
pub struct DataTable {
    state: Mutex<TableState>,
}

impl DataTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace columns, rows and the row handler.
    pub fn set_rows<F>(&self, columns: &[Column], rows: Vec<Row>, on_row_click: F)
    where
        F: Fn(&Row) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.columns = columns.to_vec();
        state.rows = rows;
        state.on_row_click = Some(Arc::new(on_row_click));
    }

    /// Show the exams list with averages formatted as percentages.
    pub fn set_exams_data<F>(&self, columns: &[Column], exams: &[ExamData], on_row_click: F)
    where
        F: Fn(&Row) + Send + Sync + 'static,
    {
        let rows = exams
            .iter()
            .map(|exam| {
                let mut row = Row::new();
                row.insert("id".to_owned(), exam.id.clone());
                row.insert("average".to_owned(), Value::from(format_percent(exam.average)));
                row.insert("studentCount".to_owned(), Value::from(exam.student_count));
                row
            })
            .collect();
        self.set_rows(columns, rows, on_row_click);
    }

    /// Show one exam's results with a rank column, in the original order.
    pub fn set_exam_results_data<F>(&self, columns: &[Column], results: &[StudentResult], on_row_click: F)
    where
        F: Fn(&Row) + Send + Sync + 'static,
    {
        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let ranks = rank_by_score(&scores);
        let rows = results
            .iter()
            .zip(ranks)
            .map(|(result, rank)| {
                let mut row = Row::new();
                row.insert("studentId".to_owned(), result.student_id.clone());
                row.insert("score".to_owned(), Value::from(format_percent(result.score)));
                row.insert("rank".to_owned(), Value::from(rank));
                row
            })
            .collect();
        self.set_rows(columns, rows, on_row_click);
    }

    /// Run the row handler for row `index`. Returns `false` if there is no
    /// such row.
    pub fn click_row(&self, index: usize) -> bool {
        let (handler, row) = {
            let state = self.lock();
            let Some(row) = state.rows.get(index).cloned() else {
                return false;
            };
            (state.on_row_click.clone(), row)
        };
        if let Some(handler) = handler {
            handler(&row);
        }
        true
    }

    #[must_use]
    pub fn columns(&self) -> Vec<Column> {
        self.lock().columns.clone()
    }

    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.lock().rows.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }
}

impl Component for DataTable {
    fn tag_name(&self) -> &str {
        TAG
    }

    fn render(&self) -> String {
        let state = self.lock();
        if state.columns.is_empty() {
            return PLACEHOLDER.to_owned();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(state.columns.iter().map(|c| c.label));
        for row in &state.rows {
            table.add_row(state.columns.iter().map(|c| cell_text(row.get(c.key))));
        }
        table.to_string()
    }

    fn select(&self, row: usize) -> bool {
        self.click_row(row)
    }
}

// =============================================================================
// FORMATTING
// =============================================================================

/// `0.7312` → `"73.12%"`.
#[must_use]
pub fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

/// 1-based competition ranks for `scores`, highest first, in input order.
///
/// Equal scores share a rank and the next lower score skips ahead
/// (`[0.9, 0.8, 0.9]` → `[1, 3, 1]`).
#[must_use]
pub fn rank_by_score(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ranks = vec![0; scores.len()];
    let mut rank = 1;
    for (pos, &idx) in order.iter().enumerate() {
        if pos > 0 && scores[idx] < scores[order[pos - 1]] {
            rank = pos + 1;
        }
        ranks[idx] = rank;
    }
    ranks
}

/// Display text for a cell. Strings render unquoted, missing values blank.
#[must_use]
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
