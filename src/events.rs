//! Domain event contract shared by the broker, router and views.
//!
//! DESIGN
//! ======
//! Two disjoint families, distinguished by name:
//! - request events (`request*`) are published by views that need data;
//! - ready events (`eb-*`) are published by the broker with fetched JSON.
//!
//! [`Request`] is the typed form of a request event. It knows its endpoint,
//! the ready event it produces, the hash it navigates to, and which
//! identifier has to be carried over into the ready payload.

#[cfg(test)]
#[path = "events_test.rs"]
mod events_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::DomainEvent;

// =============================================================================
// EVENT NAMES
// =============================================================================

pub const REQUEST_EXAMS: &str = "requestExamsData";
pub const REQUEST_STUDENTS: &str = "requestStudentsData";
pub const REQUEST_EXAM_RESULTS: &str = "requestExamResultsById";
pub const REQUEST_STUDENT: &str = "requestStudentById";

pub const EXAMS_READY: &str = "eb-examsData";
pub const STUDENTS_READY: &str = "eb-requestStudentsData";
pub const EXAM_RESULTS_READY: &str = "eb-examResults";
pub const STUDENT_READY: &str = "eb-studentById";

/// Published by the router with the freshly constructed view.
pub const ROUTER_UPDATE: &str = "router-update";

/// All request event names the broker listens to.
pub const REQUEST_EVENTS: [&str; 4] = [REQUEST_EXAMS, REQUEST_STUDENTS, REQUEST_EXAM_RESULTS, REQUEST_STUDENT];

/// Payload key carrying an exam identifier.
pub const EXAM_ID: &str = "examId";

/// Payload key carrying a student identifier.
pub const STUDENT_ID: &str = "studentId";

/// Record identifier. Numeric ids are always safe as a URL path segment.
pub type RecordId = u64;

// =============================================================================
// RESOURCES
// =============================================================================

/// Remote collection served by the API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Exams,
    Students,
}

impl Resource {
    /// Path segment under the API base URL.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Exams => "exams",
            Self::Students => "students",
        }
    }
}

// =============================================================================
// REQUESTS
// =============================================================================

/// A typed data request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// `GET {base}/exams`
    Exams,
    /// `GET {base}/students`
    Students,
    /// `GET {base}/exams/{id}`
    ExamResults { exam_id: RecordId },
    /// `GET {base}/students/{id}`
    Student { student_id: RecordId },
}

impl Request {
    /// Collection request for `resource`.
    #[must_use]
    pub fn all(resource: Resource) -> Self {
        match resource {
            Resource::Exams => Self::Exams,
            Resource::Students => Self::Students,
        }
    }

    /// Single-record request for `resource`.
    #[must_use]
    pub fn by_id(resource: Resource, id: RecordId) -> Self {
        match resource {
            Resource::Exams => Self::ExamResults { exam_id: id },
            Resource::Students => Self::Student { student_id: id },
        }
    }

    #[must_use]
    pub fn resource(self) -> Resource {
        match self {
            Self::Exams | Self::ExamResults { .. } => Resource::Exams,
            Self::Students | Self::Student { .. } => Resource::Students,
        }
    }

    /// Endpoint URL under `base` (no trailing slash expected).
    #[must_use]
    pub fn url(self, base: &str) -> String {
        let path = self.resource().path();
        match self {
            Self::Exams | Self::Students => format!("{base}/{path}"),
            Self::ExamResults { exam_id: id } | Self::Student { student_id: id } => {
                format!("{base}/{path}/{id}")
            }
        }
    }

    /// Name of the request event that carries this request.
    #[must_use]
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Exams => REQUEST_EXAMS,
            Self::Students => REQUEST_STUDENTS,
            Self::ExamResults { .. } => REQUEST_EXAM_RESULTS,
            Self::Student { .. } => REQUEST_STUDENT,
        }
    }

    /// Name of the ready event published when this request succeeds.
    #[must_use]
    pub fn ready_event(self) -> &'static str {
        match self {
            Self::Exams => EXAMS_READY,
            Self::Students => STUDENTS_READY,
            Self::ExamResults { .. } => EXAM_RESULTS_READY,
            Self::Student { .. } => STUDENT_READY,
        }
    }

    /// View destination this request navigates to after a successful fetch.
    #[must_use]
    pub fn destination_hash(self) -> Option<String> {
        match self {
            Self::Exams => Some("#/exams".to_owned()),
            Self::Students => Some("#/students".to_owned()),
            Self::ExamResults { exam_id } => Some(format!("#/exams/{exam_id}")),
            Self::Student { .. } => None,
        }
    }

    /// Identifier that must survive into the ready payload, with its key.
    #[must_use]
    pub fn carried_id(self) -> Option<(&'static str, RecordId)> {
        match self {
            Self::Exams | Self::Students => None,
            Self::ExamResults { exam_id } => Some((EXAM_ID, exam_id)),
            Self::Student { student_id } => Some((STUDENT_ID, student_id)),
        }
    }

    /// Build the request event for publishing on the bus.
    #[must_use]
    pub fn to_event(self) -> DomainEvent {
        match self.carried_id() {
            None => DomainEvent::empty(self.event_name()),
            Some((key, id)) => {
                let mut detail = serde_json::Map::new();
                detail.insert(key.to_owned(), Value::from(id));
                DomainEvent::json(self.event_name(), Value::Object(detail))
            }
        }
    }

    /// Parse a request event. Returns `None` for non-request events and for
    /// by-id requests whose detail has no usable identifier.
    #[must_use]
    pub fn from_event(event: &DomainEvent) -> Option<Self> {
        let id = |key: &str| event.payload.as_json().and_then(|v| v.get(key)).and_then(Value::as_u64);
        match event.name.as_str() {
            REQUEST_EXAMS => Some(Self::Exams),
            REQUEST_STUDENTS => Some(Self::Students),
            REQUEST_EXAM_RESULTS => id(EXAM_ID).map(|exam_id| Self::ExamResults { exam_id }),
            REQUEST_STUDENT => id(STUDENT_ID).map(|student_id| Self::Student { student_id }),
            _ => None,
        }
    }
}

// =============================================================================
// PAYLOAD MODELS
// =============================================================================

/// One exam row from `GET /exams`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamData {
    pub id: Value,
    pub student_count: u64,
    pub average: f64,
}

/// Body of `eb-examsData`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExamsDetail {
    pub exams: Vec<ExamData>,
}

/// One score inside an exam's results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub student_id: Value,
    pub score: f64,
}

/// Body of `eb-examResults`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResultDetail {
    pub results: Vec<StudentResult>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub exam_id: Option<Value>,
}

/// A student record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Value,
    #[serde(default)]
    pub name: Option<String>,
}
