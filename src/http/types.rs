use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::todo_controller::{FailureKind, OperationError};
use crate::domain::todo::Todo;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self { Self { status, message: message.into() } }
    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, message) }
    pub fn not_found() -> Self { Self::new(StatusCode::NOT_FOUND, "Not found") }
}

impl From<OperationError> for ApiError {
    fn from(e: OperationError) -> Self {
        let status = match e.kind {
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::InvalidInput => StatusCode::BAD_REQUEST,
            FailureKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::Other => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response { (self.status, axum::Json(self)).into_response() }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TodoView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub is_completed: bool,
    pub priority: i64,
    pub priority_label: String,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<&Todo> for TodoView {
    fn from(t: &Todo) -> Self {
        Self {
            id: t.id.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
            is_completed: t.is_completed,
            priority: t.priority,
            priority_label: t.priority_tier().label().to_string(),
            created_at: t.created_at,
            due_date: t.due_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Option<i64>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    pub priority: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub is_completed: bool,
}
