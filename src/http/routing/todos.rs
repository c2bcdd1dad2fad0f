use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;

use crate::application::{shared_list::ListSubscription, todo_controller::TodoController, ui_state::UiState};
use crate::domain::{repository::TodoRepository, todo::Todo};
use crate::http::types::{ApiError, CreateBody, StatusBody, TodoView, UpdateBody};

// How long a read waits for a restarted list to deliver its first snapshot.
const RESTART_WAIT: Duration = Duration::from_millis(500);

/// Router state. Holds one subscription to each shared list for as long as
/// the router lives, the way a visible screen would. Reads restart a list
/// whose listener has failed.
pub struct AppState<R: TodoRepository> {
    pub controller: TodoController<R>,
    all: Arc<ListSubscription>,
    pending: Arc<ListSubscription>,
}

impl<R: TodoRepository> AppState<R> {
    /// Must be called from within a tokio runtime.
    pub fn new(controller: TodoController<R>) -> Self {
        let all = Arc::new(controller.todo_list());
        let pending = Arc::new(controller.pending_todos());
        Self { controller, all, pending }
    }

    async fn all_todos(&self) -> Vec<Todo> { self.all.refresh(RESTART_WAIT).await }

    async fn cached(&self, id: &str) -> Option<Todo> {
        self.all_todos().await.into_iter().find(|t| t.id == id)
    }
}

impl<R: TodoRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self { controller: self.controller.clone(), all: self.all.clone(), pending: self.pending.clone() }
    }
}

pub fn router<R: TodoRepository>(state: AppState<R>) -> Router {
    Router::new()
        .route("/todos", post(create_todo::<R>).get(list_todos::<R>))
        .route("/todos/pending", get(list_pending::<R>))
        .route("/todos/:id", put(update_todo::<R>).delete(delete_todo::<R>))
        .route("/todos/:id/status", patch(update_status::<R>))
        .route("/status", get(ui_state::<R>))
        .route("/diagnostics/round-trip", post(round_trip::<R>))
        .with_state(state)
}

fn items(todos: &[Todo]) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "items": todos.iter().map(TodoView::from).collect::<Vec<_>>() }))
}

async fn list_todos<R: TodoRepository>(State(state): State<AppState<R>>) -> Json<serde_json::Value> {
    items(&state.all_todos().await)
}

async fn list_pending<R: TodoRepository>(State(state): State<AppState<R>>) -> Json<serde_json::Value> {
    items(&state.pending.refresh(RESTART_WAIT).await)
}

async fn ui_state<R: TodoRepository>(State(state): State<AppState<R>>) -> Json<UiState> {
    Json(state.controller.current_state())
}

async fn create_todo<R: TodoRepository>(
    State(state): State<AppState<R>>,
    Json(payload): Json<CreateBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let priority = payload.priority.unwrap_or(1);
    let Some(op) = state.controller.add_todo(&payload.title, &payload.description, priority, payload.due_date) else {
        return Err(ApiError::bad_request("title must not be blank"));
    };
    let id = op.await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn update_todo<R: TodoRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBody>,
) -> Result<StatusCode, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::bad_request("title must not be blank"));
    }
    let created_at = match payload.created_at {
        Some(at) => at,
        None => state.cached(&id).await.map_or_else(Utc::now, |t| t.created_at),
    };
    let todo = Todo {
        id,
        title: payload.title,
        description: payload.description,
        is_completed: payload.is_completed,
        priority: payload.priority.unwrap_or(1),
        created_at,
        due_date: payload.due_date,
    };
    state.controller.update_todo(&todo).await?;
    Ok(StatusCode::OK)
}

async fn update_status<R: TodoRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
    Json(payload): Json<StatusBody>,
) -> Result<StatusCode, ApiError> {
    let todo = state.cached(&id).await.ok_or_else(ApiError::not_found)?;
    state.controller.update_todo_status(&todo, payload.is_completed).await?;
    Ok(StatusCode::OK)
}

async fn delete_todo<R: TodoRepository>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    // Unknown ids are still deleted; the id stands in for the title.
    let todo = match state.cached(&id).await {
        Some(todo) => todo,
        None => Todo { title: id.clone(), id, ..Todo::default() },
    };
    state.controller.delete_todo(&todo).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn round_trip<R: TodoRepository>(State(state): State<AppState<R>>) -> Result<StatusCode, ApiError> {
    state.controller.test_store_connection().await?;
    Ok(StatusCode::OK)
}
