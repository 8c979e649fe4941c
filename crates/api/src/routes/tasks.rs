//! Read-only view of the background task queue.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use stock_ledger::StockLedger;
use task_queue::{TaskId, TaskRecord, TaskStatus};

use crate::error::ApiError;
use crate::routes::parse_id;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskParams {
    /// Defaults to `dead`, the tasks an operator has to look at.
    pub status: Option<String>,
}

/// GET /tasks?status=dead
#[tracing::instrument(skip(state))]
pub async fn list<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Query(params): Query<TaskParams>,
) -> Result<Json<Vec<TaskRecord>>, ApiError> {
    let status = match params.status {
        Some(raw) => parse_id::<TaskStatus>(&raw, "status")?,
        None => TaskStatus::Dead,
    };
    Ok(Json(state.queue.with_status(status).await?))
}

/// GET /tasks/{id}
#[tracing::instrument(skip(state))]
pub async fn get<L: StockLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Path(id): Path<String>,
) -> Result<Json<TaskRecord>, ApiError> {
    let id = TaskId::from_uuid(parse_id(&id, "task id")?);
    state
        .queue
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Task {id} not found")))
}
