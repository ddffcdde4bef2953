use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::error::CrmResult;
use crate::models::task::CreateTask;
use crate::models::Task;
use crate::tasks::{TaskStatusFilter, TodayTasks};

#[derive(Debug, Default, Deserialize)]
pub struct TodayQuery {
    pub status: Option<String>,
}

pub async fn list_today(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(query): Query<TodayQuery>,
) -> CrmResult<Json<TodayTasks>> {
    let filter = TaskStatusFilter::parse(query.status.as_deref())?;
    Ok(Json(state.tasks.list_today(caller.id, filter).await?))
}

pub async fn create(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<CreateTask>,
) -> CrmResult<(StatusCode, Json<Task>)> {
    let task = state.tasks.create(caller.id, request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn toggle(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> CrmResult<Json<Task>> {
    Ok(Json(state.tasks.toggle(id, caller.id).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> CrmResult<Json<Value>> {
    state.tasks.delete(id, caller.id).await?;
    Ok(Json(json!({ "message": "Task deleted" })))
}

pub async fn clear_completed(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> CrmResult<Json<Value>> {
    let deleted = state.tasks.clear_completed(caller.id).await?;
    Ok(Json(json!({ "message": "Cleared", "deleted": deleted })))
}
