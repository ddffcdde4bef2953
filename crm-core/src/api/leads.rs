use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::error::CrmResult;
use crate::models::lead::LeadFilter;
use crate::models::{parse_filter, CreateLead, Lead, UpdateLead};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadQuery {
    pub status: Option<String>,
    pub source: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    _caller: CurrentUser,
    Query(query): Query<LeadQuery>,
) -> CrmResult<Json<Vec<Lead>>> {
    let filter = LeadFilter {
        status: parse_filter(query.status.as_deref(), "status")?,
        source: parse_filter(query.source.as_deref(), "source")?,
        date: state
            .calendar
            .range(query.start_date.as_deref(), query.end_date.as_deref())?,
    };
    Ok(Json(state.stores.leads.list(&filter).await?))
}

/// Leads due for a call from the start of today onwards.
pub async fn follow_ups(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> CrmResult<Json<Vec<Lead>>> {
    let today = state.calendar.today(state.clock.now());
    let since = today.start.unwrap_or_else(|| state.clock.now());
    Ok(Json(state.stores.leads.follow_ups(since).await?))
}

pub async fn create(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<CreateLead>,
) -> CrmResult<(StatusCode, Json<Lead>)> {
    let lead = Lead::new(request, caller.id, state.clock.now())?;
    let lead = state.stores.leads.insert(lead).await?;
    info!("Lead {} created by {}", lead.id, caller.id);
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn update(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateLead>,
) -> CrmResult<Json<Lead>> {
    let lead = state.stores.leads.update(id, patch, state.clock.now()).await?;
    info!("Lead {} updated by {}", id, caller.id);
    Ok(Json(lead))
}

pub async fn remove(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> CrmResult<Json<Value>> {
    state.stores.leads.delete(id).await?;
    info!("Lead {} deleted by {}", id, caller.id);
    Ok(Json(json!({ "message": "Lead deleted successfully" })))
}
