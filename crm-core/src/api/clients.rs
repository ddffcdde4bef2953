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
use crate::auth::{CurrentUser, RequireAdmin};
use crate::error::CrmResult;
use crate::models::client::{AddPayment, ClientFilter};
use crate::models::{parse_filter, Client, ClientStats, CreateClient, UpdateClient};
use crate::store::OwnerScope;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientQuery {
    pub delivery_status: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Non-admins only see the clients they created.
pub async fn list(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(query): Query<ClientQuery>,
) -> CrmResult<Json<Vec<Client>>> {
    let filter = ClientFilter {
        delivery_status: parse_filter(query.delivery_status.as_deref(), "deliveryStatus")?,
        project_start: state
            .calendar
            .range(query.start_date.as_deref(), query.end_date.as_deref())?,
    };
    Ok(Json(state.stores.clients.list(&filter, caller.scope()).await?))
}

/// Totals across every client, whoever created them.
pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> CrmResult<Json<ClientStats>> {
    let clients = state
        .stores
        .clients
        .list(&ClientFilter::default(), OwnerScope::All)
        .await?;
    Ok(Json(ClientStats::from_clients(&clients)))
}

pub async fn create(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(request): Json<CreateClient>,
) -> CrmResult<(StatusCode, Json<Client>)> {
    let client = Client::new(request, caller.id, state.clock.now())?;
    let client = state.stores.clients.insert(client).await?;
    info!("Client {} created by {}", client.id, caller.id);
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateClient>,
) -> CrmResult<Json<Client>> {
    let client = state
        .stores
        .clients
        .update(id, caller.scope(), patch, state.clock.now())
        .await?;
    info!("Client {} updated by {}", id, caller.id);
    Ok(Json(client))
}

pub async fn add_payment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payment): Json<AddPayment>,
) -> CrmResult<Json<Client>> {
    let amount = payment.amount;
    let client = state
        .stores
        .clients
        .add_payment(id, caller.scope(), payment, caller.id, state.clock.now())
        .await?;
    info!(
        "Payment of {} recorded on client {} by {}; remaining {}",
        amount, id, caller.id, client.remaining_amount
    );
    Ok(Json(client))
}

pub async fn remove(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<Uuid>,
) -> CrmResult<Json<Value>> {
    state.stores.clients.delete(id, caller.scope()).await?;
    info!("Client {} deleted by {}", id, caller.id);
    Ok(Json(json!({ "message": "Client deleted successfully" })))
}
