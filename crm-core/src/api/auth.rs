use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};

use crate::api::AppState;
use crate::auth::{CurrentUser, RequireAdmin};
use crate::error::CrmResult;
use crate::models::user::{AuthResponse, LoginRequest, RegisterUser};

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> CrmResult<Json<AuthResponse>> {
    Ok(Json(state.auth.login(request).await?))
}

/// Account creation is reserved for administrators.
pub async fn register(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Json(request): Json<RegisterUser>,
) -> CrmResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn verify(State(state): State<AppState>, caller: CurrentUser) -> CrmResult<Json<Value>> {
    let user = state.auth.verify(caller).await?;
    Ok(Json(json!({ "user": user })))
}
