use axum::{extract::State, response::Json};

use crate::api::AppState;
use crate::auth::CurrentUser;
use crate::finance::LandingStats;
use crate::metrics::PerformanceMetrics;

/// Public, cached counters. No authentication.
pub async fn landing(State(state): State<AppState>) -> Json<LandingStats> {
    Json(state.landing.get().await)
}

pub async fn performance(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> Json<PerformanceMetrics> {
    Json(state.metrics.performance().await)
}
