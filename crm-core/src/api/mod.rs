//! HTTP surface: shared state, router and handlers.

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{delete, get, patch, post, put},
    Router,
};
use chrono::Duration;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::auth::{AuthService, JwtKeys};
use crate::calendar::BusinessCalendar;
use crate::clock::Clock;
use crate::config::Config;
use crate::finance::{FinanceService, LandingCache};
use crate::metrics::MetricsService;
use crate::store::Stores;
use crate::tasks::TaskBoard;

pub mod auth;
pub mod clients;
pub mod expenses;
pub mod leads;
pub mod stats;
pub mod tasks;


/// Application state shared by every handler.
///
/// Cloning is cheap: stores and services hold `Arc`s.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub calendar: BusinessCalendar,
    pub clock: Arc<dyn Clock>,
    pub auth: AuthService,
    pub finance: FinanceService,
    pub landing: Arc<LandingCache>,
    pub metrics: MetricsService,
    pub tasks: TaskBoard,
}

impl AppState {
    /// Wires the services around one set of stores.
    ///
    /// # Arguments
    ///
    /// * `stores` - Backing stores, Postgres or in-memory
    /// * `calendar` - Business timezone used for every day/week/month window
    /// * `clock` - Shared source of "now"
    /// * `keys` - JWT signing keys
    /// * `landing_ttl` - How long landing statistics are served from cache
    pub fn new(
        stores: Stores,
        calendar: BusinessCalendar,
        clock: Arc<dyn Clock>,
        keys: JwtKeys,
        landing_ttl: Duration,
    ) -> Self {
        AppState {
            auth: AuthService::new(stores.users.clone(), keys, clock.clone()),
            finance: FinanceService::new(stores.clone(), calendar),
            landing: Arc::new(LandingCache::new(
                stores.clone(),
                calendar,
                clock.clone(),
                landing_ttl,
            )),
            metrics: MetricsService::new(stores.leads.clone(), calendar, clock.clone()),
            tasks: TaskBoard::new(stores.tasks.clone(), calendar, clock.clone()),
            stores,
            calendar,
            clock,
        }
    }

    pub fn from_config(config: &Config, stores: Stores, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            stores,
            BusinessCalendar::new(config.business_timezone),
            clock,
            JwtKeys::new(&config.jwt_secret, config.jwt_ttl_hours),
            Duration::seconds(config.landing_cache_ttl_seconds),
        )
    }
}

/// Health check endpoint.
///
/// Returns a simple JSON response indicating the server is running.
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "crm-core",
        "backend": state.stores.backend_name(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Database health check endpoint.
async fn db_health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    state.stores.ping().await.map_err(|e| {
        error!("Database health check failed: {}", e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "database": "connected"
    })))
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(_)) => {
            warn!("Ignoring invalid CORS_ORIGIN, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

/// Creates the main application router.
///
/// Mounts the health checks and every `/api` route, then layers request
/// tracing and CORS on top.
///
/// # Arguments
///
/// * `state` - Shared application state
/// * `cors_origin` - Allowed browser origin; `None` allows any origin
///
/// # Returns
///
/// Returns a configured Axum Router.
pub fn create_router(state: AppState, cors_origin: Option<&str>) -> Router {
    Router::new()
        // Public routes
        .route("/health", get(health_check))
        .route("/health/db", get(db_health_check))
        .route("/api/auth/login", post(auth::login))
        .route("/api/stats/landing", get(stats::landing))
        // Authenticated routes; handlers extract `CurrentUser` / `RequireAdmin`
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/verify", get(auth::verify))
        .route("/api/leads", get(leads::list).post(leads::create))
        .route("/api/leads/followups", get(leads::follow_ups))
        .route("/api/leads/:id", put(leads::update).delete(leads::remove))
        .route("/api/clients", get(clients::list).post(clients::create))
        .route("/api/clients/stats", get(clients::stats))
        .route("/api/clients/:id", put(clients::update).delete(clients::remove))
        .route("/api/clients/:id/payment", post(clients::add_payment))
        .route("/api/expenses", get(expenses::list).post(expenses::create))
        .route("/api/expenses/summary", get(expenses::summary))
        .route(
            "/api/expenses/monthly-report/:year/:month",
            get(expenses::monthly_report),
        )
        .route(
            "/api/expenses/:id",
            put(expenses::update).delete(expenses::remove),
        )
        .route("/api/tasks", post(tasks::create))
        .route("/api/tasks/today", get(tasks::list_today))
        .route(
            "/api/tasks/today/clear-completed",
            delete(tasks::clear_completed),
        )
        .route("/api/tasks/:id/toggle", patch(tasks::toggle))
        .route("/api/tasks/:id", delete(tasks::remove))
        .route("/api/metrics/performance", get(stats::performance))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origin))
        .with_state(state)
}
