//! Small-business CRM core: leads, clients and payments, expenses,
//! financial reporting and a per-user daily task board, served over a JSON
//! API.

pub mod api;
pub mod auth;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod error;
pub mod finance;
pub mod metrics;
pub mod models;
pub mod store;
pub mod tasks;
pub mod worker;

pub use error::{CrmError, CrmResult};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global `tracing` subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}
