use crm_core::clock::SystemClock;
use crm_core::config::{Config, StoreBackend};
use crm_core::store::PgStore;
use crm_core::worker::TaskReaper;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Standalone task reaper.
///
/// Useful when the API runs with several replicas and only one process
/// should sweep expired tasks. Only meaningful against Postgres.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    crm_core::init_tracing();

    info!("Starting CRM task reaper worker...");

    let config = Config::from_env()?;
    if config.backend != StoreBackend::Postgres {
        warn!("The reaper worker needs STORE_BACKEND=postgres; nothing to do");
        return Ok(());
    }
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

    let store = PgStore::connect(database_url, config.max_connections).await?;
    store.migrate().await?;

    let reaper = Arc::new(TaskReaper::new(
        Arc::new(store),
        Arc::new(SystemClock),
        config.reaper_interval_seconds,
    ));

    let runner = reaper.clone();
    let handle = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            reaper.stop().await;
        }
        _ = handle => {
            info!("Reaper task completed");
        }
    }

    info!("CRM task reaper worker stopped");
    Ok(())
}
