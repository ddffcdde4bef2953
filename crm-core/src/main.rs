use crm_core::api::{create_router, AppState};
use crm_core::clock::{Clock, SystemClock};
use crm_core::config::{Config, StoreBackend};
use crm_core::store::{MemoryStore, PgStore, Stores};
use crm_core::worker::TaskReaper;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{info, warn};

async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match config.backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
            let store = PgStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            info!("Connected to PostgreSQL");
            Ok(Stores::postgres(store))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            Ok(Stores::memory(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();
    crm_core::init_tracing();

    info!("Starting CRM Core Server...");

    let config = Config::from_env()?;
    let stores = open_stores(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::from_config(&config, stores.clone(), clock.clone());

    if let Some(seed) = &config.admin_seed {
        state.auth.seed_admin(seed).await?;
    }

    let reaper = TaskReaper::new(stores.tasks.clone(), clock, config.reaper_interval_seconds);
    tokio::spawn(async move { reaper.start().await });

    let app = create_router(state, config.cors_origin.as_deref());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}:{}: {}", config.host, config.port, e))?;

    info!("Server listening on {}:{}", config.host, config.port);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
