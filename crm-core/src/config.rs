use anyhow::{anyhow, Context};
use chrono_tz::Tz;
use std::env;
use std::str::FromStr;

/// Which persistence backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(anyhow!("Unknown STORE_BACKEND: {}", other)),
        }
    }
}

/// Credentials for the administrator account seeded at startup.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub business_timezone: Tz,
    pub landing_cache_ttl_seconds: i64,
    pub reaper_interval_seconds: u64,
    pub cors_origin: Option<String>,
    pub admin_seed: Option<AdminSeed>,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid {}: {}", name, e)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Call `dotenv().ok()` first if a `.env` file should be honoured.
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = parsed("STORE_BACKEND", StoreBackend::Postgres)?;
        let database_url = var("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL must be set when STORE_BACKEND=postgres"));
        }

        let tz_name = var("BUSINESS_TIMEZONE").unwrap_or_else(|| "Asia/Kolkata".to_string());
        let business_timezone = tz_name
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid BUSINESS_TIMEZONE {}: {}", tz_name, e))?;

        let admin_seed = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                name: var("ADMIN_NAME").unwrap_or_else(|| "Admin User".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set, using an insecure development secret");
            "secretkey".to_string()
        });

        Ok(Config {
            backend,
            database_url,
            max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("SERVER_PORT", 5000).context("SERVER_PORT")?,
            jwt_secret,
            jwt_ttl_hours: parsed("JWT_TTL_HOURS", 24 * 7)?,
            business_timezone,
            landing_cache_ttl_seconds: parsed("LANDING_CACHE_TTL_SECONDS", 60)?,
            reaper_interval_seconds: parsed("TASK_REAPER_INTERVAL_SECONDS", 60)?,
            cors_origin: var("CORS_ORIGIN"),
            admin_seed,
        })
    }
}
