//! Startup connections to Postgres and Redis, retried with backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use eyre::{Result, WrapErr};
use redis::aio::ConnectionManager;
use core_config::database::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{info, warn};

const CONNECT_ATTEMPTS: u32 = 5;
const INITIAL_DELAY_MS: u64 = 200;
const MAX_DELAY_MS: u64 = 5_000;

/// Run `operation` up to `attempts` times, doubling the pause between tries.
pub async fn with_retry<F, Fut, T, E>(service: &str, attempts: u32, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(service, attempt, delay_ms, error = %e, "Connection failed, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
                attempt += 1;
            }
        }
    }
}

pub async fn connect_redis(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).wrap_err("Invalid Redis URL")?;

    info!("Connecting to Redis...");
    let manager = with_retry("redis", CONNECT_ATTEMPTS, || ConnectionManager::new(client.clone()))
        .await
        .wrap_err("Failed to connect to Redis")?;
    info!("Connected to Redis successfully");

    Ok(manager)
}

pub async fn connect_postgres(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .sqlx_logging(false);

    info!(max_connections = config.max_connections, "Connecting to PostgreSQL...");
    let db = with_retry("postgres", CONNECT_ATTEMPTS, || Database::connect(options.clone()))
        .await
        .wrap_err("Failed to connect to PostgreSQL")?;
    info!("Connected to PostgreSQL successfully");

    Ok(db)
}
