use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{info, warn};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Open the database with bounded connect retry and run embedded migrations.
/// Exhausting the retries is an unrecoverable startup failure.
pub async fn connect(url: &str, max_retries: u32, retry_delay_ms: u64) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("invalid database url '{url}'"))?
        .create_if_missing(true);

    let mut attempt = 0u32;
    let pool = loop {
        attempt += 1;
        // SQLite serialises writers; a pool of one also keeps in-memory
        // databases coherent across handles.
        match SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => break pool,
            Err(e) if attempt <= max_retries => {
                warn!(error = %e, attempt, "database connect failed, retrying");
                tokio::time::sleep(Duration::from_millis(retry_delay_ms * u64::from(attempt)))
                    .await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("database unreachable after {attempt} attempts")
                });
            }
        }
    };

    MIGRATOR
        .run(&pool)
        .await
        .context("database migration failed")?;

    info!(url, "database ready");
    Ok(pool)
}
