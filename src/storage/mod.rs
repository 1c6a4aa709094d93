// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL storage layer.
//!
//! One `AnyPool` serves both SQLite and MySQL. The few places where the two
//! dialects differ (string concatenation, insert-ignore, `RETURNING`) are
//! answered by [`Dialect`]; everything else is portable SQL.
//!
//! ## sqlx Any Driver Quirks
//!
//! JSON is stored in TEXT/LONGTEXT because the `Any` driver has no JSON type
//! mapping, and MySQL TEXT arrives as bytes. See [`rows::get_text`].

pub mod references;
pub mod rows;
pub mod schema;

use sqlx::{any::AnyPoolOptions, AnyPool};
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::metrics;
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("sqlite:") {
            Dialect::Sqlite
        } else {
            Dialect::MySql
        }
    }

    /// SQL expression concatenating two string expressions.
    pub fn concat(&self, a: &str, b: &str) -> String {
        match self {
            Dialect::Sqlite => format!("({} || {})", a, b),
            Dialect::MySql => format!("CONCAT({}, {})", a, b),
        }
    }

    pub fn insert_ignore(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "INSERT OR IGNORE",
            Dialect::MySql => "INSERT IGNORE",
        }
    }

    /// Whether multi-row INSERT can hand back generated ids directly.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Dialect::Sqlite)
    }

    /// Suffix for element DELETEs that removes deeper paths first. InnoDB
    /// refuses self-referencing cascades deeper than 15 levels.
    pub fn children_first(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "",
            Dialect::MySql => " ORDER BY LENGTH(idshort_path) DESC",
        }
    }
}

/// Open the pool with startup-mode retry and make sure the schema exists.
pub async fn connect(config: &StoreConfig) -> Result<(AnyPool, Dialect), StoreError> {
    install_drivers();

    let dialect = Dialect::from_url(&config.sql_url);
    let started = Instant::now();

    let pool = retry("sql_connect", &RetryConfig::startup(), || async {
        AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if dialect == Dialect::Sqlite {
                        // Cascades depend on it; it is per connection.
                        sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                        sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect(&config.sql_url)
            .await
    })
    .await
    .map_err(|e| StoreError::internal("sql_connect", e))?;
    metrics::record_startup_phase("connect", started.elapsed());

    if dialect == Dialect::Sqlite && config.enable_wal {
        enable_wal_mode(&pool).await?;
    }

    let started = Instant::now();
    init_schema(&pool, dialect).await?;
    metrics::record_startup_phase("schema", started.elapsed());

    info!(?dialect, "Submodel store connected");
    Ok((pool, dialect))
}

/// Enable WAL (Write-Ahead Logging) mode for SQLite.
///
/// Readers no longer block the single writer, which the fan-out relies on.
async fn enable_wal_mode(pool: &AnyPool) -> Result<(), StoreError> {
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await
        .map_err(|e| StoreError::internal("Failed to enable WAL mode", e))?;

    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(pool)
        .await
        .map_err(|e| StoreError::internal("Failed to set synchronous mode", e))?;

    Ok(())
}

async fn init_schema(pool: &AnyPool, dialect: Dialect) -> Result<(), StoreError> {
    for sql in schema::statements(dialect) {
        retry("sql_init_schema", &RetryConfig::startup(), || async { sqlx::query(sql).execute(pool).await })
            .await
            .map_err(|e| StoreError::internal("sql_init_schema", e))?;
    }
    debug!(?dialect, "Schema ready");
    Ok(())
}
