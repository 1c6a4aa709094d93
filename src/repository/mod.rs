// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Submodel repository.
//!
//! The [`SubmodelRepository`] is the operation surface: it owns the pool, the
//! handler registry, the optional injected cache and the write permits, and
//! drives the engines inside one transaction per logical operation.
//!
//! # Write flow
//!
//! ```text
//! write permit → BEGIN → engines on &mut AnyConnection → COMMIT / ROLLBACK
//!                                                            │
//!                                          cache invalidate ◄┘ (after commit)
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use submodel_store::{SubmodelRepository, StoreConfig, Submodel};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let repo = SubmodelRepository::connect(StoreConfig::sqlite("/tmp/aas.db"))
//!     .await
//!     .expect("connect failed");
//!
//! repo.create_submodel(Submodel::new("urn:sm:1")).await.expect("create failed");
//! let page = repo.get_submodel_elements("urn:sm:1", Some(10), None).await.unwrap();
//! assert!(page.items.is_empty());
//! # }
//! ```

mod elements;
mod submodels;

pub use submodels::SubmodelFilter;

use std::sync::Arc;

use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{error, warn};

use crate::cache::SubmodelCache;
use crate::config::StoreConfig;
use crate::engine::page::{Cursor, PageSize};
use crate::error::{StoreError, StoreResult};
use crate::handlers::HandlerRegistry;
use crate::metrics;
use crate::path::{join_segments, parse_path};
use crate::storage::rows::get_required_i64;
use crate::storage::{self, Dialect};
use crate::value_type::{ValueTypeMapper, XsdValueMapper};

/// Persistence engine for submodels and their element trees.
///
/// Cheap to clone; clones share the pool, registry, cache and permits.
#[derive(Clone)]
pub struct SubmodelRepository {
    pub(super) pool: AnyPool,
    pub(super) dialect: Dialect,
    pub(super) registry: Arc<HandlerRegistry>,
    pub(super) cache: Option<Arc<dyn SubmodelCache>>,
    /// Bounds concurrent write transactions (one for SQLite)
    pub(super) write_permits: Arc<Semaphore>,
    pub(super) config: Arc<StoreConfig>,
}

impl std::fmt::Debug for SubmodelRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmodelRepository")
            .field("dialect", &self.dialect)
            .field("cached", &self.cache.is_some())
            .field("write_permits", &self.write_permits.available_permits())
            .finish()
    }
}

impl SubmodelRepository {
    /// Connect with the default XSD value mapper.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        Self::connect_with(config, Arc::new(XsdValueMapper)).await
    }

    /// Connect with an injected value-type mapper.
    pub async fn connect_with(config: StoreConfig, mapper: Arc<dyn ValueTypeMapper>) -> StoreResult<Self> {
        let (pool, dialect) = storage::connect(&config).await?;
        let permits = config.effective_write_concurrency();
        Ok(Self {
            pool,
            dialect,
            registry: Arc::new(HandlerRegistry::new(mapper)),
            cache: None,
            write_permits: Arc::new(Semaphore::new(permits)),
            config: Arc::new(config),
        })
    }

    /// Attach a submodel cache. Full-submodel reads consult it and every
    /// committed mutation invalidates the affected identifier.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SubmodelCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Underlying pool, for hosts that share it.
    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Shared plumbing for the operation files
    // ═══════════════════════════════════════════════════════════════════════════

    pub(super) async fn write_permit(&self) -> StoreResult<SemaphorePermit<'_>> {
        self.write_permits
            .acquire()
            .await
            .map_err(|e| StoreError::internal("acquire write permit", e))
    }

    pub(super) async fn begin(&self) -> StoreResult<Transaction<'static, Any>> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::internal("begin transaction", e))
    }

    pub(super) async fn acquire(&self) -> StoreResult<sqlx::pool::PoolConnection<Any>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| StoreError::internal("acquire connection", e))
    }

    pub(super) async fn invalidate(&self, submodel_id: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(submodel_id).await;
        }
    }

    pub(super) fn page_size(&self, limit: Option<i64>) -> StoreResult<PageSize> {
        PageSize::from_limit(limit.unwrap_or(self.config.default_page_limit))
    }
}

/// Commit on success; roll back on failure and hand the original error back.
pub(super) async fn finish<T>(tx: Transaction<'static, Any>, result: StoreResult<T>) -> StoreResult<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| StoreError::internal("commit transaction", e))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Record the outcome of a public operation and log internal failures.
pub(super) fn observe<T>(operation: &'static str, result: StoreResult<T>) -> StoreResult<T> {
    metrics::record_result(operation, &result);
    if let Err(StoreError::Internal(message)) = &result {
        error!(operation, error = %message, "Store operation failed");
    }
    result
}

/// Canonical form of a client path; malformed paths are BadRequest.
pub(super) fn canonical_path(path: &str) -> StoreResult<String> {
    Ok(join_segments(&parse_path(path)?))
}

pub(super) fn decode_cursor(cursor: Option<&str>) -> StoreResult<Option<Cursor>> {
    cursor.map(Cursor::decode).transpose()
}

/// Primary key of the submodel with `identifier`.
pub(super) async fn submodel_pk(conn: &mut AnyConnection, identifier: &str) -> StoreResult<i64> {
    let row = sqlx::query("SELECT id FROM submodel WHERE identifier = ?")
        .bind(identifier)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("find submodel", e))?;
    match row {
        Some(row) => get_required_i64(&row, "id"),
        None => Err(StoreError::NotFound(format!("no submodel '{}'", identifier))),
    }
}
