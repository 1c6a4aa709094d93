// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Submodel-level operations: create, read, list, replace, patch, delete.
//!
//! Listings take a [`SubmodelFilter`] narrowing by idShort or semantic ID.
//!
//! `get_submodels` reads one metadata page and then loads each submodel's
//! element forest on a bounded worker pool:
//!
//! ```text
//! page query ──► [sm₀, sm₁, … smₙ]
//!                  │    │       │      JoinSet, Semaphore(fetch_workers)
//!                  ▼    ▼       ▼      each wrapped in timeout(fetch_timeout)
//!               forest forest forest
//!                  └────┴───┬───┘
//!                   merged by page index (first error aborts the rest)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use super::{decode_cursor, finish, observe, submodel_pk, SubmodelRepository};
use crate::engine::insert::{BatchInserter, InsertContext};
use crate::engine::page::{Cursor, Page, PageSize};
use crate::engine::reconstruct::read_forest;
use crate::engine::value;
use crate::error::{StoreError, StoreResult};
use crate::handlers::{update_columns, UpdateMode};
use crate::metrics::{self, LatencyTimer};
use crate::model::{AdministrativeInformation, Key, KeyType, ModellingKind, Reference, Submodel, SubmodelElement};
use crate::path::{compute_path, validate_id_short};
use crate::storage::references::{ReferenceStore, SqlReferenceStore, SUBMODEL_SEMANTIC_ID};
use crate::storage::rows::{
    bind_value, get_i64, get_json, get_json_array, get_required_i64, get_required_text, get_text,
    placeholders, to_json, to_json_array, SqlValue,
};
use crate::storage::Dialect;

const SUBMODEL_REFERENCES: SqlReferenceStore = SqlReferenceStore::new(SUBMODEL_SEMANTIC_ID);

/// Metadata columns other than `identifier`, in [`metadata_values`] order.
const METADATA_COLUMNS: [&str; 10] = [
    "id_short",
    "category",
    "kind",
    "administration_payload",
    "description_payload",
    "displayname_payload",
    "qualifiers_payload",
    "extensions_payload",
    "embedded_data_specification_payload",
    "supplemental_semantic_ids_payload",
];

const METADATA_SELECT: &str = "SELECT s.id, s.identifier, s.id_short, s.category, s.kind, \
     s.administration_payload, s.description_payload, s.displayname_payload, s.qualifiers_payload, \
     s.extensions_payload, s.embedded_data_specification_payload, s.supplemental_semantic_ids_payload, \
     sp.snapshot AS sp_snapshot, sh.owner_id AS sh_owner_id \
     FROM submodel s \
     LEFT JOIN submodel_semantic_id_payload sp ON sp.owner_id = s.id \
     LEFT JOIN submodel_semantic_id_reference sh ON sh.owner_id = s.id AND sh.depth = 0";

/// Narrows submodel listings. Unset fields match every submodel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmodelFilter {
    /// Exact idShort.
    pub id_short: Option<String>,
    /// Matches when any key of the submodel's own semantic ID has this value.
    pub semantic_id: Option<String>,
}

impl SubmodelFilter {
    #[must_use]
    pub fn with_id_short(mut self, id_short: impl Into<String>) -> Self {
        self.id_short = Some(id_short.into());
        self
    }

    #[must_use]
    pub fn with_semantic_id(mut self, key_value: impl Into<String>) -> Self {
        self.semantic_id = Some(key_value.into());
        self
    }

    /// `AND ...` conditions over `submodel s`, with their binds.
    fn clause(&self) -> (String, Vec<SqlValue>) {
        let mut sql = String::new();
        let mut binds = Vec::new();
        if let Some(id_short) = &self.id_short {
            sql.push_str(" AND s.id_short = ?");
            binds.push(SqlValue::text(id_short.clone()));
        }
        if let Some(key_value) = &self.semantic_id {
            // Depth 0 is the semantic ID itself, deeper rows its referred IDs
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM submodel_semantic_id_reference_key sk \
                 WHERE sk.owner_id = s.id AND sk.depth = 0 AND sk.key_value = ?)",
            );
            binds.push(SqlValue::text(key_value.clone()));
        }
        (sql, binds)
    }
}

/// ModelReference addressing a whole submodel.
fn submodel_reference(identifier: &str) -> Reference {
    Reference::model(vec![Key::new(KeyType::Submodel, identifier)])
}

fn metadata_values(submodel: &Submodel) -> StoreResult<Vec<SqlValue>> {
    Ok(vec![
        SqlValue::from(submodel.id_short.clone()),
        SqlValue::from(submodel.category.clone()),
        SqlValue::from(submodel.kind.map(|k| k.as_str().to_string())),
        SqlValue::from(to_json(&submodel.administration)?),
        SqlValue::text(to_json_array(&submodel.description)?),
        SqlValue::text(to_json_array(&submodel.display_name)?),
        SqlValue::text(to_json_array(&submodel.qualifiers)?),
        SqlValue::text(to_json_array(&submodel.extensions)?),
        SqlValue::text(to_json_array(&submodel.embedded_data_specifications)?),
        SqlValue::text(to_json_array(&submodel.supplemental_semantic_ids)?),
    ])
}

/// Columns an update writes: all of them on full replace, present ones on patch.
fn metadata_updates(submodel: &Submodel, mode: UpdateMode) -> StoreResult<Vec<(&'static str, SqlValue)>> {
    let touched = [
        mode.touches(&submodel.id_short),
        mode.touches(&submodel.category),
        mode.touches(&submodel.kind),
        mode.touches(&submodel.administration),
        mode.touches(&submodel.description),
        mode.touches(&submodel.display_name),
        mode.touches(&submodel.qualifiers),
        mode.touches(&submodel.extensions),
        mode.touches(&submodel.embedded_data_specifications),
        mode.touches(&submodel.supplemental_semantic_ids),
    ];
    Ok(METADATA_COLUMNS
        .into_iter()
        .zip(metadata_values(submodel)?)
        .zip(touched)
        .filter_map(|(entry, touched)| touched.then_some(entry))
        .collect())
}

fn validate_submodel(submodel: &Submodel) -> StoreResult<()> {
    if submodel.id.trim().is_empty() {
        return Err(StoreError::BadRequest("submodel id must not be empty".into()));
    }
    if let Some(id_short) = &submodel.id_short {
        validate_id_short(id_short)?;
    }
    Ok(())
}

/// Submodel without elements, plus its key and whether the semantic id
/// still needs the normalized-row fallback.
fn metadata_from_row(row: &AnyRow) -> StoreResult<(i64, Submodel, bool)> {
    let pk = get_required_i64(row, "id")?;
    let semantic_id: Option<Reference> = get_json(row, "sp_snapshot")?;
    let needs_fallback = semantic_id.is_none() && get_i64(row, "sh_owner_id")?.is_some();
    let kind = get_text(row, "kind")?
        .map(|k| k.parse::<ModellingKind>().map_err(|e| StoreError::internal("decode submodel kind", e)))
        .transpose()?;
    let administration: Option<AdministrativeInformation> = get_json(row, "administration_payload")?;

    let mut submodel = Submodel::new(get_required_text(row, "identifier")?);
    submodel.id_short = get_text(row, "id_short")?;
    submodel.category = get_text(row, "category")?;
    submodel.kind = kind;
    submodel.semantic_id = semantic_id;
    submodel.administration = administration;
    submodel.description = get_json_array(row, "description_payload")?;
    submodel.display_name = get_json_array(row, "displayname_payload")?;
    submodel.qualifiers = get_json_array(row, "qualifiers_payload")?;
    submodel.extensions = get_json_array(row, "extensions_payload")?;
    submodel.embedded_data_specifications = get_json_array(row, "embedded_data_specification_payload")?;
    submodel.supplemental_semantic_ids = get_json_array(row, "supplemental_semantic_ids_payload")?;
    Ok((pk, submodel, needs_fallback))
}

/// Build metadata rows and resolve missing semantic snapshots in one lookup.
async fn metadata_from_rows(conn: &mut AnyConnection, rows: &[AnyRow]) -> StoreResult<Vec<(i64, Submodel)>> {
    let mut out = Vec::with_capacity(rows.len());
    let mut fallback = Vec::new();
    for row in rows {
        let (pk, submodel, needs_fallback) = metadata_from_row(row)?;
        if needs_fallback {
            fallback.push(out.len());
        }
        out.push((pk, submodel));
    }
    if !fallback.is_empty() {
        let ids: Vec<i64> = fallback.iter().map(|i| out[*i].0).collect();
        let resolved = SUBMODEL_REFERENCES.read_many(conn, &ids).await?;
        for i in fallback {
            let pk = out[i].0;
            out[i].1.semantic_id = resolved.get(&pk).cloned();
        }
    }
    Ok(out)
}

async fn read_metadata(conn: &mut AnyConnection, identifier: &str) -> StoreResult<(i64, Submodel)> {
    let sql = format!("{} WHERE s.identifier = ?", METADATA_SELECT);
    let row = sqlx::query(&sql)
        .bind(identifier)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("read submodel", e))?
        .ok_or_else(|| StoreError::NotFound(format!("no submodel '{}'", identifier)))?;
    metadata_from_rows(conn, std::slice::from_ref(&row))
        .await?
        .pop()
        .ok_or_else(|| StoreError::Internal("submodel row vanished while decoding".into()))
}

/// Remove every element of a submodel, deepest paths first on MySQL.
async fn delete_all_elements(conn: &mut AnyConnection, dialect: Dialect, pk: i64) -> StoreResult<u64> {
    let sql = format!("DELETE FROM submodel_element WHERE submodel_id = ?{}", dialect.children_first());
    let result = sqlx::query(&sql)
        .bind(pk)
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("delete submodel elements", e))?;
    Ok(result.rows_affected())
}

impl SubmodelRepository {
    // ═══════════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Persist a new submodel with its whole element forest.
    ///
    /// A duplicate identifier is `Conflict`; element validation failures are
    /// `BadRequest` and leave nothing behind.
    #[instrument(skip(self, submodel), fields(submodel_id = %submodel.id))]
    pub async fn create_submodel(&self, submodel: Submodel) -> StoreResult<()> {
        let _timer = LatencyTimer::new("create_submodel");
        let id = submodel.id.clone();
        let result = async {
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = self.create_in(&mut tx, submodel).await;
            finish(tx, result).await
        }
        .await;
        if let Ok(elements) = &result {
            self.invalidate(&id).await;
            info!(submodel_id = %id, elements, "Submodel created");
        }
        observe("create_submodel", result.map(|_| ()))
    }

    async fn create_in(&self, conn: &mut AnyConnection, mut submodel: Submodel) -> StoreResult<usize> {
        validate_submodel(&submodel)?;

        let mut columns = vec!["identifier"];
        columns.extend_from_slice(&METADATA_COLUMNS);
        let sql = format!(
            "INSERT INTO submodel ({}) VALUES ({})",
            columns.join(", "),
            placeholders(columns.len())
        );
        let mut query = sqlx::query(&sql).bind(submodel.id.clone());
        for value in metadata_values(&submodel)? {
            query = bind_value(query, value);
        }
        query
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::from_write("create submodel", e))?;
        let pk = submodel_pk(conn, &submodel.id).await?;

        if let Some(reference) = &submodel.semantic_id {
            let rows = SUBMODEL_REFERENCES.rows(pk, reference)?;
            SUBMODEL_REFERENCES.write_many(conn, rows).await?;
        }

        let elements = submodel.submodel_elements.take().unwrap_or_default();
        let inserter = BatchInserter::new(&self.registry, self.dialect);
        let inserted = inserter
            .insert(conn, pk, &InsertContext::top_level(0), elements)
            .await?;
        Ok(inserted.len())
    }

    /// Replace (`FullReplace`) or patch (`Patch`) an existing submodel.
    ///
    /// A full replace also swaps the element forest for the request's; a patch
    /// writes only the metadata fields present in the request.
    #[instrument(skip(self, submodel), fields(submodel_id = %id))]
    pub async fn update_submodel(&self, id: &str, submodel: Submodel, mode: UpdateMode) -> StoreResult<()> {
        let _timer = LatencyTimer::new("update_submodel");
        let result = async {
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = self.update_in(&mut tx, id, submodel, mode).await;
            finish(tx, result).await
        }
        .await;
        if result.is_ok() {
            self.invalidate(id).await;
        }
        observe("update_submodel", result)
    }

    async fn update_in(
        &self,
        conn: &mut AnyConnection,
        id: &str,
        mut submodel: Submodel,
        mode: UpdateMode,
    ) -> StoreResult<()> {
        if submodel.id != id {
            return Err(StoreError::BadRequest(format!(
                "submodel id '{}' does not match '{}'",
                submodel.id, id
            )));
        }
        validate_submodel(&submodel)?;
        let pk = submodel_pk(conn, id).await?;

        update_columns(conn, "submodel", pk, metadata_updates(&submodel, mode)?).await?;
        if mode.touches(&submodel.semantic_id) {
            SUBMODEL_REFERENCES.replace(conn, pk, submodel.semantic_id.as_ref()).await?;
        }

        if mode.is_full_replace() {
            let removed = delete_all_elements(conn, self.dialect, pk).await?;
            let elements = submodel.submodel_elements.take().unwrap_or_default();
            let inserter = BatchInserter::new(&self.registry, self.dialect);
            let inserted = inserter
                .insert(conn, pk, &InsertContext::top_level(0), elements)
                .await?;
            debug!(removed, inserted = inserted.len(), "Submodel forest replaced");
        }
        Ok(())
    }

    /// Create the submodel, or fully replace it when it already exists.
    /// Returns `true` when it was created.
    #[instrument(skip(self, submodel), fields(submodel_id = %id))]
    pub async fn put_submodel(&self, id: &str, submodel: Submodel) -> StoreResult<bool> {
        let _timer = LatencyTimer::new("put_submodel");
        let result = async {
            if submodel.id != id {
                return Err(StoreError::BadRequest(format!(
                    "submodel id '{}' does not match '{}'",
                    submodel.id, id
                )));
            }
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = async {
                match submodel_pk(&mut tx, id).await {
                    Ok(_) => {
                        self.update_in(&mut tx, id, submodel, UpdateMode::FullReplace).await?;
                        Ok(false)
                    }
                    Err(StoreError::NotFound(_)) => {
                        self.create_in(&mut tx, submodel).await?;
                        Ok(true)
                    }
                    Err(e) => Err(e),
                }
            }
            .await;
            finish(tx, result).await
        }
        .await;
        if result.is_ok() {
            self.invalidate(id).await;
        }
        observe("put_submodel", result)
    }

    /// Delete a submodel and everything it owns.
    #[instrument(skip(self), fields(submodel_id = %id))]
    pub async fn delete_submodel(&self, id: &str) -> StoreResult<()> {
        let _timer = LatencyTimer::new("delete_submodel");
        let result = async {
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = async {
                let pk = submodel_pk(&mut tx, id).await?;
                let elements = delete_all_elements(&mut tx, self.dialect, pk).await?;
                let deleted = sqlx::query("DELETE FROM submodel WHERE id = ?")
                    .bind(pk)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::internal("delete submodel", e))?;
                if deleted.rows_affected() == 0 {
                    return Err(StoreError::NotFound(format!("no submodel '{}'", id)));
                }
                Ok(elements)
            }
            .await;
            finish(tx, result).await
        }
        .await;
        if let Ok(elements) = &result {
            self.invalidate(id).await;
            info!(submodel_id = %id, elements, "Submodel deleted");
        }
        observe("delete_submodel", result.map(|_| ()))
    }

    /// Apply a ValueOnly object of `idShort → value` to top-level elements.
    #[instrument(skip(self, value), fields(submodel_id = %id))]
    pub async fn update_submodel_value_only(&self, id: &str, value: &Value) -> StoreResult<()> {
        let _timer = LatencyTimer::new("update_submodel_value_only");
        let result = async {
            let entries = value.as_object().ok_or_else(|| {
                StoreError::BadRequest("submodel value must be an object keyed by idShort".into())
            })?;
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = async {
                let pk = submodel_pk(&mut tx, id).await?;
                let mut written = 0;
                for (id_short, element_value) in entries {
                    validate_id_short(id_short)?;
                    let path = compute_path("", false, 0, id_short);
                    written += value::apply(&mut tx, &self.registry, pk, &path, element_value).await?;
                }
                Ok(written)
            }
            .await;
            finish(tx, result).await
        }
        .await;
        if let Ok(written) = &result {
            self.invalidate(id).await;
            debug!(elements = written, "Submodel value applied");
        }
        observe("update_submodel_value_only", result.map(|_| ()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// The submodel with its full element forest. Served from the cache when
    /// one is attached and holds the identifier.
    #[instrument(skip(self), fields(submodel_id = %id))]
    pub async fn get_submodel(&self, id: &str) -> StoreResult<Submodel> {
        let _timer = LatencyTimer::new("get_submodel");
        let mut generation = None;
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(id).await {
                metrics::record_cache(true);
                return observe("get_submodel", Ok(hit));
            }
            metrics::record_cache(false);
            generation = Some(cache.generation(id).await);
        }

        let result = async {
            let mut conn = self.acquire().await?;
            let (pk, submodel) = read_metadata(&mut conn, id).await?;
            let elements = read_forest(&mut conn, &self.registry, pk).await?;
            Ok(submodel.with_elements(elements))
        }
        .await;
        if let (Ok(submodel), Some(cache), Some(generation)) = (&result, &self.cache, generation) {
            if !cache.put_if_current(submodel, generation).await {
                debug!("Submodel changed during read, not cached");
            }
        }
        observe("get_submodel", result)
    }

    /// The submodel's metadata without its elements.
    #[instrument(skip(self), fields(submodel_id = %id))]
    pub async fn get_submodel_metadata(&self, id: &str) -> StoreResult<Submodel> {
        let _timer = LatencyTimer::new("get_submodel_metadata");
        let result = async {
            let mut conn = self.acquire().await?;
            read_metadata(&mut conn, id).await.map(|(_, submodel)| submodel)
        }
        .await;
        observe("get_submodel_metadata", result)
    }

    /// One page of submodels matching `filter`, ordered by identifier, each
    /// with its forest.
    ///
    /// Forests load concurrently on at most `fetch_workers` tasks, each bounded
    /// by `fetch_timeout`. The first failure aborts the remaining tasks.
    #[instrument(skip_all, fields(limit = ?limit, filter = ?filter))]
    pub async fn get_submodels(
        &self,
        filter: &SubmodelFilter,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> StoreResult<Page<Submodel>> {
        let _timer = LatencyTimer::new("get_submodels");
        let result = async {
            let size = self.page_size(limit)?;
            let cursor = decode_cursor(cursor)?;
            let (page, next) = self.page_metadata(filter, size, cursor.as_ref()).await?;
            let forests = self.fetch_forests(page.iter().map(|(pk, _)| *pk).collect()).await?;
            let items = page
                .into_iter()
                .zip(forests)
                .map(|((_, submodel), elements)| submodel.with_elements(elements))
                .collect();
            Ok(Page { items, cursor: next })
        }
        .await;
        observe("get_submodels", result)
    }

    /// ModelReferences for one page of submodels matching `filter`.
    #[instrument(skip_all, fields(limit = ?limit, filter = ?filter))]
    pub async fn get_submodel_references(
        &self,
        filter: &SubmodelFilter,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> StoreResult<Page<Reference>> {
        let _timer = LatencyTimer::new("get_submodel_references");
        let result = async {
            let size = self.page_size(limit)?;
            let cursor = decode_cursor(cursor)?;
            let (page, next) = self.page_metadata(filter, size, cursor.as_ref()).await?;
            let items = page.iter().map(|(_, sm)| submodel_reference(&sm.id)).collect();
            Ok(Page { items, cursor: next })
        }
        .await;
        observe("get_submodel_references", result)
    }

    /// ModelReference to the submodel `id`.
    #[instrument(skip(self), fields(submodel_id = %id))]
    pub async fn get_submodel_reference(&self, id: &str) -> StoreResult<Reference> {
        let _timer = LatencyTimer::new("get_submodel_reference");
        let result = async {
            if id.trim().is_empty() {
                return Err(StoreError::BadRequest("submodel id must not be empty".into()));
            }
            let mut conn = self.acquire().await?;
            submodel_pk(&mut conn, id).await?;
            Ok(submodel_reference(id))
        }
        .await;
        observe("get_submodel_reference", result)
    }

    async fn page_metadata(
        &self,
        filter: &SubmodelFilter,
        size: PageSize,
        cursor: Option<&Cursor>,
    ) -> StoreResult<(Vec<(i64, Submodel)>, Option<String>)> {
        if size == PageSize::Empty {
            return Ok((Vec::new(), None));
        }
        let (mut sql, mut binds) = filter.clause();
        sql.insert_str(0, &format!("{} WHERE 1 = 1", METADATA_SELECT));
        if let Some(cursor) = cursor {
            let (clause, values) = cursor.filter("s.identifier", "s.id");
            sql.push_str(&clause);
            binds.extend(values);
        }
        sql.push_str(" ORDER BY s.identifier, s.id");
        sql.push_str(&size.limit_clause());

        let mut conn = self.acquire().await?;
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = bind_value(query, value);
        }
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("page submodels", e))?;
        let page = metadata_from_rows(&mut conn, &rows).await?;
        Ok(size.split(page, |(pk, sm)| Cursor::new(sm.id.clone(), *pk)))
    }

    /// Element forests for `pks`, returned in the same order.
    async fn fetch_forests(&self, pks: Vec<i64>) -> StoreResult<Vec<Vec<SubmodelElement>>> {
        if pks.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.config.fetch_workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        let timeout = self.config.fetch_timeout();
        let mut join_set: JoinSet<(usize, StoreResult<Vec<SubmodelElement>>)> = JoinSet::new();

        for (i, pk) in pks.iter().copied().enumerate() {
            let pool = self.pool.clone();
            let registry = self.registry.clone();
            let permits = permits.clone();

            join_set.spawn(async move {
                let _permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (i, Err(StoreError::internal("acquire fetch permit", e))),
                };
                metrics::set_fetch_workers_busy(workers - permits.available_permits());
                let fetched = tokio::time::timeout(timeout, async {
                    let mut conn = pool
                        .acquire()
                        .await
                        .map_err(|e| StoreError::internal("acquire connection", e))?;
                    read_forest(&mut conn, &registry, pk).await
                })
                .await;
                let result = match fetched {
                    Ok(result) => result,
                    Err(_) => {
                        metrics::record_timeout("get_submodels");
                        Err(StoreError::Internal(format!(
                            "loading submodel {} timed out after {:?}",
                            pk, timeout
                        )))
                    }
                };
                (i, result)
            });
        }

        let mut results: HashMap<usize, Vec<SubmodelElement>> = HashMap::with_capacity(pks.len());
        while let Some(joined) = join_set.join_next().await {
            let outcome = match joined {
                Ok((i, Ok(elements))) => Ok((i, elements)),
                Ok((_, Err(e))) => Err(e),
                Err(e) => Err(StoreError::internal("fetch worker failed", e)),
            };
            match outcome {
                Ok((i, elements)) => {
                    results.insert(i, elements);
                }
                Err(e) => {
                    join_set.abort_all();
                    metrics::set_fetch_workers_busy(0);
                    return Err(e);
                }
            }
        }
        metrics::set_fetch_workers_busy(0);
        debug!(submodels = pks.len(), workers, "Forests fetched");

        (0..pks.len())
            .map(|i| {
                results
                    .remove(&i)
                    .ok_or_else(|| StoreError::Internal(format!("fetch worker {} returned nothing", i)))
            })
            .collect()
    }
}
