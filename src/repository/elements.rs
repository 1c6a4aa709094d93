// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Element-level operations addressed by idShortPath.

use serde_json::Value;
use sqlx::AnyConnection;
use tracing::{debug, instrument};

use super::{canonical_path, decode_cursor, finish, observe, submodel_pk, SubmodelRepository};
use crate::engine::insert::{BatchInserter, InsertContext, ListTyping};
use crate::engine::page::Page;
use crate::engine::reconstruct::{page_roots, read_roots, read_subtree};
use crate::engine::{list_typing, mutation, next_position, path_exists, require_element, value};
use crate::error::{StoreError, StoreResult};
use crate::handlers::base::update_base;
use crate::handlers::UpdateMode;
use crate::metrics::LatencyTimer;
use crate::model::{ChildAddressing, Reference, SubmodelElement};
use crate::path::{compute_path, element_reference, validate_id_short};
use crate::storage::references::{SqlReferenceStore, ELEMENT_SEMANTIC_ID};

impl SubmodelRepository {
    // ═══════════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// One page of top-level elements, each with its full subtree, ordered by
    /// (idShortPath, id).
    ///
    /// `limit` of `0` yields an empty page, `-1` every element and `None` the
    /// configured default. Anything below `-1` is `BadRequest`.
    #[instrument(skip(self, cursor), fields(submodel_id = %id))]
    pub async fn get_submodel_elements(
        &self,
        id: &str,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> StoreResult<Page<SubmodelElement>> {
        let _timer = LatencyTimer::new("get_submodel_elements");
        let result = async {
            let size = self.page_size(limit)?;
            let cursor = decode_cursor(cursor)?;
            let mut conn = self.acquire().await?;
            let pk = submodel_pk(&mut conn, id).await?;
            let (roots, next) = page_roots(&mut conn, pk, size, cursor.as_ref()).await?;
            let ids: Vec<i64> = roots.iter().map(|r| r.id).collect();
            let items = read_roots(&mut conn, &self.registry, pk, &ids).await?;
            Ok(Page { items, cursor: next })
        }
        .await;
        observe("get_submodel_elements", result)
    }

    /// The element at `path` with its subtree.
    #[instrument(skip(self), fields(submodel_id = %id))]
    pub async fn get_submodel_element(&self, id: &str, path: &str) -> StoreResult<SubmodelElement> {
        let _timer = LatencyTimer::new("get_submodel_element");
        let result = async {
            let path = canonical_path(path)?;
            let mut conn = self.acquire().await?;
            let pk = submodel_pk(&mut conn, id).await?;
            read_subtree(&mut conn, &self.registry, pk, &path).await
        }
        .await;
        observe("get_submodel_element", result)
    }

    /// ValueOnly JSON of the element at `path`. Variants without a value
    /// representation are `BadRequest`.
    #[instrument(skip(self), fields(submodel_id = %id))]
    pub async fn get_submodel_element_value(&self, id: &str, path: &str) -> StoreResult<Value> {
        let _timer = LatencyTimer::new("get_submodel_element_value");
        let result = async {
            let canonical = canonical_path(path)?;
            let mut conn = self.acquire().await?;
            let pk = submodel_pk(&mut conn, id).await?;
            let element = read_subtree(&mut conn, &self.registry, pk, &canonical).await?;
            element.value_only().ok_or_else(|| {
                StoreError::BadRequest(format!(
                    "{} '{}' has no value-only representation",
                    element.model_type(),
                    path
                ))
            })
        }
        .await;
        observe("get_submodel_element_value", result)
    }

    /// ModelReferences for one page of top-level elements.
    #[instrument(skip(self, cursor), fields(submodel_id = %id))]
    pub async fn get_submodel_element_references(
        &self,
        id: &str,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> StoreResult<Page<Reference>> {
        let _timer = LatencyTimer::new("get_submodel_element_references");
        let result = async {
            let size = self.page_size(limit)?;
            let cursor = decode_cursor(cursor)?;
            let mut conn = self.acquire().await?;
            let pk = submodel_pk(&mut conn, id).await?;
            let (roots, next) = page_roots(&mut conn, pk, size, cursor.as_ref()).await?;
            let items = roots
                .iter()
                .map(|r| element_reference(id, &r.path, r.model_type))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(Page { items, cursor: next })
        }
        .await;
        observe("get_submodel_element_references", result)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Creates
    // ═══════════════════════════════════════════════════════════════════════════

    /// Append a top-level element (with its subtree) and return its path.
    #[instrument(skip(self, element), fields(submodel_id = %id, model_type = %element.model_type()))]
    pub async fn add_submodel_element(&self, id: &str, element: SubmodelElement) -> StoreResult<String> {
        let _timer = LatencyTimer::new("add_submodel_element");
        let result = async {
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = self.add_top_level(&mut tx, id, element).await;
            finish(tx, result).await
        }
        .await;
        if result.is_ok() {
            self.invalidate(id).await;
        }
        observe("add_submodel_element", result)
    }

    async fn add_top_level(&self, conn: &mut AnyConnection, id: &str, element: SubmodelElement) -> StoreResult<String> {
        let pk = submodel_pk(conn, id).await?;
        let name = element
            .id_short()
            .ok_or_else(|| StoreError::BadRequest("top-level element needs an idShort".into()))?;
        validate_id_short(name)?;
        if path_exists(conn, pk, name).await? {
            return Err(StoreError::Conflict(format!("element '{}' already exists", name)));
        }

        let position = next_position(conn, pk, None).await?;
        let handler = self.registry.get(element.model_type())?;
        let inserter = BatchInserter::new(&self.registry, self.dialect);
        handler.create(conn, &inserter, pk, element, position).await
    }

    /// Insert `element` below the container at `parent_path` and return the
    /// new path.
    ///
    /// List parents append at the next index; Collection, Entity and
    /// AnnotatedRelationship parents address the child by idShort and reject
    /// a taken name with `Conflict`. Other parents are `BadRequest`.
    #[instrument(skip(self, element), fields(submodel_id = %id, path = %parent_path))]
    pub async fn add_submodel_element_at_path(
        &self,
        id: &str,
        parent_path: &str,
        element: SubmodelElement,
    ) -> StoreResult<String> {
        let _timer = LatencyTimer::new("add_submodel_element_at_path");
        let result = async {
            let parent_path = canonical_path(parent_path)?;
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = self.add_nested(&mut tx, id, &parent_path, element).await;
            finish(tx, result).await
        }
        .await;
        if result.is_ok() {
            self.invalidate(id).await;
        }
        observe("add_submodel_element_at_path", result)
    }

    async fn add_nested(
        &self,
        conn: &mut AnyConnection,
        id: &str,
        parent_path: &str,
        element: SubmodelElement,
    ) -> StoreResult<String> {
        let pk = submodel_pk(conn, id).await?;
        let parent = require_element(conn, pk, parent_path).await?;
        let addressing = parent.model_type().child_addressing().ok_or_else(|| {
            StoreError::BadRequest(format!(
                "{} '{}' cannot hold child elements",
                parent.model_type(),
                parent_path
            ))
        })?;

        let positional = addressing == ChildAddressing::Positional;
        let list_typing = if positional {
            list_typing(conn, parent.id()).await?
        } else {
            let name = element.id_short().ok_or_else(|| {
                StoreError::BadRequest(format!("element below '{}' needs an idShort", parent_path))
            })?;
            validate_id_short(name)?;
            let candidate = compute_path(parent_path, false, 0, name);
            if path_exists(conn, pk, &candidate).await? {
                return Err(StoreError::Conflict(format!("element '{}' already exists", candidate)));
            }
            None
        };

        let ctx = InsertContext {
            parent_id: Some(parent.id()),
            parent_path: parent_path.to_string(),
            root_id: Some(parent.root_for_children()),
            positional,
            start_position: next_position(conn, pk, Some(parent.id())).await?,
            list_typing,
        };
        let handler = self.registry.get(element.model_type())?;
        let inserter = BatchInserter::new(&self.registry, self.dialect);
        handler.create_nested(conn, &inserter, pk, ctx, element).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Updates
    // ═══════════════════════════════════════════════════════════════════════════

    /// Update the element at `path`.
    ///
    /// `FullReplace` clears absent optional fields, renames the element when
    /// the request carries a different idShort and replaces the children of
    /// containers. `Patch` writes only what the request carries. Changing the
    /// model type is `BadRequest`.
    #[instrument(skip(self, element), fields(submodel_id = %id, path = %path))]
    pub async fn update_submodel_element(
        &self,
        id: &str,
        path: &str,
        element: SubmodelElement,
        mode: UpdateMode,
    ) -> StoreResult<()> {
        let _timer = LatencyTimer::new("update_submodel_element");
        let result = async {
            let path = canonical_path(path)?;
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = self.update_element_in(&mut tx, id, &path, element, mode).await;
            finish(tx, result).await
        }
        .await;
        if result.is_ok() {
            self.invalidate(id).await;
        }
        observe("update_submodel_element", result)
    }

    async fn update_element_in(
        &self,
        conn: &mut AnyConnection,
        id: &str,
        path: &str,
        mut element: SubmodelElement,
        mode: UpdateMode,
    ) -> StoreResult<()> {
        let pk = submodel_pk(conn, id).await?;
        let stored = require_element(conn, pk, path).await?;
        if element.model_type() != stored.model_type() {
            return Err(StoreError::BadRequest(format!(
                "cannot change '{}' from {} to {}",
                path,
                stored.model_type(),
                element.model_type()
            )));
        }

        let mut current_path = stored.path().to_string();
        if mode.is_full_replace() {
            if let Some(name) = element.id_short() {
                current_path = mutation::rename(conn, self.dialect, pk, &stored, name).await?;
            }
        }

        let references = SqlReferenceStore::new(ELEMENT_SEMANTIC_ID);
        update_base(conn, self.dialect, &references, stored.id(), element.meta(), mode).await?;
        let handler = self.registry.get(stored.model_type())?;
        handler
            .update(conn, stored.id(), &element, mode, self.registry.mapper())
            .await?;

        if mode.is_full_replace() {
            if let Some(addressing) = element.child_addressing() {
                let list_typing = ListTyping::of(&element);
                let children = element.take_children();
                let removed = mutation::delete_descendants(conn, self.dialect, pk, &current_path).await?;
                let ctx = InsertContext {
                    parent_id: Some(stored.id()),
                    parent_path: current_path.clone(),
                    root_id: Some(stored.root_for_children()),
                    positional: addressing == ChildAddressing::Positional,
                    start_position: 0,
                    list_typing,
                };
                let inserter = BatchInserter::new(&self.registry, self.dialect);
                let inserted = inserter.insert(conn, pk, &ctx, children).await?;
                debug!(path = %current_path, removed, inserted = inserted.len(), "Children replaced");
            }
        }
        Ok(())
    }

    /// Apply a ValueOnly JSON value to the element at `path` and the children
    /// it names.
    #[instrument(skip(self, value), fields(submodel_id = %id, path = %path))]
    pub async fn update_submodel_element_value_only(&self, id: &str, path: &str, value: &Value) -> StoreResult<()> {
        let _timer = LatencyTimer::new("update_submodel_element_value_only");
        let result = async {
            let path = canonical_path(path)?;
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = async {
                let pk = submodel_pk(&mut tx, id).await?;
                value::apply(&mut tx, &self.registry, pk, &path, value).await
            }
            .await;
            finish(tx, result).await
        }
        .await;
        if result.is_ok() {
            self.invalidate(id).await;
        }
        observe("update_submodel_element_value_only", result.map(|_| ()))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Deletes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Delete the element at `path` with its subtree. Later list siblings
    /// move down one index.
    #[instrument(skip(self), fields(submodel_id = %id))]
    pub async fn delete_submodel_element_at_path(&self, id: &str, path: &str) -> StoreResult<()> {
        let _timer = LatencyTimer::new("delete_submodel_element_at_path");
        let result = async {
            let path = canonical_path(path)?;
            let _permit = self.write_permit().await?;
            let mut tx = self.begin().await?;
            let result = async {
                let pk = submodel_pk(&mut tx, id).await?;
                let stored = require_element(&mut tx, pk, &path).await?;
                mutation::delete_subtree(&mut tx, self.dialect, pk, &stored).await
            }
            .await;
            finish(tx, result).await
        }
        .await;
        if result.is_ok() {
            self.invalidate(id).await;
        }
        observe("delete_submodel_element_at_path", result.map(|_| ()))
    }
}
