// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Path-changing writes: rename with descendant cascade, subtree delete and
//! list re-indexing.
//!
//! Descendants are always moved with two set-based prefix rewrites (one per
//! `p.` / `p[` range), never row by row.

use sqlx::AnyConnection;
use tracing::debug;

use super::{path_exists, StoredElement};
use crate::error::StoreError;
use crate::path::{self, compute_path, descendant_prefixes, is_positional, prefix_range, rename_path, validate_id_short};
use crate::storage::rows::{get_required_i64, get_required_text};
use crate::storage::Dialect;

/// Rewrite every descendant path of `old` to start with `new` instead.
pub async fn rewrite_descendants(
    conn: &mut AnyConnection,
    dialect: Dialect,
    submodel_pk: i64,
    old: &str,
    new: &str,
) -> Result<u64, StoreError> {
    let sql = format!(
        "UPDATE submodel_element SET idshort_path = {} \
         WHERE submodel_id = ? AND idshort_path >= ? AND idshort_path < ?",
        dialect.concat("?", "SUBSTR(idshort_path, ?)")
    );
    // SUBSTR is 1-based and counts characters on both dialects.
    let tail_start = old.chars().count() as i64 + 1;
    let mut moved = 0;
    for prefix in descendant_prefixes(old) {
        let (lo, hi) = prefix_range(&prefix);
        let result = sqlx::query(&sql)
            .bind(new.to_string())
            .bind(tail_start)
            .bind(submodel_pk)
            .bind(lo)
            .bind(hi)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::from_write("rewrite descendant paths", e))?;
        moved += result.rows_affected();
    }
    Ok(moved)
}

/// Rename `element` to `new_id_short` and return its (possibly new) path.
///
/// List items keep their index path and only change their label.
pub async fn rename(
    conn: &mut AnyConnection,
    dialect: Dialect,
    submodel_pk: i64,
    element: &StoredElement,
    new_id_short: &str,
) -> Result<String, StoreError> {
    let name = new_id_short.trim();
    if name.is_empty() {
        return Err(StoreError::BadRequest("idShort must not be empty".into()));
    }
    validate_id_short(name)?;
    if element.id_short.as_deref() == Some(name) {
        return Ok(element.path().to_string());
    }

    if is_positional(element.path()) {
        sqlx::query("UPDATE submodel_element SET id_short = ? WHERE id = ?")
            .bind(name.to_string())
            .bind(element.id())
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("relabel list item", e))?;
        return Ok(element.path().to_string());
    }

    let old_path = element.path();
    let new_path = rename_path(old_path, name);
    if path_exists(conn, submodel_pk, &new_path).await? {
        return Err(StoreError::Conflict(format!(
            "cannot rename '{}': '{}' already exists",
            old_path, new_path
        )));
    }

    sqlx::query("UPDATE submodel_element SET id_short = ?, idshort_path = ? WHERE id = ?")
        .bind(name.to_string())
        .bind(new_path.clone())
        .bind(element.id())
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::from_write("rename element", e))?;
    let moved = rewrite_descendants(conn, dialect, submodel_pk, old_path, &new_path).await?;

    debug!(from = %old_path, to = %new_path, descendants = moved, "Element renamed");
    Ok(new_path)
}

/// Delete everything below `path`, keeping the element itself.
pub async fn delete_descendants(
    conn: &mut AnyConnection,
    dialect: Dialect,
    submodel_pk: i64,
    path: &str,
) -> Result<u64, StoreError> {
    let sql = format!(
        "DELETE FROM submodel_element WHERE submodel_id = ? AND idshort_path >= ? AND idshort_path < ?{}",
        dialect.children_first()
    );
    let mut removed = 0;
    for prefix in descendant_prefixes(path) {
        let (lo, hi) = prefix_range(&prefix);
        let result = sqlx::query(&sql)
            .bind(submodel_pk)
            .bind(lo)
            .bind(hi)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("delete descendants", e))?;
        removed += result.rows_affected();
    }
    Ok(removed)
}

/// Delete `element` and its subtree, then close the gap among list siblings.
pub async fn delete_subtree(
    conn: &mut AnyConnection,
    dialect: Dialect,
    submodel_pk: i64,
    element: &StoredElement,
) -> Result<u64, StoreError> {
    let mut removed = delete_descendants(conn, dialect, submodel_pk, element.path()).await?;

    let result = sqlx::query("DELETE FROM submodel_element WHERE id = ?")
        .bind(element.id())
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("delete element", e))?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("no element at '{}'", element.path())));
    }
    removed += result.rows_affected();

    if is_positional(element.path()) {
        reindex_after(conn, dialect, submodel_pk, element).await?;
    }
    debug!(path = %element.path(), removed, "Subtree deleted");
    Ok(removed)
}

/// Shift every later sibling of a removed list item down by one.
async fn reindex_after(
    conn: &mut AnyConnection,
    dialect: Dialect,
    submodel_pk: i64,
    removed: &StoredElement,
) -> Result<(), StoreError> {
    let Some(parent_id) = removed.parent_id else {
        return Ok(());
    };
    let parent_path = path::parent_of(removed.path()).unwrap_or_default().to_string();

    let rows = sqlx::query(
        "SELECT id, position, idshort_path FROM submodel_element \
         WHERE parent_sme_id = ? AND position > ? ORDER BY position",
    )
    .bind(parent_id)
    .bind(removed.position)
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| StoreError::internal("load list siblings", e))?;

    // Ascending order: each sibling moves into the slot just vacated.
    for row in &rows {
        let id = get_required_i64(row, "id")?;
        let position = get_required_i64(row, "position")?;
        let old_path = get_required_text(row, "idshort_path")?;
        let new_position = position - 1;
        let new_path = compute_path(&parent_path, true, new_position as usize, "");

        sqlx::query("UPDATE submodel_element SET position = ?, idshort_path = ? WHERE id = ?")
            .bind(new_position)
            .bind(new_path.clone())
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::from_write("re-index list item", e))?;
        rewrite_descendants(conn, dialect, submodel_pk, &old_path, &new_path).await?;
    }
    if !rows.is_empty() {
        debug!(parent = %parent_path, shifted = rows.len(), "List re-indexed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::engine::require_element;
    use crate::{
        AasSubmodelElements, DataTypeDefXsd, ElementMeta, Property, StoreConfig, Submodel, SubmodelElement,
        SubmodelElementCollection, SubmodelElementList, SubmodelRepository,
    };

    fn int(id_short: Option<&str>, value: i64) -> SubmodelElement {
        SubmodelElement::Property(Property {
            meta: id_short.map(ElementMeta::named).unwrap_or_default(),
            value_type: DataTypeDefXsd::Int,
            value: Some(value.to_string()),
            value_id: None,
        })
    }

    fn collection(id_short: Option<&str>, children: Vec<SubmodelElement>) -> SubmodelElement {
        SubmodelElement::SubmodelElementCollection(SubmodelElementCollection {
            meta: id_short.map(ElementMeta::named).unwrap_or_default(),
            value: Some(children),
        })
    }

    fn list(id_short: &str, items: Vec<SubmodelElement>) -> SubmodelElement {
        SubmodelElement::SubmodelElementList(SubmodelElementList {
            meta: ElementMeta::named(id_short),
            order_relevant: Some(true),
            semantic_id_list_element: None,
            type_value_list_element: AasSubmodelElements::SubmodelElementCollection,
            value_type_list_element: None,
            value: Some(items),
        })
    }

    async fn store(elements: Vec<SubmodelElement>) -> (SubmodelRepository, i64, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SubmodelRepository::connect(StoreConfig::sqlite(dir.path().join("mutation.db")))
            .await
            .unwrap();
        repo.create_submodel(Submodel::new("urn:sm:m").with_elements(elements))
            .await
            .unwrap();
        let pk: i64 = sqlx::query_scalar("SELECT id FROM submodel WHERE identifier = ?")
            .bind("urn:sm:m")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        (repo, pk, dir)
    }

    /// Row id to path for every element of the submodel.
    async fn paths(repo: &SubmodelRepository, pk: i64) -> HashMap<i64, String> {
        sqlx::query_as::<_, (i64, String)>("SELECT id, idshort_path FROM submodel_element WHERE submodel_id = ?")
            .bind(pk)
            .fetch_all(repo.pool())
            .await
            .unwrap()
            .into_iter()
            .collect()
    }

    fn id_of(paths: &HashMap<i64, String>, path: &str) -> i64 {
        paths
            .iter()
            .find(|(_, p)| p.as_str() == path)
            .map(|(id, _)| *id)
            .unwrap_or_else(|| panic!("no row at {}", path))
    }

    #[tokio::test]
    async fn test_rename_rewrites_descendants_in_place() {
        let (repo, pk, _dir) = store(vec![
            collection(
                Some("c"),
                vec![int(Some("a"), 1), list("l", vec![collection(None, vec![int(Some("v"), 2)])])],
            ),
            collection(Some("cc"), vec![int(Some("x"), 3)]),
        ])
        .await;
        let before = paths(&repo, pk).await;

        let mut conn = repo.pool().acquire().await.unwrap();
        let element = require_element(&mut conn, pk, "c").await.unwrap();
        let new_path = rename(&mut conn, repo.dialect(), pk, &element, "d").await.unwrap();
        assert_eq!(new_path, "d");
        drop(conn);

        let after = paths(&repo, pk).await;
        assert_eq!(after.len(), before.len());
        let moves = [
            ("c", "d"),
            ("c.a", "d.a"),
            ("c.l", "d.l"),
            ("c.l[0]", "d.l[0]"),
            ("c.l[0].v", "d.l[0].v"),
            ("cc", "cc"),
            ("cc.x", "cc.x"),
        ];
        for (old, new) in moves {
            assert_eq!(after[&id_of(&before, old)], new, "row at {}", old);
        }
    }

    #[tokio::test]
    async fn test_rename_onto_sibling_is_conflict() {
        let (repo, pk, _dir) = store(vec![int(Some("a"), 1), int(Some("b"), 2)]).await;
        let before = paths(&repo, pk).await;

        let mut conn = repo.pool().acquire().await.unwrap();
        let element = require_element(&mut conn, pk, "a").await.unwrap();
        let err = rename(&mut conn, repo.dialect(), pk, &element, "b").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        drop(conn);

        assert_eq!(paths(&repo, pk).await, before);
    }

    #[tokio::test]
    async fn test_delete_reindex_keeps_index_prefixes_apart() {
        // l[1] is a string prefix of l[10]; only the former's subtree may go
        let items = (0..11).map(|i| collection(None, vec![int(Some("v"), i)])).collect();
        let (repo, pk, _dir) = store(vec![list("l", items)]).await;
        let before = paths(&repo, pk).await;

        let mut conn = repo.pool().acquire().await.unwrap();
        let element = require_element(&mut conn, pk, "l[1]").await.unwrap();
        let removed = delete_subtree(&mut conn, repo.dialect(), pk, &element).await.unwrap();
        assert_eq!(removed, 2);
        drop(conn);

        let after = paths(&repo, pk).await;
        assert_eq!(after.len(), before.len() - 2);
        assert!(!after.contains_key(&id_of(&before, "l[1]")));
        assert!(!after.contains_key(&id_of(&before, "l[1].v")));

        assert_eq!(after[&id_of(&before, "l[0].v")], "l[0].v");
        assert_eq!(after[&id_of(&before, "l[2]")], "l[1]");
        assert_eq!(after[&id_of(&before, "l[2].v")], "l[1].v");
        assert_eq!(after[&id_of(&before, "l[10]")], "l[9]");
        assert_eq!(after[&id_of(&before, "l[10].v")], "l[9].v");
        assert!(!after.values().any(|p| p.starts_with("l[10]")));
    }

    #[tokio::test]
    async fn test_rewrite_descendants_skips_longer_index() {
        let items = (0..11).map(|i| collection(None, vec![int(Some("v"), i)])).collect();
        let (repo, pk, _dir) = store(vec![list("l", items)]).await;
        let before = paths(&repo, pk).await;

        let mut conn = repo.pool().acquire().await.unwrap();
        let moved = rewrite_descendants(&mut conn, repo.dialect(), pk, "l[1]", "m[1]").await.unwrap();
        assert_eq!(moved, 1);
        drop(conn);

        let after = paths(&repo, pk).await;
        assert_eq!(after[&id_of(&before, "l[1].v")], "m[1].v");
        assert_eq!(after[&id_of(&before, "l[10].v")], "l[10].v");
        assert_eq!(after[&id_of(&before, "l[1]")], "l[1]");
    }
}
