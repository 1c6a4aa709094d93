// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tree engines over the flat element table.
//!
//! ```text
//!   write ──► insert::flatten ──► BatchInserter (base rows → back-patch → side rows)
//!   read  ──► reconstruct::load ──► reconstruct::assemble ──► element forest
//!   move  ──► mutation (rename cascade, delete + list re-index)
//!   value ──► value::apply (ValueOnly JSON dispatched down the subtree)
//! ```
//!
//! Every function here takes a `&mut AnyConnection` that is already inside the
//! caller's transaction. Nothing in this module begins or commits.

pub mod insert;
pub mod mutation;
pub mod page;
pub mod reconstruct;
pub mod value;

use sqlx::any::AnyRow;
use sqlx::AnyConnection;

use self::insert::ListTyping;
use crate::error::StoreError;
use crate::handlers::ElementTarget;
use crate::model::{AasSubmodelElements, DataTypeDefXsd, ModelType};
use crate::path;
use crate::storage::rows::{get_i64, get_required_i64, get_required_text, get_text, SqlValue, bind_value};

/// Structural view of one persisted element, enough to address writes.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredElement {
    pub target: ElementTarget,
    pub parent_id: Option<i64>,
    pub root_id: Option<i64>,
    pub position: i64,
    pub id_short: Option<String>,
}

impl StoredElement {
    pub fn id(&self) -> i64 {
        self.target.id
    }

    pub fn path(&self) -> &str {
        &self.target.path
    }

    pub fn model_type(&self) -> ModelType {
        self.target.model_type
    }

    /// Root link children of this element inherit.
    pub fn root_for_children(&self) -> i64 {
        self.root_id.unwrap_or(self.target.id)
    }
}

const INDEX_SELECT: &str = "SELECT e.id, e.parent_sme_id, e.root_sme_id, e.position, e.id_short, \
     e.model_type, e.idshort_path, COALESCE(p.value_type, r.value_type) AS value_type \
     FROM submodel_element e \
     LEFT JOIN property_element p ON p.id = e.id \
     LEFT JOIN range_element r ON r.id = e.id \
     WHERE e.submodel_id = ?";

/// `AND (path = ? OR path in [p., p.+1) OR path in [p[, p[+1))` with its binds.
pub(crate) fn subtree_filter(column: &str, path: &str) -> (String, Vec<SqlValue>) {
    let [dot, bracket] = path::descendant_prefixes(path);
    let (dot_lo, dot_hi) = path::prefix_range(&dot);
    let (br_lo, br_hi) = path::prefix_range(&bracket);
    let clause = format!(
        " AND ({c} = ? OR ({c} >= ? AND {c} < ?) OR ({c} >= ? AND {c} < ?))",
        c = column
    );
    let binds = vec![
        SqlValue::text(path),
        SqlValue::text(dot_lo),
        SqlValue::text(dot_hi),
        SqlValue::text(br_lo),
        SqlValue::text(br_hi),
    ];
    (clause, binds)
}

fn stored_from_row(row: &AnyRow) -> Result<StoredElement, StoreError> {
    let code = get_required_i64(row, "model_type")?;
    let model_type = ModelType::from_code(code)
        .ok_or_else(|| StoreError::Internal(format!("unknown model type code {}", code)))?;
    let value_type = get_text(row, "value_type")?
        .map(|t| t.parse::<DataTypeDefXsd>().map_err(|e| StoreError::internal("decode value type", e)))
        .transpose()?;
    Ok(StoredElement {
        target: ElementTarget {
            id: get_required_i64(row, "id")?,
            path: get_required_text(row, "idshort_path")?,
            model_type,
            value_type,
        },
        parent_id: get_i64(row, "parent_sme_id")?,
        root_id: get_i64(row, "root_sme_id")?,
        position: get_required_i64(row, "position")?,
        id_short: get_text(row, "id_short")?,
    })
}

/// The element stored at `path`, if any.
pub async fn find_element(
    conn: &mut AnyConnection,
    submodel_pk: i64,
    path: &str,
) -> Result<Option<StoredElement>, StoreError> {
    let sql = format!("{} AND e.idshort_path = ?", INDEX_SELECT);
    let row = sqlx::query(&sql)
        .bind(submodel_pk)
        .bind(path)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("find element", e))?;
    row.as_ref().map(stored_from_row).transpose()
}

/// Like [`find_element`], but absence is `NotFound`.
pub async fn require_element(
    conn: &mut AnyConnection,
    submodel_pk: i64,
    path: &str,
) -> Result<StoredElement, StoreError> {
    find_element(conn, submodel_pk, path)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("no element at '{}'", path)))
}

/// The element at `path` and all its descendants, ordered by path.
pub async fn find_subtree(
    conn: &mut AnyConnection,
    submodel_pk: i64,
    path: &str,
) -> Result<Vec<StoredElement>, StoreError> {
    let (clause, binds) = subtree_filter("e.idshort_path", path);
    let sql = format!("{}{} ORDER BY e.idshort_path", INDEX_SELECT, clause);
    let mut query = sqlx::query(&sql).bind(submodel_pk);
    for value in binds {
        query = bind_value(query, value);
    }
    let rows = query
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("find subtree", e))?;
    rows.iter().map(stored_from_row).collect()
}

/// Next free position under `parent_id` (or among top-level elements).
pub async fn next_position(
    conn: &mut AnyConnection,
    submodel_pk: i64,
    parent_id: Option<i64>,
) -> Result<i64, StoreError> {
    let row = match parent_id {
        Some(parent) => sqlx::query(
            "SELECT MAX(position) AS max_position FROM submodel_element WHERE submodel_id = ? AND parent_sme_id = ?",
        )
        .bind(submodel_pk)
        .bind(parent)
        .fetch_one(&mut *conn)
        .await,
        None => sqlx::query(
            "SELECT MAX(position) AS max_position FROM submodel_element WHERE submodel_id = ? AND parent_sme_id IS NULL",
        )
        .bind(submodel_pk)
        .fetch_one(&mut *conn)
        .await,
    }
    .map_err(|e| StoreError::internal("next position", e))?;
    Ok(get_i64(&row, "max_position")?.map_or(0, |max| max + 1))
}

/// Whether any element of the submodel sits at `path`.
pub async fn path_exists(conn: &mut AnyConnection, submodel_pk: i64, path: &str) -> Result<bool, StoreError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS hits FROM submodel_element WHERE submodel_id = ? AND idshort_path = ?",
    )
    .bind(submodel_pk)
    .bind(path)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| StoreError::internal("check path", e))?;
    Ok(get_required_i64(&row, "hits")? > 0)
}

/// Item typing of the stored list `list_id`, `None` when it has no list row.
pub async fn list_typing(conn: &mut AnyConnection, list_id: i64) -> Result<Option<ListTyping>, StoreError> {
    let row = sqlx::query(
        "SELECT type_value_list_element, value_type_list_element FROM submodel_element_list WHERE id = ?",
    )
    .bind(list_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| StoreError::internal("read list typing", e))?;
    let Some(row) = row else {
        return Ok(None);
    };
    let type_value = get_required_text(&row, "type_value_list_element")?
        .parse::<AasSubmodelElements>()
        .map_err(|e| StoreError::internal("decode list typing", e))?;
    let value_type = get_text(&row, "value_type_list_element")?
        .map(|t| t.parse::<DataTypeDefXsd>().map_err(|e| StoreError::internal("decode list typing", e)))
        .transpose()?;
    Ok(Some(ListTyping { type_value, value_type }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtree_filter_binds() {
        let (clause, binds) = subtree_filter("e.idshort_path", "sensor");
        assert_eq!(clause.matches('?').count(), binds.len());
        assert_eq!(binds[0], SqlValue::text("sensor"));
        assert_eq!(binds[1], SqlValue::text("sensor."));
        assert_eq!(binds[2], SqlValue::text("sensor/"));
        assert_eq!(binds[3], SqlValue::text("sensor["));
        assert_eq!(binds[4], SqlValue::text("sensor\\"));
    }

    #[test]
    fn test_root_for_children() {
        let top = StoredElement {
            target: ElementTarget { id: 4, path: "a".into(), model_type: ModelType::SubmodelElementCollection, value_type: None },
            parent_id: None,
            root_id: Some(4),
            position: 0,
            id_short: Some("a".into()),
        };
        assert_eq!(top.root_for_children(), 4);
        let nested = StoredElement { root_id: Some(1), parent_id: Some(2), ..top };
        assert_eq!(nested.root_for_children(), 1);
    }
}
