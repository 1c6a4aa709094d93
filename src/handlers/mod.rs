// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Element-type handler registry.
//!
//! Every element variant has one [`ElementHandler`] that knows its side table:
//! how to turn an element into a side row for bulk insert, how to build the
//! element back from a joined read row, and how to apply full, patch and
//! value-only updates. Common fields (category, payload JSON, semantic id) are
//! handled once in [`base`].
//!
//! ```text
//!            ┌──────────────── HandlerRegistry ────────────────┐
//!  ModelType │ Property → PropertyHandler   → property_element │
//!  or code ──┤ Range    → RangeHandler      → range_element    │
//!            │ ...                                             │
//!            │ Collection → CollectionHandler → (none)         │
//!            └─────────────────────────────────────────────────┘
//! ```

pub mod base;
pub mod container;
pub mod data;
pub mod event;
pub mod property;
pub mod relationship;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::insert::{BatchInserter, InsertContext};
use crate::error::StoreError;
use crate::model::{DataTypeDefXsd, ElementMeta, ModelType, SubmodelElement};
use crate::storage::rows::{self, bind_value, bulk_insert, SqlValue};
use crate::value_type::{ValueTypeMapper, XsdValueMapper};

/// How an update treats fields absent from the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Absent optional fields are cleared.
    FullReplace,
    /// Absent fields are left untouched.
    Patch,
}

impl UpdateMode {
    /// Whether a field with this request value is written.
    pub fn touches<T>(&self, field: &Option<T>) -> bool {
        matches!(self, UpdateMode::FullReplace) || field.is_some()
    }

    pub fn is_full_replace(&self) -> bool {
        matches!(self, UpdateMode::FullReplace)
    }
}

/// Read-side description of a variant's side table.
#[derive(Debug)]
pub struct SideTable {
    pub table: &'static str,
    /// Join alias; also prefixes the selected column labels.
    pub alias: &'static str,
    /// Columns other than `id`.
    pub columns: &'static [&'static str],
}

impl SideTable {
    fn select_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("{a}.{c} AS {a}_{c}", a = self.alias, c = c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn join_clause(&self) -> String {
        format!("LEFT JOIN {t} {a} ON {a}.id = e.id", t = self.table, a = self.alias)
    }
}

/// Side row of one element, ready for grouping into a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertPart {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    /// One value per column, `id` excluded.
    pub values: Vec<SqlValue>,
}

impl InsertPart {
    pub fn new(table: &SideTable, values: Vec<SqlValue>) -> Self {
        Self { table: table.table, columns: table.columns, values }
    }
}

/// A persisted element addressed by a write.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementTarget {
    pub id: i64,
    pub path: String,
    pub model_type: ModelType,
    /// Stored value type of a Property or Range.
    pub value_type: Option<DataTypeDefXsd>,
}

/// The columns of one side table inside a joined read row.
pub struct SideRow<'r> {
    row: &'r AnyRow,
    alias: &'static str,
}

impl<'r> SideRow<'r> {
    pub fn new(row: &'r AnyRow, table: &SideTable) -> Self {
        Self { row, alias: table.alias }
    }

    fn label(&self, column: &str) -> String {
        format!("{}_{}", self.alias, column)
    }

    pub fn text(&self, column: &str) -> Result<Option<String>, StoreError> {
        rows::get_text(self.row, &self.label(column))
    }

    pub fn required_text(&self, column: &str) -> Result<String, StoreError> {
        rows::get_required_text(self.row, &self.label(column))
    }

    pub fn int(&self, column: &str) -> Result<Option<i64>, StoreError> {
        rows::get_i64(self.row, &self.label(column))
    }

    pub fn bytes(&self, column: &str) -> Result<Option<Vec<u8>>, StoreError> {
        rows::get_bytes(self.row, &self.label(column))
    }

    pub fn json<T: DeserializeOwned>(&self, column: &str) -> Result<Option<T>, StoreError> {
        rows::get_json(self.row, &self.label(column))
    }

    pub fn required_json<T: DeserializeOwned>(&self, column: &str) -> Result<T, StoreError> {
        self.json(column)?
            .ok_or_else(|| StoreError::Internal(format!("column {} is unexpectedly NULL", self.label(column))))
    }

    /// Parse a stored enum label.
    pub fn parsed<T: std::str::FromStr<Err = String>>(&self, column: &str) -> Result<Option<T>, StoreError> {
        self.text(column)?
            .map(|t| t.parse::<T>().map_err(|e| StoreError::internal("decode stored label", e)))
            .transpose()
    }

    pub fn required_parsed<T: std::str::FromStr<Err = String>>(&self, column: &str) -> Result<T, StoreError> {
        self.parsed(column)?
            .ok_or_else(|| StoreError::Internal(format!("column {} is unexpectedly NULL", self.label(column))))
    }
}

/// `UPDATE table SET a = ?, b = ? WHERE id = ?`; no-op without columns.
pub async fn update_columns(
    conn: &mut AnyConnection,
    table: &str,
    id: i64,
    columns: Vec<(&'static str, SqlValue)>,
) -> Result<(), StoreError> {
    if columns.is_empty() {
        return Ok(());
    }
    let assignments = columns
        .iter()
        .map(|(c, _)| format!("{} = ?", c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, assignments);
    let mut query = sqlx::query(&sql);
    for (_, value) in columns {
        query = bind_value(query, value);
    }
    query
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::from_write(&format!("update {}", table), e))?;
    Ok(())
}

/// A JSON value of the wrong shape for a value-only update.
pub(crate) fn wrong_shape(target: &ElementTarget, expected: &str) -> StoreError {
    StoreError::BadRequest(format!(
        "value for {} '{}' must be {}",
        target.model_type, target.path, expected
    ))
}

pub(crate) fn parse_value<T: DeserializeOwned>(target: &ElementTarget, value: &Value, expected: &str) -> Result<T, StoreError> {
    serde_json::from_value(value.clone()).map_err(|_| wrong_shape(target, expected))
}

pub(crate) fn mismatch(expected: ModelType, element: &SubmodelElement) -> StoreError {
    StoreError::Internal(format!(
        "{} handler received a {}",
        expected,
        element.model_type()
    ))
}

/// Per-variant persistence behavior.
#[async_trait]
pub trait ElementHandler: Send + Sync {
    fn model_type(&self) -> ModelType;

    /// Side table, or `None` for variants with no own columns.
    fn side_table(&self) -> Option<&'static SideTable>;

    /// Side row for a new element.
    fn insert_part(
        &self,
        element: &SubmodelElement,
        mapper: &dyn ValueTypeMapper,
    ) -> Result<Option<InsertPart>, StoreError>;

    /// Build the element from its meta and the joined read row. Children are
    /// attached later by the reconstruction engine.
    fn build(
        &self,
        meta: ElementMeta,
        row: &AnyRow,
        mapper: &dyn ValueTypeMapper,
    ) -> Result<SubmodelElement, StoreError>;

    /// Side columns a patch writes: only fields present in the request.
    fn patch_columns(
        &self,
        _element: &SubmodelElement,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        Ok(Vec::new())
    }

    /// Type-specific update. A full replace rewrites the whole side row.
    async fn update(
        &self,
        conn: &mut AnyConnection,
        id: i64,
        element: &SubmodelElement,
        mode: UpdateMode,
        mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let table = match self.side_table() {
            Some(table) => table,
            None => return Ok(()),
        };
        match mode {
            UpdateMode::FullReplace => {
                self.delete(conn, id).await?;
                if let Some(part) = self.insert_part(element, mapper)? {
                    let mut columns = vec!["id"];
                    columns.extend_from_slice(part.columns);
                    let mut values = vec![SqlValue::int(id)];
                    values.extend(part.values);
                    bulk_insert(conn, part.table, &columns, vec![values]).await?;
                }
                Ok(())
            }
            UpdateMode::Patch => {
                let columns = self.patch_columns(element, mapper)?;
                update_columns(conn, table.table, id, columns).await
            }
        }
    }

    /// Apply a ValueOnly JSON value to this element's own columns.
    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError>;

    /// Remove the side row.
    async fn delete(&self, conn: &mut AnyConnection, id: i64) -> Result<(), StoreError> {
        if let Some(table) = self.side_table() {
            sqlx::query(&format!("DELETE FROM {} WHERE id = ?", table.table))
                .bind(id)
                .execute(&mut *conn)
                .await
                .map_err(|e| StoreError::internal(&format!("delete from {}", table.table), e))?;
        }
        Ok(())
    }

    /// Insert the element (and its subtree) as a new top-level element at
    /// `position`. Returns its path.
    async fn create(
        &self,
        conn: &mut AnyConnection,
        inserter: &BatchInserter<'_>,
        submodel_pk: i64,
        element: SubmodelElement,
        position: i64,
    ) -> Result<String, StoreError> {
        self.create_nested(conn, inserter, submodel_pk, InsertContext::top_level(position), element)
            .await
    }

    /// Insert the element (and its subtree) below an existing parent.
    async fn create_nested(
        &self,
        conn: &mut AnyConnection,
        inserter: &BatchInserter<'_>,
        submodel_pk: i64,
        ctx: InsertContext,
        element: SubmodelElement,
    ) -> Result<String, StoreError> {
        if element.model_type() != self.model_type() {
            return Err(mismatch(self.model_type(), &element));
        }
        let inserted = inserter.insert(conn, submodel_pk, &ctx, vec![element]).await?;
        inserted
            .into_iter()
            .find(|n| n.depth == 0)
            .map(|n| n.path)
            .ok_or_else(|| StoreError::Internal("insert returned no root".into()))
    }
}

/// Maps model types (and persisted type codes) to handlers.
pub struct HandlerRegistry {
    handlers: HashMap<ModelType, Arc<dyn ElementHandler>>,
    mapper: Arc<dyn ValueTypeMapper>,
    select_sql: String,
}

impl HandlerRegistry {
    pub fn new(mapper: Arc<dyn ValueTypeMapper>) -> Self {
        let all: Vec<Arc<dyn ElementHandler>> = vec![
            Arc::new(property::PropertyHandler),
            Arc::new(property::MultiLanguagePropertyHandler),
            Arc::new(property::RangeHandler),
            Arc::new(data::BlobHandler),
            Arc::new(data::FileHandler),
            Arc::new(data::ReferenceElementHandler),
            Arc::new(relationship::RelationshipHandler),
            Arc::new(relationship::AnnotatedRelationshipHandler),
            Arc::new(event::OperationHandler),
            Arc::new(event::CapabilityHandler),
            Arc::new(event::BasicEventHandler),
            Arc::new(container::CollectionHandler),
            Arc::new(container::ListHandler),
            Arc::new(container::EntityHandler),
        ];
        let handlers: HashMap<ModelType, Arc<dyn ElementHandler>> =
            all.into_iter().map(|h| (h.model_type(), h)).collect();
        let select_sql = build_select(&handlers);
        Self { handlers, mapper, select_sql }
    }

    pub fn get(&self, model_type: ModelType) -> Result<&dyn ElementHandler, StoreError> {
        self.handlers
            .get(&model_type)
            .map(|h| h.as_ref())
            .ok_or_else(|| StoreError::Internal(format!("no handler registered for {}", model_type)))
    }

    /// Lookup by persisted type code; unknown codes are Internal.
    pub fn by_code(&self, code: i64) -> Result<&dyn ElementHandler, StoreError> {
        let model_type = ModelType::from_code(code)
            .ok_or_else(|| StoreError::Internal(format!("unknown model type code {}", code)))?;
        self.get(model_type)
    }

    pub fn mapper(&self) -> &dyn ValueTypeMapper {
        self.mapper.as_ref()
    }

    /// `SELECT ... FROM submodel_element e LEFT JOIN ...`, without a WHERE clause.
    pub fn select_sql(&self) -> &str {
        &self.select_sql
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(XsdValueMapper))
    }
}

fn build_select(handlers: &HashMap<ModelType, Arc<dyn ElementHandler>>) -> String {
    // Variants may share a table; join each table once, in a stable order.
    let mut tables: Vec<&'static SideTable> = Vec::new();
    for model_type in ModelType::ALL {
        if let Some(table) = handlers.get(&model_type).and_then(|h| h.side_table()) {
            if !tables.iter().any(|t| t.table == table.table) {
                tables.push(table);
            }
        }
    }

    let mut select = vec![base::select_list()];
    select.extend(tables.iter().map(|t| t.select_list()));
    let mut sql = format!("SELECT {} FROM submodel_element e {}", select.join(", "), base::join_clause());
    for table in tables {
        sql.push(' ');
        sql.push_str(&table.join_clause());
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_model_type_has_a_handler() {
        let registry = HandlerRegistry::default();
        for t in ModelType::ALL {
            assert_eq!(registry.get(t).unwrap().model_type(), t);
            assert_eq!(registry.by_code(t.code()).unwrap().model_type(), t);
        }
        assert!(matches!(registry.by_code(99), Err(StoreError::Internal(_))));
    }

    #[test]
    fn test_select_joins_shared_tables_once() {
        let registry = HandlerRegistry::default();
        let sql = registry.select_sql();
        assert_eq!(sql.matches("LEFT JOIN relationship_element").count(), 1);
        assert!(sql.contains("LEFT JOIN property_element prop ON prop.id = e.id"));
        assert!(sql.contains("prop.value_type AS prop_value_type"));
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn test_update_mode_touches() {
        assert!(UpdateMode::FullReplace.touches::<String>(&None));
        assert!(!UpdateMode::Patch.touches::<String>(&None));
        assert!(UpdateMode::Patch.touches(&Some(1)));
    }
}
