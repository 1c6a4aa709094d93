// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! RelationshipElement and AnnotatedRelationshipElement.
//!
//! Both variants store `first`/`second` in the same side table. Annotations
//! are ordinary child elements and are written by the batch inserter.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;

use super::{
    mismatch, parse_value, update_columns, wrong_shape, ElementHandler, ElementTarget, InsertPart,
    SideRow, SideTable,
};
use crate::error::StoreError;
use crate::model::{
    AnnotatedRelationshipElement, ElementMeta, ModelType, Reference, RelationshipElement,
    SubmodelElement,
};
use crate::storage::rows::SqlValue;
use crate::value_type::ValueTypeMapper;

pub static RELATIONSHIP_TABLE: SideTable = SideTable {
    table: "relationship_element",
    alias: "rel",
    columns: &["first_payload", "second_payload"],
};

fn reference_json(reference: &Reference) -> Result<SqlValue, StoreError> {
    Ok(SqlValue::text(serde_json::to_string(reference)?))
}

fn ends(first: &Reference, second: &Reference) -> Result<InsertPart, StoreError> {
    Ok(InsertPart::new(
        &RELATIONSHIP_TABLE,
        vec![reference_json(first)?, reference_json(second)?],
    ))
}

fn read_ends(row: &AnyRow) -> Result<(Reference, Reference), StoreError> {
    let side = SideRow::new(row, &RELATIONSHIP_TABLE);
    Ok((side.required_json("first_payload")?, side.required_json("second_payload")?))
}

/// Columns for a `{first, second}` value; either may be omitted.
fn value_columns(target: &ElementTarget, value: &Value) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
    let expected = "an object {first, second}";
    let obj = value.as_object().ok_or_else(|| wrong_shape(target, expected))?;
    let mut columns = Vec::new();
    if let Some(first) = obj.get("first") {
        let first: Reference = parse_value(target, first, "a Reference for 'first'")?;
        columns.push(("first_payload", reference_json(&first)?));
    }
    if let Some(second) = obj.get("second") {
        let second: Reference = parse_value(target, second, "a Reference for 'second'")?;
        columns.push(("second_payload", reference_json(&second)?));
    }
    Ok(columns)
}

pub struct RelationshipHandler;

#[async_trait]
impl ElementHandler for RelationshipHandler {
    fn model_type(&self) -> ModelType {
        ModelType::RelationshipElement
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&RELATIONSHIP_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::RelationshipElement(r) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(ends(&r.first, &r.second)?))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let (first, second) = read_ends(row)?;
        Ok(SubmodelElement::RelationshipElement(RelationshipElement { meta, first, second }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::RelationshipElement(r) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(vec![("first_payload", reference_json(&r.first)?), ("second_payload", reference_json(&r.second)?)])
    }

    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let columns = value_columns(target, value)?;
        update_columns(conn, RELATIONSHIP_TABLE.table, target.id, columns).await
    }
}

pub struct AnnotatedRelationshipHandler;

#[async_trait]
impl ElementHandler for AnnotatedRelationshipHandler {
    fn model_type(&self) -> ModelType {
        ModelType::AnnotatedRelationshipElement
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&RELATIONSHIP_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::AnnotatedRelationshipElement(a) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(ends(&a.first, &a.second)?))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let (first, second) = read_ends(row)?;
        Ok(SubmodelElement::AnnotatedRelationshipElement(AnnotatedRelationshipElement {
            meta,
            first,
            second,
            annotations: None,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::AnnotatedRelationshipElement(a) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(vec![("first_payload", reference_json(&a.first)?), ("second_payload", reference_json(&a.second)?)])
    }

    /// Only `first`/`second` are written here; annotation values are
    /// dispatched to the annotation elements by the value-only engine.
    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let columns = value_columns(target, value)?;
        update_columns(conn, RELATIONSHIP_TABLE.table, target.id, columns).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn target() -> ElementTarget {
        ElementTarget { id: 7, path: "link".into(), model_type: ModelType::RelationshipElement, value_type: None }
    }

    #[test]
    fn test_value_columns_accept_partial_object() {
        let v = json!({"first": {"type": "ExternalReference", "keys": [{"type": "GlobalReference", "value": "urn:a"}]}});
        let columns = value_columns(&target(), &v).unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].0, "first_payload");
    }

    #[test]
    fn test_value_columns_reject_bad_shapes() {
        assert!(value_columns(&target(), &json!([1])).unwrap_err().is_bad_request());
        assert!(value_columns(&target(), &json!({"first": "nope"})).unwrap_err().is_bad_request());
    }

    #[test]
    fn test_both_variants_share_one_table() {
        assert_eq!(
            RelationshipHandler.side_table().map(|t| t.table),
            AnnotatedRelationshipHandler.side_table().map(|t| t.table)
        );
    }
}
