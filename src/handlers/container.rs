// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Containers: SubmodelElementCollection, SubmodelElementList and Entity.
//!
//! Only the container's own columns live here. Children are separate element
//! rows linked through `parent_sme_id`; value-only updates of child values
//! are dispatched by the value-only engine.

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
    ElementMeta, Entity, EntityType, ModelType, SpecificAssetId, SubmodelElement,
    SubmodelElementCollection, SubmodelElementList,
};
use crate::storage::rows::{to_json, SqlValue};
use crate::value_type::ValueTypeMapper;

pub static LIST_TABLE: SideTable = SideTable {
    table: "submodel_element_list",
    alias: "lst",
    columns: &[
        "order_relevant",
        "semantic_id_list_element_payload",
        "type_value_list_element",
        "value_type_list_element",
    ],
};

pub static ENTITY_TABLE: SideTable = SideTable {
    table: "entity_element",
    alias: "ent",
    columns: &["entity_type", "global_asset_id", "specific_asset_ids_payload"],
};

fn flag(value: Option<bool>) -> SqlValue {
    SqlValue::from(value.map(i64::from))
}

pub struct CollectionHandler;

#[async_trait]
impl ElementHandler for CollectionHandler {
    fn model_type(&self) -> ModelType {
        ModelType::SubmodelElementCollection
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        None
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        match element {
            SubmodelElement::SubmodelElementCollection(_) => Ok(None),
            other => Err(mismatch(self.model_type(), other)),
        }
    }

    fn build(&self, meta: ElementMeta, _row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        Ok(SubmodelElement::SubmodelElementCollection(SubmodelElementCollection { meta, value: None }))
    }

    async fn update_value_only(
        &self,
        _conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        if !value.is_object() {
            return Err(wrong_shape(target, "an object keyed by idShort"));
        }
        Ok(())
    }
}

pub struct ListHandler;

#[async_trait]
impl ElementHandler for ListHandler {
    fn model_type(&self) -> ModelType {
        ModelType::SubmodelElementList
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&LIST_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::SubmodelElementList(l) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(
            &LIST_TABLE,
            vec![
                flag(l.order_relevant),
                SqlValue::from(to_json(&l.semantic_id_list_element)?),
                SqlValue::text(l.type_value_list_element.as_str()),
                SqlValue::from(l.value_type_list_element.map(|t| t.as_str().to_string())),
            ],
        )))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &LIST_TABLE);
        Ok(SubmodelElement::SubmodelElementList(SubmodelElementList {
            meta,
            order_relevant: side.int("order_relevant")?.map(|v| v != 0),
            semantic_id_list_element: side.json("semantic_id_list_element_payload")?,
            type_value_list_element: side.required_parsed("type_value_list_element")?,
            value_type_list_element: side.parsed("value_type_list_element")?,
            value: None,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::SubmodelElementList(l) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = vec![("type_value_list_element", SqlValue::text(l.type_value_list_element.as_str()))];
        if l.order_relevant.is_some() {
            columns.push(("order_relevant", flag(l.order_relevant)));
        }
        if l.semantic_id_list_element.is_some() {
            columns.push(("semantic_id_list_element_payload", SqlValue::from(to_json(&l.semantic_id_list_element)?)));
        }
        if let Some(t) = l.value_type_list_element {
            columns.push(("value_type_list_element", SqlValue::text(t.as_str())));
        }
        Ok(columns)
    }

    async fn update_value_only(
        &self,
        _conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        if !value.is_array() {
            return Err(wrong_shape(target, "an array"));
        }
        Ok(())
    }
}

pub struct EntityHandler;

#[async_trait]
impl ElementHandler for EntityHandler {
    fn model_type(&self) -> ModelType {
        ModelType::Entity
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&ENTITY_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::Entity(e) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(
            &ENTITY_TABLE,
            vec![
                SqlValue::from(e.entity_type.map(|t| t.as_str().to_string())),
                SqlValue::from(e.global_asset_id.clone()),
                SqlValue::from(to_json(&e.specific_asset_ids)?),
            ],
        )))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &ENTITY_TABLE);
        Ok(SubmodelElement::Entity(Entity {
            meta,
            entity_type: side.parsed("entity_type")?,
            global_asset_id: side.text("global_asset_id")?,
            specific_asset_ids: side.json("specific_asset_ids_payload")?,
            statements: None,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::Entity(e) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = Vec::new();
        if let Some(t) = e.entity_type {
            columns.push(("entity_type", SqlValue::text(t.as_str())));
        }
        if e.global_asset_id.is_some() {
            columns.push(("global_asset_id", SqlValue::from(e.global_asset_id.clone())));
        }
        if e.specific_asset_ids.is_some() {
            columns.push(("specific_asset_ids_payload", SqlValue::from(to_json(&e.specific_asset_ids)?)));
        }
        Ok(columns)
    }

    /// Writes whichever of `entityType`, `globalAssetId` and
    /// `specificAssetIds` are present. `statements` belong to the children.
    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let obj = value
            .as_object()
            .ok_or_else(|| wrong_shape(target, "an object {statements, entityType, globalAssetId, specificAssetIds}"))?;
        let mut columns = Vec::new();
        if let Some(raw) = obj.get("entityType") {
            let entity_type: EntityType = parse_value(target, raw, "a known entityType")?;
            columns.push(("entity_type", SqlValue::text(entity_type.as_str())));
        }
        if let Some(raw) = obj.get("globalAssetId") {
            let id: Option<String> = parse_value(target, raw, "a string globalAssetId")?;
            columns.push(("global_asset_id", SqlValue::from(id)));
        }
        if let Some(raw) = obj.get("specificAssetIds") {
            let ids: Option<Vec<SpecificAssetId>> = parse_value(target, raw, "an array of specificAssetIds")?;
            columns.push(("specific_asset_ids_payload", SqlValue::from(to_json(&ids)?)));
        }
        update_columns(conn, ENTITY_TABLE.table, target.id, columns).await
    }
}
