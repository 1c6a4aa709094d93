// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! BasicEventElement, Operation and Capability.

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
    BasicEventElement, Capability, ElementMeta, ModelType, Operation, Reference, SubmodelElement,
};
use crate::storage::rows::{to_json, SqlValue};
use crate::value_type::ValueTypeMapper;

pub static BASIC_EVENT_TABLE: SideTable = SideTable {
    table: "basic_event_element",
    alias: "bev",
    columns: &[
        "observed_payload",
        "direction",
        "state",
        "message_topic",
        "message_broker_payload",
        "last_update",
        "min_interval",
        "max_interval",
    ],
};

/// Operation variables are stored whole, with their nested elements.
pub static OPERATION_TABLE: SideTable = SideTable {
    table: "operation_element",
    alias: "opr",
    columns: &["input_variables_payload", "output_variables_payload", "inoutput_variables_payload"],
};

fn no_value_only(target: &ElementTarget) -> StoreError {
    StoreError::BadRequest(format!(
        "{} '{}' has no value-only representation",
        target.model_type, target.path
    ))
}

pub struct BasicEventHandler;

#[async_trait]
impl ElementHandler for BasicEventHandler {
    fn model_type(&self) -> ModelType {
        ModelType::BasicEventElement
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&BASIC_EVENT_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::BasicEventElement(b) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(
            &BASIC_EVENT_TABLE,
            vec![
                SqlValue::text(serde_json::to_string(&b.observed)?),
                SqlValue::text(b.direction.as_str()),
                SqlValue::text(b.state.as_str()),
                SqlValue::from(b.message_topic.clone()),
                SqlValue::from(to_json(&b.message_broker)?),
                SqlValue::from(b.last_update.clone()),
                SqlValue::from(b.min_interval.clone()),
                SqlValue::from(b.max_interval.clone()),
            ],
        )))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &BASIC_EVENT_TABLE);
        Ok(SubmodelElement::BasicEventElement(BasicEventElement {
            meta,
            observed: side.required_json("observed_payload")?,
            direction: side.required_parsed("direction")?,
            state: side.required_parsed("state")?,
            message_topic: side.text("message_topic")?,
            message_broker: side.json("message_broker_payload")?,
            last_update: side.text("last_update")?,
            min_interval: side.text("min_interval")?,
            max_interval: side.text("max_interval")?,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::BasicEventElement(b) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = vec![
            ("observed_payload", SqlValue::text(serde_json::to_string(&b.observed)?)),
            ("direction", SqlValue::text(b.direction.as_str())),
            ("state", SqlValue::text(b.state.as_str())),
        ];
        if b.message_topic.is_some() {
            columns.push(("message_topic", SqlValue::from(b.message_topic.clone())));
        }
        if b.message_broker.is_some() {
            columns.push(("message_broker_payload", SqlValue::from(to_json(&b.message_broker)?)));
        }
        if b.last_update.is_some() {
            columns.push(("last_update", SqlValue::from(b.last_update.clone())));
        }
        if b.min_interval.is_some() {
            columns.push(("min_interval", SqlValue::from(b.min_interval.clone())));
        }
        if b.max_interval.is_some() {
            columns.push(("max_interval", SqlValue::from(b.max_interval.clone())));
        }
        Ok(columns)
    }

    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let expected = "an object {observed}";
        let observed = value
            .as_object()
            .and_then(|obj| obj.get("observed"))
            .ok_or_else(|| wrong_shape(target, expected))?;
        let observed: Reference = parse_value(target, observed, expected)?;
        update_columns(
            conn,
            BASIC_EVENT_TABLE.table,
            target.id,
            vec![("observed_payload", SqlValue::text(serde_json::to_string(&observed)?))],
        )
        .await
    }
}

pub struct OperationHandler;

#[async_trait]
impl ElementHandler for OperationHandler {
    fn model_type(&self) -> ModelType {
        ModelType::Operation
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&OPERATION_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::Operation(op) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(
            &OPERATION_TABLE,
            vec![
                SqlValue::from(to_json(&op.input_variables)?),
                SqlValue::from(to_json(&op.output_variables)?),
                SqlValue::from(to_json(&op.inoutput_variables)?),
            ],
        )))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &OPERATION_TABLE);
        Ok(SubmodelElement::Operation(Operation {
            meta,
            input_variables: side.json("input_variables_payload")?,
            output_variables: side.json("output_variables_payload")?,
            inoutput_variables: side.json("inoutput_variables_payload")?,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::Operation(op) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = Vec::new();
        if op.input_variables.is_some() {
            columns.push(("input_variables_payload", SqlValue::from(to_json(&op.input_variables)?)));
        }
        if op.output_variables.is_some() {
            columns.push(("output_variables_payload", SqlValue::from(to_json(&op.output_variables)?)));
        }
        if op.inoutput_variables.is_some() {
            columns.push(("inoutput_variables_payload", SqlValue::from(to_json(&op.inoutput_variables)?)));
        }
        Ok(columns)
    }

    async fn update_value_only(
        &self,
        _conn: &mut AnyConnection,
        target: &ElementTarget,
        _value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        Err(no_value_only(target))
    }
}

pub struct CapabilityHandler;

#[async_trait]
impl ElementHandler for CapabilityHandler {
    fn model_type(&self) -> ModelType {
        ModelType::Capability
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        None
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        match element {
            SubmodelElement::Capability(_) => Ok(None),
            other => Err(mismatch(self.model_type(), other)),
        }
    }

    fn build(&self, meta: ElementMeta, _row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        Ok(SubmodelElement::Capability(Capability { meta }))
    }

    async fn update_value_only(
        &self,
        _conn: &mut AnyConnection,
        target: &ElementTarget,
        _value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        Err(no_value_only(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataTypeDefXsd, Direction, OperationVariable, Property, StateOfEvent};
    use crate::value_type::XsdValueMapper;

    #[test]
    fn test_basic_event_insert_part_stores_labels() {
        let event = SubmodelElement::BasicEventElement(BasicEventElement {
            meta: ElementMeta::named("overheat"),
            observed: Reference::global("urn:temp"),
            direction: Direction::Output,
            state: StateOfEvent::On,
            message_topic: Some("alerts".into()),
            message_broker: None,
            last_update: None,
            min_interval: None,
            max_interval: None,
        });
        let part = BasicEventHandler.insert_part(&event, &XsdValueMapper).unwrap().unwrap();
        assert_eq!(part.values.len(), BASIC_EVENT_TABLE.columns.len());
        assert_eq!(part.values[1], SqlValue::text("output"));
        assert_eq!(part.values[2], SqlValue::text("on"));
        assert_eq!(part.values[4], SqlValue::Text(None));
    }

    #[test]
    fn test_operation_variables_keep_nested_elements() {
        let op = SubmodelElement::Operation(Operation {
            meta: ElementMeta::named("calibrate"),
            input_variables: Some(vec![OperationVariable {
                value: Box::new(SubmodelElement::Property(Property {
                    meta: ElementMeta::named("offset"),
                    value_type: DataTypeDefXsd::Double,
                    value: None,
                    value_id: None,
                })),
            }]),
            output_variables: None,
            inoutput_variables: None,
        });
        let part = OperationHandler.insert_part(&op, &XsdValueMapper).unwrap().unwrap();
        match &part.values[0] {
            SqlValue::Text(Some(json)) => assert!(json.contains("\"idShort\":\"offset\"")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(part.values[1], SqlValue::Text(None));
    }

    #[test]
    fn test_capability_has_no_side_row() {
        let cap = SubmodelElement::Capability(Capability { meta: ElementMeta::named("weld") });
        assert!(CapabilityHandler.insert_part(&cap, &XsdValueMapper).unwrap().is_none());
        assert!(CapabilityHandler.side_table().is_none());
    }
}
