// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Scalar data elements: Property, MultiLanguageProperty and Range.
//!
//! Property and Range values are spread over typed columns by the injected
//! [`ValueTypeMapper`]; see [`crate::value_type`].

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;

use super::{
    mismatch, update_columns, wrong_shape, ElementHandler, ElementTarget, InsertPart, SideRow,
    SideTable,
};
use crate::error::StoreError;
use crate::model::value_only::parse_lang_strings;
use crate::model::{
    DataTypeDefXsd, ElementMeta, ModelType, MultiLanguageProperty, Property, Range, SubmodelElement,
};
use crate::storage::rows::{to_json, SqlValue};
use crate::value_type::{TypedValue, ValueColumn, ValueTypeMapper};

const VALUE_COLUMNS: [&str; 6] = [
    "value_text",
    "value_numeric",
    "value_boolean",
    "value_time",
    "value_date",
    "value_datetime",
];
const MIN_COLUMNS: [&str; 6] = ["min_text", "min_numeric", "min_boolean", "min_time", "min_date", "min_datetime"];
const MAX_COLUMNS: [&str; 6] = ["max_text", "max_numeric", "max_boolean", "max_time", "max_date", "max_datetime"];

pub static PROPERTY_TABLE: SideTable = SideTable {
    table: "property_element",
    alias: "prop",
    columns: &[
        "value_type",
        "value_text",
        "value_numeric",
        "value_boolean",
        "value_time",
        "value_date",
        "value_datetime",
        "value_id_payload",
    ],
};

pub static MULTI_LANGUAGE_TABLE: SideTable = SideTable {
    table: "multilanguage_property_element",
    alias: "mlp",
    columns: &["value_payload", "value_id_payload"],
};

pub static RANGE_TABLE: SideTable = SideTable {
    table: "range_element",
    alias: "rng",
    columns: &[
        "value_type",
        "min_text",
        "min_numeric",
        "min_boolean",
        "min_time",
        "min_date",
        "min_datetime",
        "max_text",
        "max_numeric",
        "max_boolean",
        "max_time",
        "max_date",
        "max_datetime",
    ],
};

/// Read a typed column group (`value_*`, `min_*`, `max_*`).
fn read_typed(side: &SideRow<'_>, prefix: &str) -> Result<TypedValue, StoreError> {
    let mut typed = TypedValue::default();
    for column in ValueColumn::ALL {
        typed.set(column, side.text(&format!("{}_{}", prefix, column.suffix()))?);
    }
    Ok(typed)
}

fn typed_values(typed: &TypedValue) -> Vec<SqlValue> {
    typed.columns().into_iter().map(SqlValue::from).collect()
}

fn typed_assignments(names: &[&'static str; 6], typed: &TypedValue) -> Vec<(&'static str, SqlValue)> {
    names.iter().copied().zip(typed_values(typed)).collect()
}

/// JSON scalar as wire text; `Some(None)` for JSON null, `None` for other shapes.
fn scalar_text(value: &Value) -> Option<Option<String>> {
    match value {
        Value::String(s) => Some(Some(s.clone())),
        Value::Number(n) => Some(Some(n.to_string())),
        Value::Bool(b) => Some(Some(b.to_string())),
        Value::Null => Some(None),
        _ => None,
    }
}

fn stored_value_type(target: &ElementTarget) -> Result<DataTypeDefXsd, StoreError> {
    target
        .value_type
        .ok_or_else(|| StoreError::Internal(format!("{} '{}' has no stored valueType", target.model_type, target.path)))
}

pub struct PropertyHandler;

#[async_trait]
impl ElementHandler for PropertyHandler {
    fn model_type(&self) -> ModelType {
        ModelType::Property
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&PROPERTY_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::Property(p) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let typed = mapper.to_columns(p.value_type, p.value.as_deref())?;
        let mut values = vec![SqlValue::text(p.value_type.as_str())];
        values.extend(typed_values(&typed));
        values.push(SqlValue::from(to_json(&p.value_id)?));
        Ok(Some(InsertPart::new(&PROPERTY_TABLE, values)))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &PROPERTY_TABLE);
        let value_type: DataTypeDefXsd = side.required_parsed("value_type")?;
        let typed = read_typed(&side, "value")?;
        Ok(SubmodelElement::Property(Property {
            meta,
            value_type,
            value: mapper.from_columns(value_type, &typed),
            value_id: side.json("value_id_payload")?,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::Property(p) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = vec![("value_type", SqlValue::text(p.value_type.as_str()))];
        if p.value.is_some() {
            let typed = mapper.to_columns(p.value_type, p.value.as_deref())?;
            columns.extend(typed_assignments(&VALUE_COLUMNS, &typed));
        }
        if p.value_id.is_some() {
            columns.push(("value_id_payload", SqlValue::from(to_json(&p.value_id)?)));
        }
        Ok(columns)
    }

    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let text = scalar_text(value).ok_or_else(|| wrong_shape(target, "a string, number or boolean"))?;
        let typed = mapper.to_columns(stored_value_type(target)?, text.as_deref())?;
        update_columns(conn, PROPERTY_TABLE.table, target.id, typed_assignments(&VALUE_COLUMNS, &typed)).await
    }
}

pub struct MultiLanguagePropertyHandler;

#[async_trait]
impl ElementHandler for MultiLanguagePropertyHandler {
    fn model_type(&self) -> ModelType {
        ModelType::MultiLanguageProperty
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&MULTI_LANGUAGE_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::MultiLanguageProperty(m) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(
            &MULTI_LANGUAGE_TABLE,
            vec![SqlValue::from(to_json(&m.value)?), SqlValue::from(to_json(&m.value_id)?)],
        )))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &MULTI_LANGUAGE_TABLE);
        Ok(SubmodelElement::MultiLanguageProperty(MultiLanguageProperty {
            meta,
            value: side.json("value_payload")?,
            value_id: side.json("value_id_payload")?,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::MultiLanguageProperty(m) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = Vec::new();
        if m.value.is_some() {
            columns.push(("value_payload", SqlValue::from(to_json(&m.value)?)));
        }
        if m.value_id.is_some() {
            columns.push(("value_id_payload", SqlValue::from(to_json(&m.value_id)?)));
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
        let strings = parse_lang_strings(value).ok_or_else(|| wrong_shape(target, "an array of {language: text} objects"))?;
        update_columns(
            conn,
            MULTI_LANGUAGE_TABLE.table,
            target.id,
            vec![("value_payload", SqlValue::from(to_json(&Some(strings))?))],
        )
        .await
    }
}

pub struct RangeHandler;

#[async_trait]
impl ElementHandler for RangeHandler {
    fn model_type(&self) -> ModelType {
        ModelType::Range
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&RANGE_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::Range(r) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let min = mapper.to_columns(r.value_type, r.min.as_deref())?;
        let max = mapper.to_columns(r.value_type, r.max.as_deref())?;
        let mut values = vec![SqlValue::text(r.value_type.as_str())];
        values.extend(typed_values(&min));
        values.extend(typed_values(&max));
        Ok(Some(InsertPart::new(&RANGE_TABLE, values)))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &RANGE_TABLE);
        let value_type: DataTypeDefXsd = side.required_parsed("value_type")?;
        Ok(SubmodelElement::Range(Range {
            meta,
            value_type,
            min: mapper.from_columns(value_type, &read_typed(&side, "min")?),
            max: mapper.from_columns(value_type, &read_typed(&side, "max")?),
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::Range(r) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = vec![("value_type", SqlValue::text(r.value_type.as_str()))];
        if r.min.is_some() {
            columns.extend(typed_assignments(&MIN_COLUMNS, &mapper.to_columns(r.value_type, r.min.as_deref())?));
        }
        if r.max.is_some() {
            columns.extend(typed_assignments(&MAX_COLUMNS, &mapper.to_columns(r.value_type, r.max.as_deref())?));
        }
        Ok(columns)
    }

    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let obj = value.as_object().ok_or_else(|| wrong_shape(target, "an object {min, max}"))?;
        let value_type = stored_value_type(target)?;
        let bound = |key: &str| -> Result<TypedValue, StoreError> {
            let text = match obj.get(key) {
                Some(v) => scalar_text(v).ok_or_else(|| wrong_shape(target, "an object {min, max} of scalars"))?,
                None => None,
            };
            mapper.to_columns(value_type, text.as_deref())
        };
        let mut columns = typed_assignments(&MIN_COLUMNS, &bound("min")?);
        columns.extend(typed_assignments(&MAX_COLUMNS, &bound("max")?));
        update_columns(conn, RANGE_TABLE.table, target.id, columns).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_type::XsdValueMapper;
    use serde_json::json;

    fn property(value: Option<&str>) -> SubmodelElement {
        SubmodelElement::Property(Property {
            meta: ElementMeta::named("temp"),
            value_type: DataTypeDefXsd::Double,
            value: value.map(String::from),
            value_id: None,
        })
    }

    #[test]
    fn test_property_insert_part_uses_numeric_column() {
        let part = PropertyHandler.insert_part(&property(Some("21.5")), &XsdValueMapper).unwrap().unwrap();
        assert_eq!(part.table, "property_element");
        assert_eq!(part.values.len(), part.columns.len());
        assert_eq!(part.values[0], SqlValue::text("xs:double"));
        assert_eq!(part.values[1], SqlValue::null_text());
        assert_eq!(part.values[2], SqlValue::text("21.5"));
    }

    #[test]
    fn test_property_lexical_error_is_bad_request() {
        let err = PropertyHandler.insert_part(&property(Some("warm")), &XsdValueMapper).unwrap_err();
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_property_patch_skips_absent_value() {
        let columns = PropertyHandler.patch_columns(&property(None), &XsdValueMapper).unwrap();
        assert_eq!(columns.len(), 1);
        let columns = PropertyHandler.patch_columns(&property(Some("1")), &XsdValueMapper).unwrap();
        assert_eq!(columns.len(), 7);
    }

    #[test]
    fn test_range_insert_part_width() {
        let range = SubmodelElement::Range(Range {
            meta: ElementMeta::named("r"),
            value_type: DataTypeDefXsd::Int,
            min: Some("1".into()),
            max: None,
        });
        let part = RangeHandler.insert_part(&range, &XsdValueMapper).unwrap().unwrap();
        assert_eq!(part.values.len(), RANGE_TABLE.columns.len());
        assert_eq!(part.values[2], SqlValue::text("1"));
        assert_eq!(part.values[8], SqlValue::null_text());
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!("a")), Some(Some("a".into())));
        assert_eq!(scalar_text(&json!(3)), Some(Some("3".into())));
        assert_eq!(scalar_text(&json!(true)), Some(Some("true".into())));
        assert_eq!(scalar_text(&Value::Null), Some(None));
        assert_eq!(scalar_text(&json!({"x": 1})), None);
    }

    #[test]
    fn test_wrong_handler_is_internal() {
        let mlp = SubmodelElement::MultiLanguageProperty(MultiLanguageProperty {
            meta: ElementMeta::named("m"),
            value: None,
            value_id: None,
        });
        assert!(matches!(
            PropertyHandler.insert_part(&mlp, &XsdValueMapper),
            Err(StoreError::Internal(_))
        ));
    }
}
