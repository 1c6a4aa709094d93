// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Blob, File and ReferenceElement.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use sqlx::any::AnyRow;
use sqlx::AnyConnection;

use super::{
    mismatch, parse_value, update_columns, wrong_shape, ElementHandler, ElementTarget, InsertPart,
    SideRow, SideTable,
};
use crate::error::StoreError;
use crate::model::{Blob, ElementMeta, File, ModelType, Reference, ReferenceElement, SubmodelElement};
use crate::storage::rows::{to_json, SqlValue};
use crate::value_type::ValueTypeMapper;

pub static BLOB_TABLE: SideTable = SideTable {
    table: "blob_element",
    alias: "blb",
    columns: &["content_type", "value"],
};

pub static FILE_TABLE: SideTable = SideTable {
    table: "file_element",
    alias: "fil",
    columns: &["content_type", "value"],
};

pub static REFERENCE_TABLE: SideTable = SideTable {
    table: "reference_element",
    alias: "refe",
    columns: &["value_payload"],
};

/// `{contentType, value}` as used by Blob and File.
fn content_parts<'v>(target: &ElementTarget, value: &'v Value) -> Result<(String, Option<&'v str>), StoreError> {
    let expected = "an object {contentType, value}";
    let obj = value.as_object().ok_or_else(|| wrong_shape(target, expected))?;
    let content_type = obj
        .get("contentType")
        .and_then(Value::as_str)
        .ok_or_else(|| wrong_shape(target, expected))?
        .to_string();
    let inner = match obj.get("value") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => return Err(wrong_shape(target, expected)),
    };
    Ok((content_type, inner))
}

pub struct BlobHandler;

#[async_trait]
impl ElementHandler for BlobHandler {
    fn model_type(&self) -> ModelType {
        ModelType::Blob
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&BLOB_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::Blob(b) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(
            &BLOB_TABLE,
            vec![SqlValue::text(b.content_type.clone()), SqlValue::Bytes(b.value.clone())],
        )))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &BLOB_TABLE);
        Ok(SubmodelElement::Blob(Blob {
            meta,
            content_type: side.required_text("content_type")?,
            value: side.bytes("value")?,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::Blob(b) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = vec![("content_type", SqlValue::text(b.content_type.clone()))];
        if b.value.is_some() {
            columns.push(("value", SqlValue::Bytes(b.value.clone())));
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
        let (content_type, encoded) = content_parts(target, value)?;
        let bytes = encoded
            .map(|text| STANDARD.decode(text.as_bytes()))
            .transpose()
            .map_err(|_| wrong_shape(target, "base64 content"))?;
        update_columns(
            conn,
            BLOB_TABLE.table,
            target.id,
            vec![("content_type", SqlValue::text(content_type)), ("value", SqlValue::Bytes(bytes))],
        )
        .await
    }
}

pub struct FileHandler;

#[async_trait]
impl ElementHandler for FileHandler {
    fn model_type(&self) -> ModelType {
        ModelType::File
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&FILE_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::File(f) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(
            &FILE_TABLE,
            vec![SqlValue::text(f.content_type.clone()), SqlValue::from(f.value.clone())],
        )))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &FILE_TABLE);
        Ok(SubmodelElement::File(File {
            meta,
            content_type: side.required_text("content_type")?,
            value: side.text("value")?,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::File(f) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        let mut columns = vec![("content_type", SqlValue::text(f.content_type.clone()))];
        if f.value.is_some() {
            columns.push(("value", SqlValue::from(f.value.clone())));
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
        let (content_type, path) = content_parts(target, value)?;
        update_columns(
            conn,
            FILE_TABLE.table,
            target.id,
            vec![
                ("content_type", SqlValue::text(content_type)),
                ("value", SqlValue::from(path.map(String::from))),
            ],
        )
        .await
    }
}

pub struct ReferenceElementHandler;

#[async_trait]
impl ElementHandler for ReferenceElementHandler {
    fn model_type(&self) -> ModelType {
        ModelType::ReferenceElement
    }

    fn side_table(&self) -> Option<&'static SideTable> {
        Some(&REFERENCE_TABLE)
    }

    fn insert_part(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Option<InsertPart>, StoreError> {
        let SubmodelElement::ReferenceElement(r) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        Ok(Some(InsertPart::new(&REFERENCE_TABLE, vec![SqlValue::from(to_json(&r.value)?)])))
    }

    fn build(&self, meta: ElementMeta, row: &AnyRow, _mapper: &dyn ValueTypeMapper) -> Result<SubmodelElement, StoreError> {
        let side = SideRow::new(row, &REFERENCE_TABLE);
        Ok(SubmodelElement::ReferenceElement(ReferenceElement {
            meta,
            value: side.json("value_payload")?,
        }))
    }

    fn patch_columns(&self, element: &SubmodelElement, _mapper: &dyn ValueTypeMapper) -> Result<Vec<(&'static str, SqlValue)>, StoreError> {
        let SubmodelElement::ReferenceElement(r) = element else {
            return Err(mismatch(self.model_type(), element));
        };
        if r.value.is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![("value_payload", SqlValue::from(to_json(&r.value)?))])
    }

    async fn update_value_only(
        &self,
        conn: &mut AnyConnection,
        target: &ElementTarget,
        value: &Value,
        _mapper: &dyn ValueTypeMapper,
    ) -> Result<(), StoreError> {
        let reference: Option<Reference> = if value.is_null() {
            None
        } else {
            Some(parse_value(target, value, "a Reference")?)
        };
        update_columns(
            conn,
            REFERENCE_TABLE.table,
            target.id,
            vec![("value_payload", SqlValue::from(to_json(&reference)?))],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_type::XsdValueMapper;
    use serde_json::json;

    fn target(model_type: ModelType) -> ElementTarget {
        ElementTarget { id: 1, path: "doc".into(), model_type, value_type: None }
    }

    #[test]
    fn test_blob_insert_part_binds_bytes() {
        let blob = SubmodelElement::Blob(Blob {
            meta: ElementMeta::named("raw"),
            content_type: "application/octet-stream".into(),
            value: Some(vec![1, 2, 3]),
        });
        let part = BlobHandler.insert_part(&blob, &XsdValueMapper).unwrap().unwrap();
        assert_eq!(part.values[1], SqlValue::Bytes(Some(vec![1, 2, 3])));
    }

    #[test]
    fn test_content_parts() {
        let t = target(ModelType::File);
        let v = json!({"contentType": "text/plain", "value": "/a.txt"});
        assert_eq!(content_parts(&t, &v).unwrap(), ("text/plain".to_string(), Some("/a.txt")));

        let no_value = json!({"contentType": "text/plain"});
        assert_eq!(content_parts(&t, &no_value).unwrap().1, None);

        assert!(content_parts(&t, &json!("x")).unwrap_err().is_bad_request());
        assert!(content_parts(&t, &json!({"value": "x"})).unwrap_err().is_bad_request());
        assert!(content_parts(&t, &json!({"contentType": "a", "value": 3})).unwrap_err().is_bad_request());
    }

    #[test]
    fn test_reference_patch_without_value_is_noop() {
        let r = SubmodelElement::ReferenceElement(ReferenceElement { meta: ElementMeta::named("r"), value: None });
        assert!(ReferenceElementHandler.patch_columns(&r, &XsdValueMapper).unwrap().is_empty());
    }
}
