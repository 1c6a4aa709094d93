// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fields every element carries: category on the element row, the JSON
//! payload row, and the semantic id.

use sqlx::any::AnyRow;
use sqlx::AnyConnection;

use super::UpdateMode;
use crate::error::StoreError;
use crate::model::{ElementMeta, ModelType, Reference};
use crate::storage::references::SqlReferenceStore;
use crate::storage::rows::{
    bind_value, get_i64, get_json, get_json_array, get_required_i64, get_required_text, get_text,
    placeholders, to_json_array, SqlValue,
};
use crate::storage::Dialect;

pub const PAYLOAD_TABLE: &str = "submodel_element_payload";

/// Payload columns other than `element_id`.
pub const PAYLOAD_COLUMNS: [&str; 7] = [
    "description_payload",
    "displayname_payload",
    "administration_payload",
    "embedded_data_specification_payload",
    "supplemental_semantic_ids_payload",
    "extensions_payload",
    "qualifiers_payload",
];

/// Elements carry no administration; the column holds JSON null.
const NO_ADMINISTRATION: &str = "null";

/// Base columns of the element read query, labelled `sme_*`, `pl_*`, `sp_*`, `sh_*`.
pub fn select_list() -> String {
    let mut cols = vec![
        "e.id AS sme_id".to_string(),
        "e.parent_sme_id AS sme_parent_id".to_string(),
        "e.root_sme_id AS sme_root_id".to_string(),
        "e.position AS sme_position".to_string(),
        "e.id_short AS sme_id_short".to_string(),
        "e.category AS sme_category".to_string(),
        "e.model_type AS sme_model_type".to_string(),
        "e.idshort_path AS sme_path".to_string(),
    ];
    cols.extend(PAYLOAD_COLUMNS.iter().map(|c| format!("pl.{c} AS pl_{c}", c = c)));
    cols.push("sp.snapshot AS sp_snapshot".to_string());
    cols.push("sh.owner_id AS sh_owner_id".to_string());
    cols.join(", ")
}

pub fn join_clause() -> String {
    format!(
        "LEFT JOIN {} pl ON pl.element_id = e.id \
         LEFT JOIN submodel_element_semantic_id_payload sp ON sp.owner_id = e.id \
         LEFT JOIN submodel_element_semantic_id_reference sh ON sh.owner_id = e.id AND sh.depth = 0",
        PAYLOAD_TABLE
    )
}

/// Structural columns of one element row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowHeader {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub root_id: Option<i64>,
    pub position: i64,
    pub model_type_code: i64,
    pub path: String,
}

pub fn header_from_row(row: &AnyRow) -> Result<RowHeader, StoreError> {
    Ok(RowHeader {
        id: get_required_i64(row, "sme_id")?,
        parent_id: get_i64(row, "sme_parent_id")?,
        root_id: get_i64(row, "sme_root_id")?,
        position: get_required_i64(row, "sme_position")?,
        model_type_code: get_required_i64(row, "sme_model_type")?,
        path: get_required_text(row, "sme_path")?,
    })
}

/// Shared meta from the joined row. The flag is set when the semantic id has
/// normalized rows but no snapshot and must be resolved through the fallback.
pub fn meta_from_row(row: &AnyRow) -> Result<(ElementMeta, bool), StoreError> {
    let semantic_id: Option<Reference> = get_json(row, "sp_snapshot")?;
    let has_header = get_i64(row, "sh_owner_id")?.is_some();
    let needs_fallback = semantic_id.is_none() && has_header;
    let meta = ElementMeta {
        id_short: get_text(row, "sme_id_short")?,
        category: get_text(row, "sme_category")?,
        semantic_id,
        supplemental_semantic_ids: get_json_array(row, "pl_supplemental_semantic_ids_payload")?,
        qualifiers: get_json_array(row, "pl_qualifiers_payload")?,
        extensions: get_json_array(row, "pl_extensions_payload")?,
        display_name: get_json_array(row, "pl_displayname_payload")?,
        description: get_json_array(row, "pl_description_payload")?,
        embedded_data_specifications: get_json_array(row, "pl_embedded_data_specification_payload")?,
    };
    Ok((meta, needs_fallback))
}

/// Payload column values for a new element, in [`PAYLOAD_COLUMNS`] order.
pub fn payload_values(meta: &ElementMeta) -> Result<Vec<SqlValue>, StoreError> {
    Ok(vec![
        SqlValue::text(to_json_array(&meta.description)?),
        SqlValue::text(to_json_array(&meta.display_name)?),
        SqlValue::text(NO_ADMINISTRATION),
        SqlValue::text(to_json_array(&meta.embedded_data_specifications)?),
        SqlValue::text(to_json_array(&meta.supplemental_semantic_ids)?),
        SqlValue::text(to_json_array(&meta.extensions)?),
        SqlValue::text(to_json_array(&meta.qualifiers)?),
    ])
}

/// Base-row values `(submodel_id, position, id_short, category, model_type, idshort_path)`.
pub fn element_values(
    submodel_pk: i64,
    position: i64,
    meta: &ElementMeta,
    model_type: ModelType,
    path: &str,
) -> Vec<SqlValue> {
    vec![
        SqlValue::int(submodel_pk),
        SqlValue::int(position),
        SqlValue::from(meta.id_short.clone()),
        SqlValue::from(meta.category.clone()),
        SqlValue::int(model_type.code()),
        SqlValue::text(path),
    ]
}

pub const ELEMENT_COLUMNS: [&str; 6] =
    ["submodel_id", "position", "id_short", "category", "model_type", "idshort_path"];

/// Apply the common fields of an update. The idShort is not touched here;
/// renames go through the path mutation engine.
pub async fn update_base(
    conn: &mut AnyConnection,
    dialect: Dialect,
    references: &SqlReferenceStore,
    id: i64,
    meta: &ElementMeta,
    mode: UpdateMode,
) -> Result<(), StoreError> {
    if mode.touches(&meta.category) {
        sqlx::query("UPDATE submodel_element SET category = ? WHERE id = ?")
            .bind(meta.category.clone())
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("update element category", e))?;
    }

    // Rows written before the payload table existed have no payload row yet.
    let defaults = payload_values(&ElementMeta::default())?;
    let sql = format!(
        "{} INTO {} (element_id, {}) VALUES (?, {})",
        dialect.insert_ignore(),
        PAYLOAD_TABLE,
        PAYLOAD_COLUMNS.join(", "),
        placeholders(PAYLOAD_COLUMNS.len())
    );
    let mut query = sqlx::query(&sql).bind(id);
    for value in defaults {
        query = bind_value(query, value);
    }
    query
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::internal("ensure element payload", e))?;

    let mut columns: Vec<(&'static str, SqlValue)> = Vec::new();
    if mode.touches(&meta.description) {
        columns.push(("description_payload", SqlValue::text(to_json_array(&meta.description)?)));
    }
    if mode.touches(&meta.display_name) {
        columns.push(("displayname_payload", SqlValue::text(to_json_array(&meta.display_name)?)));
    }
    if mode.touches(&meta.embedded_data_specifications) {
        columns.push((
            "embedded_data_specification_payload",
            SqlValue::text(to_json_array(&meta.embedded_data_specifications)?),
        ));
    }
    if mode.touches(&meta.supplemental_semantic_ids) {
        columns.push((
            "supplemental_semantic_ids_payload",
            SqlValue::text(to_json_array(&meta.supplemental_semantic_ids)?),
        ));
    }
    if mode.touches(&meta.extensions) {
        columns.push(("extensions_payload", SqlValue::text(to_json_array(&meta.extensions)?)));
    }
    if mode.touches(&meta.qualifiers) {
        columns.push(("qualifiers_payload", SqlValue::text(to_json_array(&meta.qualifiers)?)));
    }
    if !columns.is_empty() {
        let assignments = columns
            .iter()
            .map(|(c, _)| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {} SET {} WHERE element_id = ?", PAYLOAD_TABLE, assignments);
        let mut query = sqlx::query(&sql);
        for (_, value) in columns {
            query = bind_value(query, value);
        }
        query
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::internal("update element payload", e))?;
    }

    if mode.touches(&meta.semantic_id) {
        references.replace(conn, id, meta.semantic_id.as_ref()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LangString;

    #[test]
    fn test_payload_values_default_to_empty_arrays() {
        let values = payload_values(&ElementMeta::default()).unwrap();
        assert_eq!(values.len(), PAYLOAD_COLUMNS.len());
        assert_eq!(values[0], SqlValue::text("[]"));
        assert_eq!(values[2], SqlValue::text("null"));
    }

    #[test]
    fn test_payload_values_serialize_description() {
        let meta = ElementMeta {
            description: Some(vec![LangString::new("en", "Temperature")]),
            ..Default::default()
        };
        let values = payload_values(&meta).unwrap();
        assert_eq!(values[0], SqlValue::text(r#"[{"language":"en","text":"Temperature"}]"#));
    }

    #[test]
    fn test_select_list_labels() {
        let select = select_list();
        assert!(select.starts_with("e.id AS sme_id"));
        assert!(select.contains("pl.qualifiers_payload AS pl_qualifiers_payload"));
        assert!(select.contains("sh.owner_id AS sh_owner_id"));
    }

    #[test]
    fn test_element_values_order() {
        let meta = ElementMeta::named("temp");
        let values = element_values(3, 1, &meta, ModelType::Property, "sensor.temp");
        assert_eq!(values.len(), ELEMENT_COLUMNS.len());
        assert_eq!(values[4], SqlValue::int(ModelType::Property.code()));
        assert_eq!(values[5], SqlValue::text("sensor.temp"));
    }
}
