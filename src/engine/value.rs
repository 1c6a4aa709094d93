// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! ValueOnly updates.
//!
//! The JSON value is walked alongside the stored subtree. Each element's own
//! columns are written by its handler; container values are split into child
//! values and pushed onto the work stack.

use std::collections::HashMap;

use serde_json::Value;
use sqlx::AnyConnection;
use tracing::debug;

use super::{find_subtree, StoredElement};
use crate::error::StoreError;
use crate::handlers::HandlerRegistry;
use crate::model::ModelType;
use crate::path::compute_path;

/// Child `(path, value)` pairs carried by a container's value.
fn child_values<'v>(element: &StoredElement, value: &'v Value) -> Result<Vec<(String, &'v Value)>, StoreError> {
    let path = element.path();
    let named = |obj: &'v serde_json::Map<String, Value>| -> Vec<(String, &'v Value)> {
        obj.iter().map(|(k, v)| (compute_path(path, false, 0, k), v)).collect()
    };
    let out = match element.model_type() {
        ModelType::SubmodelElementCollection => value.as_object().map(named).unwrap_or_default(),
        ModelType::SubmodelElementList => value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (compute_path(path, true, i, ""), v))
                    .collect()
            })
            .unwrap_or_default(),
        ModelType::Entity => value
            .get("statements")
            .and_then(Value::as_object)
            .map(named)
            .unwrap_or_default(),
        ModelType::AnnotatedRelationshipElement => match value.get("annotations") {
            Some(Value::Object(obj)) => named(obj),
            Some(Value::Array(items)) => {
                let mut out = Vec::new();
                for item in items {
                    let obj = item.as_object().ok_or_else(|| {
                        StoreError::BadRequest(format!(
                            "annotations of '{}' must be objects keyed by idShort",
                            path
                        ))
                    })?;
                    out.extend(named(obj));
                }
                out
            }
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(StoreError::BadRequest(format!(
                    "annotations of '{}' must be an array or object",
                    path
                )))
            }
        },
        _ => Vec::new(),
    };
    Ok(out)
}

/// Apply `value` to the element at `path` and everything it names below.
pub async fn apply(
    conn: &mut AnyConnection,
    registry: &HandlerRegistry,
    submodel_pk: i64,
    path: &str,
    value: &Value,
) -> Result<usize, StoreError> {
    let subtree = find_subtree(conn, submodel_pk, path).await?;
    let by_path: HashMap<&str, &StoredElement> = subtree.iter().map(|e| (e.path(), e)).collect();
    if !by_path.contains_key(path) {
        return Err(StoreError::NotFound(format!("no element at '{}'", path)));
    }

    let mapper = registry.mapper();
    let mut stack: Vec<(String, &Value)> = vec![(path.to_string(), value)];
    let mut written = 0usize;

    while let Some((current, current_value)) = stack.pop() {
        let element = by_path.get(current.as_str()).copied().ok_or_else(|| {
            StoreError::BadRequest(format!("value names '{}', which does not exist", current))
        })?;
        let handler = registry.get(element.model_type())?;
        handler
            .update_value_only(conn, &element.target, current_value, mapper)
            .await?;
        written += 1;
        stack.extend(child_values(element, current_value)?);
    }

    debug!(path, elements = written, "Value-only update applied");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::ElementTarget;
    use serde_json::json;

    fn stored(path: &str, model_type: ModelType) -> StoredElement {
        StoredElement {
            target: ElementTarget { id: 1, path: path.into(), model_type, value_type: None },
            parent_id: None,
            root_id: None,
            position: 0,
            id_short: None,
        }
    }

    fn paths(pairs: Vec<(String, &Value)>) -> Vec<String> {
        let mut p: Vec<String> = pairs.into_iter().map(|(p, _)| p).collect();
        p.sort();
        p
    }

    #[test]
    fn test_collection_children_by_name() {
        let v = json!({"temp": "21.5", "unit": "C"});
        let kids = child_values(&stored("sensor", ModelType::SubmodelElementCollection), &v).unwrap();
        assert_eq!(paths(kids), ["sensor.temp", "sensor.unit"]);
    }

    #[test]
    fn test_list_children_by_index() {
        let v = json!(["1", "2"]);
        let kids = child_values(&stored("l", ModelType::SubmodelElementList), &v).unwrap();
        assert_eq!(paths(kids), ["l[0]", "l[1]"]);
    }

    #[test]
    fn test_entity_statements() {
        let v = json!({"entityType": "SelfManagedEntity", "statements": {"rpm": "900"}});
        let kids = child_values(&stored("motor", ModelType::Entity), &v).unwrap();
        assert_eq!(paths(kids), ["motor.rpm"]);
    }

    #[test]
    fn test_annotations_accept_array_or_object() {
        let element = stored("rel", ModelType::AnnotatedRelationshipElement);
        let as_array = json!({"annotations": [{"note": "a"}, {"since": "2024"}]});
        assert_eq!(paths(child_values(&element, &as_array).unwrap()), ["rel.note", "rel.since"]);
        let as_object = json!({"annotations": {"note": "a"}});
        assert_eq!(paths(child_values(&element, &as_object).unwrap()), ["rel.note"]);
        let bad = json!({"annotations": ["x"]});
        assert!(child_values(&element, &bad).unwrap_err().is_bad_request());
    }

    #[test]
    fn test_leaf_has_no_children() {
        let v = json!("5");
        assert!(child_values(&stored("p", ModelType::Property), &v).unwrap().is_empty());
    }
}
