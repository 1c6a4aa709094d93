// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! ValueOnly representation: element content with metadata stripped.
//!
//! Containers nest their children's value-only form keyed by idShort
//! (collections, entity statements, annotations) or as an array (lists).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value};

use super::element::{LangString, SubmodelElement};

impl SubmodelElement {
    /// The value-only form, or `None` for variants that have none
    /// (Operation, Capability).
    pub fn value_only(&self) -> Option<Value> {
        let value = match self {
            SubmodelElement::Property(p) => p.value.clone().map(Value::String).unwrap_or(Value::Null),
            SubmodelElement::MultiLanguageProperty(m) => lang_strings(m.value.as_deref().unwrap_or(&[])),
            SubmodelElement::Range(r) => json!({ "min": r.min, "max": r.max }),
            SubmodelElement::Blob(b) => json!({
                "contentType": b.content_type,
                "value": b.value.as_ref().map(|v| STANDARD.encode(v)),
            }),
            SubmodelElement::File(f) => json!({ "contentType": f.content_type, "value": f.value }),
            SubmodelElement::ReferenceElement(r) => serde_json::to_value(&r.value).ok()?,
            SubmodelElement::RelationshipElement(r) => json!({
                "first": serde_json::to_value(&r.first).ok()?,
                "second": serde_json::to_value(&r.second).ok()?,
            }),
            SubmodelElement::AnnotatedRelationshipElement(a) => {
                let annotations: Vec<Value> = a
                    .annotations
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .filter_map(|child| named_entry(child).map(|(k, v)| json!({ k: v })))
                    .collect();
                json!({
                    "first": serde_json::to_value(&a.first).ok()?,
                    "second": serde_json::to_value(&a.second).ok()?,
                    "annotations": annotations,
                })
            }
            SubmodelElement::Entity(e) => {
                let mut obj = Map::new();
                obj.insert("statements".into(), named_map(e.statements.as_deref().unwrap_or(&[])));
                if let Some(t) = e.entity_type {
                    obj.insert("entityType".into(), Value::String(t.as_str().to_string()));
                }
                if let Some(g) = &e.global_asset_id {
                    obj.insert("globalAssetId".into(), Value::String(g.clone()));
                }
                if let Some(ids) = &e.specific_asset_ids {
                    obj.insert("specificAssetIds".into(), serde_json::to_value(ids).ok()?);
                }
                Value::Object(obj)
            }
            SubmodelElement::BasicEventElement(b) => json!({ "observed": serde_json::to_value(&b.observed).ok()? }),
            SubmodelElement::SubmodelElementCollection(c) => named_map(c.value.as_deref().unwrap_or(&[])),
            SubmodelElement::SubmodelElementList(l) => Value::Array(
                l.value
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .map(|child| child.value_only().unwrap_or(Value::Null))
                    .collect(),
            ),
            SubmodelElement::Operation(_) | SubmodelElement::Capability(_) => return None,
        };
        Some(value)
    }
}

fn lang_strings(values: &[LangString]) -> Value {
    Value::Array(values.iter().map(|ls| json!({ ls.language.clone(): ls.text })).collect())
}

fn named_entry(element: &SubmodelElement) -> Option<(String, Value)> {
    let name = element.id_short()?.to_string();
    Some((name, element.value_only()?))
}

fn named_map(children: &[SubmodelElement]) -> Value {
    Value::Object(children.iter().filter_map(named_entry).collect())
}

/// Parse `[{"en": "text"}, ...]`.
pub fn parse_lang_strings(value: &Value) -> Option<Vec<LangString>> {
    let items = value.as_array()?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let obj = item.as_object()?;
        for (lang, text) in obj {
            out.push(LangString::new(lang.clone(), text.as_str()?.to_string()));
        }
    }
    Some(out)
}
