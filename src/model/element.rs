// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Submodel elements: a closed sum type over every supported variant.

use serde::{Deserialize, Serialize};

use super::reference::Reference;
use super::types::{
    AasSubmodelElements, ChildAddressing, DataTypeDefXsd, Direction, EntityType, ModelType,
    StateOfEvent,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangString {
    pub language: String,
    pub text: String,
}

impl LangString {
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self { language: language.into(), text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Qualifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "type")]
    pub qualifier_type: String,
    pub value_type: DataTypeDefXsd,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_id: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<DataTypeDefXsd>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refers_to: Option<Vec<Reference>>,
}

/// Data specification content is kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedDataSpecification {
    pub data_specification: Reference,
    pub data_specification_content: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificAssetId {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_subject_id: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationVariable {
    pub value: Box<SubmodelElement>,
}

/// Attributes every element variant carries.
///
/// `None` means "absent"; a patch only touches fields that are `Some`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<Reference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplemental_semantic_ids: Option<Vec<Reference>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifiers: Option<Vec<Qualifier>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<Extension>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<Vec<LangString>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Vec<LangString>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedded_data_specifications: Option<Vec<EmbeddedDataSpecification>>,
}

impl ElementMeta {
    pub fn named(id_short: impl Into<String>) -> Self {
        Self { id_short: Some(id_short.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub value_type: DataTypeDefXsd,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_id: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiLanguageProperty {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<LangString>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_id: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub value_type: DataTypeDefXsd,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub first: Reference,
    pub second: Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedRelationshipElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub first: Reference,
    pub second: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<SubmodelElement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_variables: Option<Vec<OperationVariable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variables: Option<Vec<OperationVariable>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inoutput_variables: Option<Vec<OperationVariable>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    #[serde(flatten)]
    pub meta: ElementMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_asset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_asset_ids: Option<Vec<SpecificAssetId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statements: Option<Vec<SubmodelElement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicEventElement {
    #[serde(flatten)]
    pub meta: ElementMeta,
    pub observed: Reference,
    pub direction: Direction,
    pub state: StateOfEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_broker: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interval: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmodelElementCollection {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<SubmodelElement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmodelElementList {
    #[serde(flatten)]
    pub meta: ElementMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_relevant: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id_list_element: Option<Reference>,
    pub type_value_list_element: AasSubmodelElements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type_list_element: Option<DataTypeDefXsd>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Vec<SubmodelElement>>,
}

/// One node of a submodel's element tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "modelType")]
pub enum SubmodelElement {
    Property(Property),
    MultiLanguageProperty(MultiLanguageProperty),
    Range(Range),
    Blob(Blob),
    File(File),
    ReferenceElement(ReferenceElement),
    RelationshipElement(RelationshipElement),
    AnnotatedRelationshipElement(AnnotatedRelationshipElement),
    Operation(Operation),
    Capability(Capability),
    Entity(Entity),
    BasicEventElement(BasicEventElement),
    SubmodelElementCollection(SubmodelElementCollection),
    SubmodelElementList(SubmodelElementList),
}

macro_rules! for_each_variant {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            SubmodelElement::Property($inner) => $body,
            SubmodelElement::MultiLanguageProperty($inner) => $body,
            SubmodelElement::Range($inner) => $body,
            SubmodelElement::Blob($inner) => $body,
            SubmodelElement::File($inner) => $body,
            SubmodelElement::ReferenceElement($inner) => $body,
            SubmodelElement::RelationshipElement($inner) => $body,
            SubmodelElement::AnnotatedRelationshipElement($inner) => $body,
            SubmodelElement::Operation($inner) => $body,
            SubmodelElement::Capability($inner) => $body,
            SubmodelElement::Entity($inner) => $body,
            SubmodelElement::BasicEventElement($inner) => $body,
            SubmodelElement::SubmodelElementCollection($inner) => $body,
            SubmodelElement::SubmodelElementList($inner) => $body,
        }
    };
}

impl SubmodelElement {
    pub fn model_type(&self) -> ModelType {
        match self {
            SubmodelElement::Property(_) => ModelType::Property,
            SubmodelElement::MultiLanguageProperty(_) => ModelType::MultiLanguageProperty,
            SubmodelElement::Range(_) => ModelType::Range,
            SubmodelElement::Blob(_) => ModelType::Blob,
            SubmodelElement::File(_) => ModelType::File,
            SubmodelElement::ReferenceElement(_) => ModelType::ReferenceElement,
            SubmodelElement::RelationshipElement(_) => ModelType::RelationshipElement,
            SubmodelElement::AnnotatedRelationshipElement(_) => ModelType::AnnotatedRelationshipElement,
            SubmodelElement::Operation(_) => ModelType::Operation,
            SubmodelElement::Capability(_) => ModelType::Capability,
            SubmodelElement::Entity(_) => ModelType::Entity,
            SubmodelElement::BasicEventElement(_) => ModelType::BasicEventElement,
            SubmodelElement::SubmodelElementCollection(_) => ModelType::SubmodelElementCollection,
            SubmodelElement::SubmodelElementList(_) => ModelType::SubmodelElementList,
        }
    }

    pub fn meta(&self) -> &ElementMeta {
        for_each_variant!(self, e => &e.meta)
    }

    pub fn meta_mut(&mut self) -> &mut ElementMeta {
        for_each_variant!(self, e => &mut e.meta)
    }

    pub fn id_short(&self) -> Option<&str> {
        self.meta().id_short.as_deref()
    }

    /// Owned child elements, if this is a container.
    pub fn children(&self) -> Option<&[SubmodelElement]> {
        match self {
            SubmodelElement::SubmodelElementCollection(c) => c.value.as_deref(),
            SubmodelElement::SubmodelElementList(l) => l.value.as_deref(),
            SubmodelElement::Entity(e) => e.statements.as_deref(),
            SubmodelElement::AnnotatedRelationshipElement(a) => a.annotations.as_deref(),
            _ => None,
        }
    }

    /// Detach and return the owned children, leaving the container empty.
    pub fn take_children(&mut self) -> Vec<SubmodelElement> {
        let slot = match self {
            SubmodelElement::SubmodelElementCollection(c) => &mut c.value,
            SubmodelElement::SubmodelElementList(l) => &mut l.value,
            SubmodelElement::Entity(e) => &mut e.statements,
            SubmodelElement::AnnotatedRelationshipElement(a) => &mut a.annotations,
            _ => return Vec::new(),
        };
        slot.take().unwrap_or_default()
    }

    /// Attach children to a container. Returns them back when this variant
    /// cannot own children. An empty vector leaves the container `None`,
    /// matching how an empty container reads back from the store.
    pub fn set_children(&mut self, children: Vec<SubmodelElement>) -> Result<(), Vec<SubmodelElement>> {
        let value = if children.is_empty() { None } else { Some(children) };
        match self {
            SubmodelElement::SubmodelElementCollection(c) => c.value = value,
            SubmodelElement::SubmodelElementList(l) => l.value = value,
            SubmodelElement::Entity(e) => e.statements = value,
            SubmodelElement::AnnotatedRelationshipElement(a) => a.annotations = value,
            _ => return Err(value.unwrap_or_default()),
        }
        Ok(())
    }

    pub fn child_addressing(&self) -> Option<ChildAddressing> {
        self.model_type().child_addressing()
    }

    /// Value type of a Property or Range.
    pub fn value_type(&self) -> Option<DataTypeDefXsd> {
        match self {
            SubmodelElement::Property(p) => Some(p.value_type),
            SubmodelElement::Range(r) => Some(r.value_type),
            _ => None,
        }
    }
}

/// Base64 text on the wire, raw bytes in memory.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(d)?;
        text.map(|t| STANDARD.decode(t.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
