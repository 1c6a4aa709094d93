// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! References and key chains.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceType {
    ExternalReference,
    ModelReference,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::ExternalReference => "ExternalReference",
            ReferenceType::ModelReference => "ModelReference",
        }
    }
}

impl FromStr for ReferenceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ExternalReference" => Ok(ReferenceType::ExternalReference),
            "ModelReference" => Ok(ReferenceType::ModelReference),
            other => Err(format!("unknown reference type '{}'", other)),
        }
    }
}

macro_rules! key_types {
    ($($variant:ident),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum KeyType {
            $($variant),+
        }

        impl KeyType {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(KeyType::$variant => stringify!($variant)),+
                }
            }
        }

        impl FromStr for KeyType {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(KeyType::$variant),)+
                    other => Err(format!("unknown key type '{}'", other)),
                }
            }
        }
    };
}

key_types!(
    AnnotatedRelationshipElement,
    AssetAdministrationShell,
    BasicEventElement,
    Blob,
    Capability,
    ConceptDescription,
    DataElement,
    Entity,
    EventElement,
    File,
    FragmentReference,
    GlobalReference,
    Identifiable,
    MultiLanguageProperty,
    Operation,
    Property,
    Range,
    Referable,
    ReferenceElement,
    RelationshipElement,
    Submodel,
    SubmodelElement,
    SubmodelElementCollection,
    SubmodelElementList,
);

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    #[serde(rename = "type")]
    pub key_type: KeyType,
    pub value: String,
}

impl Key {
    pub fn new(key_type: KeyType, value: impl Into<String>) -> Self {
        Self { key_type, value: value.into() }
    }
}

/// An ordered, typed key chain, optionally pointing at the semantic id of
/// the thing it refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(rename = "type")]
    pub reference_type: ReferenceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_semantic_id: Option<Box<Reference>>,
    pub keys: Vec<Key>,
}

impl Reference {
    pub fn model(keys: Vec<Key>) -> Self {
        Self {
            reference_type: ReferenceType::ModelReference,
            referred_semantic_id: None,
            keys,
        }
    }

    pub fn external(keys: Vec<Key>) -> Self {
        Self {
            reference_type: ReferenceType::ExternalReference,
            referred_semantic_id: None,
            keys,
        }
    }

    /// Single-key external reference to a global identifier (the common
    /// shape of a semantic id).
    pub fn global(value: impl Into<String>) -> Self {
        Self::external(vec![Key::new(KeyType::GlobalReference, value)])
    }

    pub fn with_referred(mut self, referred: Reference) -> Self {
        self.referred_semantic_id = Some(Box::new(referred));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_type_round_trips_through_str() {
        for kt in [KeyType::Submodel, KeyType::SubmodelElementList, KeyType::GlobalReference] {
            assert_eq!(kt.as_str().parse::<KeyType>().unwrap(), kt);
        }
        assert!("Nope".parse::<KeyType>().is_err());
    }

    #[test]
    fn test_reference_json_shape() {
        let r = Reference::global("urn:x").with_referred(Reference::global("urn:y"));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, json!({
            "type": "ExternalReference",
            "referredSemanticId": {
                "type": "ExternalReference",
                "keys": [{"type": "GlobalReference", "value": "urn:y"}]
            },
            "keys": [{"type": "GlobalReference", "value": "urn:x"}]
        }));
        let back: Reference = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
