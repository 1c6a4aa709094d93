// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Enumerations shared by the element model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::reference::KeyType;

/// Generates a string-backed enum with serde names, `as_str` and `FromStr`.
macro_rules! named_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum!(
    /// XSD value types a Property, Range or Qualifier may declare.
    DataTypeDefXsd {
        AnyUri => "xs:anyURI",
        Base64Binary => "xs:base64Binary",
        Boolean => "xs:boolean",
        Byte => "xs:byte",
        Date => "xs:date",
        DateTime => "xs:dateTime",
        Decimal => "xs:decimal",
        Double => "xs:double",
        Duration => "xs:duration",
        Float => "xs:float",
        GDay => "xs:gDay",
        GMonth => "xs:gMonth",
        GMonthDay => "xs:gMonthDay",
        GYear => "xs:gYear",
        GYearMonth => "xs:gYearMonth",
        HexBinary => "xs:hexBinary",
        Int => "xs:int",
        Integer => "xs:integer",
        Long => "xs:long",
        NegativeInteger => "xs:negativeInteger",
        NonNegativeInteger => "xs:nonNegativeInteger",
        NonPositiveInteger => "xs:nonPositiveInteger",
        PositiveInteger => "xs:positiveInteger",
        Short => "xs:short",
        String => "xs:string",
        Time => "xs:time",
        UnsignedByte => "xs:unsignedByte",
        UnsignedInt => "xs:unsignedInt",
        UnsignedLong => "xs:unsignedLong",
        UnsignedShort => "xs:unsignedShort",
    }
);

named_enum!(
    /// Item kinds a SubmodelElementList may constrain its children to.
    AasSubmodelElements {
        AnnotatedRelationshipElement => "AnnotatedRelationshipElement",
        BasicEventElement => "BasicEventElement",
        Blob => "Blob",
        Capability => "Capability",
        DataElement => "DataElement",
        Entity => "Entity",
        EventElement => "EventElement",
        File => "File",
        MultiLanguageProperty => "MultiLanguageProperty",
        Operation => "Operation",
        Property => "Property",
        Range => "Range",
        ReferenceElement => "ReferenceElement",
        RelationshipElement => "RelationshipElement",
        SubmodelElement => "SubmodelElement",
        SubmodelElementCollection => "SubmodelElementCollection",
        SubmodelElementList => "SubmodelElementList",
    }
);

named_enum!(
    EntityType {
        CoManagedEntity => "CoManagedEntity",
        SelfManagedEntity => "SelfManagedEntity",
    }
);

named_enum!(
    Direction {
        Input => "input",
        Output => "output",
    }
);

named_enum!(
    StateOfEvent {
        On => "on",
        Off => "off",
    }
);

named_enum!(
    ModellingKind {
        Template => "Template",
        Instance => "Instance",
    }
);

/// Concrete element variant, persisted on every element row as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelType {
    SubmodelElementCollection,
    SubmodelElementList,
    Property,
    MultiLanguageProperty,
    Range,
    Blob,
    File,
    ReferenceElement,
    RelationshipElement,
    AnnotatedRelationshipElement,
    Entity,
    Operation,
    BasicEventElement,
    Capability,
}

impl ModelType {
    pub const ALL: [ModelType; 14] = [
        ModelType::SubmodelElementCollection,
        ModelType::SubmodelElementList,
        ModelType::Property,
        ModelType::MultiLanguageProperty,
        ModelType::Range,
        ModelType::Blob,
        ModelType::File,
        ModelType::ReferenceElement,
        ModelType::RelationshipElement,
        ModelType::AnnotatedRelationshipElement,
        ModelType::Entity,
        ModelType::Operation,
        ModelType::BasicEventElement,
        ModelType::Capability,
    ];

    /// Persisted type code. Stable: never renumber.
    pub fn code(&self) -> i64 {
        match self {
            ModelType::SubmodelElementCollection => 1,
            ModelType::SubmodelElementList => 2,
            ModelType::Property => 3,
            ModelType::MultiLanguageProperty => 4,
            ModelType::Range => 5,
            ModelType::Blob => 6,
            ModelType::File => 7,
            ModelType::ReferenceElement => 8,
            ModelType::RelationshipElement => 9,
            ModelType::AnnotatedRelationshipElement => 10,
            ModelType::Entity => 11,
            ModelType::Operation => 12,
            ModelType::BasicEventElement => 13,
            ModelType::Capability => 14,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    pub fn as_str(&self) -> &'static str {
        self.key_type().as_str()
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            ModelType::SubmodelElementCollection => KeyType::SubmodelElementCollection,
            ModelType::SubmodelElementList => KeyType::SubmodelElementList,
            ModelType::Property => KeyType::Property,
            ModelType::MultiLanguageProperty => KeyType::MultiLanguageProperty,
            ModelType::Range => KeyType::Range,
            ModelType::Blob => KeyType::Blob,
            ModelType::File => KeyType::File,
            ModelType::ReferenceElement => KeyType::ReferenceElement,
            ModelType::RelationshipElement => KeyType::RelationshipElement,
            ModelType::AnnotatedRelationshipElement => KeyType::AnnotatedRelationshipElement,
            ModelType::Entity => KeyType::Entity,
            ModelType::Operation => KeyType::Operation,
            ModelType::BasicEventElement => KeyType::BasicEventElement,
            ModelType::Capability => KeyType::Capability,
        }
    }

    /// How this variant addresses its children, if it owns any.
    pub fn child_addressing(&self) -> Option<ChildAddressing> {
        match self {
            ModelType::SubmodelElementList => Some(ChildAddressing::Positional),
            ModelType::SubmodelElementCollection
            | ModelType::Entity
            | ModelType::AnnotatedRelationshipElement => Some(ChildAddressing::Named),
            _ => None,
        }
    }

    pub fn is_data_element(&self) -> bool {
        matches!(
            self,
            ModelType::Property
                | ModelType::MultiLanguageProperty
                | ModelType::Range
                | ModelType::Blob
                | ModelType::File
                | ModelType::ReferenceElement
        )
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether children of a container are addressed by idShort or by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAddressing {
    Named,
    Positional,
}

impl AasSubmodelElements {
    /// Whether a list constrained to this kind may hold an element of `model_type`.
    pub fn admits(&self, model_type: ModelType) -> bool {
        match self {
            AasSubmodelElements::SubmodelElement => true,
            AasSubmodelElements::DataElement => model_type.is_data_element(),
            AasSubmodelElements::EventElement => model_type == ModelType::BasicEventElement,
            concrete => concrete.as_str() == model_type.as_str(),
        }
    }
}
