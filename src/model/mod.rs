// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Domain model: submodels, their element tree and references.
//!
//! Types serialize to the AAS v3 JSON shape (camelCase fields, elements
//! tagged by `modelType`).

pub mod element;
pub mod reference;
pub mod submodel;
pub mod types;
pub mod value_only;

pub use element::{
    AnnotatedRelationshipElement, BasicEventElement, Blob, Capability, ElementMeta,
    EmbeddedDataSpecification, Entity, Extension, File, LangString, MultiLanguageProperty,
    Operation, OperationVariable, Property, Qualifier, Range, ReferenceElement,
    RelationshipElement, SpecificAssetId, SubmodelElement, SubmodelElementCollection,
    SubmodelElementList,
};
pub use reference::{Key, KeyType, Reference, ReferenceType};
pub use submodel::{AdministrativeInformation, Submodel};
pub use types::{
    AasSubmodelElements, ChildAddressing, DataTypeDefXsd, Direction, EntityType, ModelType,
    ModellingKind, StateOfEvent,
};
