// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Submodel Store
//!
//! Relational persistence for Asset Administration Shell submodels: deep,
//! heterogeneous element trees stored as flat rows and addressed by
//! idShortPath.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    SubmodelRepository                       │
//! │  • One transaction per logical operation                   │
//! │  • Write permits, optional injected cache                  │
//! │  • Bounded fan-out for "all submodels"                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engines                              │
//! │  • insert: flatten + bulk INSERT, ids correlated by path   │
//! │  • reconstruct: one joined read, in-memory assembly        │
//! │  • mutation: rename cascade, delete + list re-index        │
//! │  • value: ValueOnly updates down a subtree                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Handler registry (one per variant)             │
//! │  • side table rows, build from joined row, updates         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SQLite / MySQL (sqlx Any)                   │
//! │  • submodel, submodel_element, payload and side tables     │
//! │  • semantic ids as snapshot + normalized key rows          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use submodel_store::{SubmodelRepository, StoreConfig, Submodel, SubmodelElement, Property, ElementMeta, DataTypeDefXsd};
//!
//! #[tokio::main]
//! async fn main() {
//!     let repo = SubmodelRepository::connect(StoreConfig::sqlite("aas.db"))
//!         .await
//!         .expect("Failed to connect");
//!
//!     let temperature = SubmodelElement::Property(Property {
//!         meta: ElementMeta::named("temperature"),
//!         value_type: DataTypeDefXsd::Double,
//!         value: Some("21.5".into()),
//!         value_id: None,
//!     });
//!     repo.create_submodel(Submodel::new("urn:sm:sensor").with_elements(vec![temperature]))
//!         .await
//!         .expect("Failed to create");
//!
//!     let element = repo.get_submodel_element("urn:sm:sensor", "temperature").await.unwrap();
//!     println!("{:?}", element.value_only());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`repository`]: the operation surface ([`SubmodelRepository`])
//! - [`engine`]: insertion, reconstruction, mutation and value-only engines
//! - [`handlers`]: per-variant persistence behavior
//! - [`path`]: idShortPath codec
//! - [`storage`]: pool, dialect, schema, row helpers and references
//! - [`model`]: AAS domain types
//! - [`cache`]: injected submodel cache
//! - [`resilience`]: startup retry

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod model;
pub mod path;
pub mod repository;
pub mod resilience;
pub mod storage;
pub mod value_type;

pub use cache::{InMemorySubmodelCache, SubmodelCache};
pub use config::StoreConfig;
pub use engine::page::Page;
pub use error::{StoreError, StoreResult};
pub use handlers::UpdateMode;
pub use metrics::LatencyTimer;
pub use model::{
    AasSubmodelElements, AdministrativeInformation, AnnotatedRelationshipElement, BasicEventElement,
    Blob, Capability, DataTypeDefXsd, ElementMeta, Entity, EntityType, File, Key, KeyType,
    LangString, ModelType, ModellingKind, MultiLanguageProperty, Operation, Property, Range,
    Reference, ReferenceElement, ReferenceType, RelationshipElement, Submodel, SubmodelElement,
    SubmodelElementCollection, SubmodelElementList,
};
pub use repository::{SubmodelFilter, SubmodelRepository};
pub use resilience::retry::RetryConfig;
pub use storage::Dialect;
pub use value_type::{ValueTypeMapper, XsdValueMapper};
