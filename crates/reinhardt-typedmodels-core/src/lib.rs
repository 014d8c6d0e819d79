//! # Reinhardt Typed Models Core
//!
//! Single-table polymorphic inheritance for the Reinhardt ORM.
//!
//! A family of typed models shares one table. Rows are told apart by a
//! discriminator column and always materialize as their concrete subtype.
//!
//! ## Features
//!
//! - **Field Migration**: subtype fields are lifted onto the shared table as
//!   nullable columns, with provenance kept per field
//! - **Type Registry**: discriminator → subtype mapping, children registry
//!   and subtypes-lists used to scope queries
//! - **Relation Rewriting**: relations to a subtype point at the base table,
//!   restricted to the subtype's branch, with reverse accessors named after
//!   the declaring subtype
//! - **Recast**: instances keep their runtime type and discriminator in sync
//! - **Field Visibility**: each subtype only exposes the fields of its branch
//!
//! ## Quick Start
//!
//! ```
//! use reinhardt_typedmodels_core::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = ModelRegistry::builder(TypedModelsSettings::default())
//!     .hierarchy(
//!         HierarchyDecl::new("app", "Animal")
//!             .field(FieldDef::char("name", 255))
//!             .subtype(SubtypeDecl::new("Canine").field(FieldDef::boolean("good_boy")))
//!             .subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives"))),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let animals = registry.hierarchy("Animal").unwrap();
//! let mut cat = Instance::new(Arc::clone(animals), "Feline").unwrap();
//! cat.set("name", "Tom").unwrap();
//! cat.set("lives", 9).unwrap();
//!
//! assert_eq!(cat.discriminator(), Some("app.feline"));
//! assert!(cat.set("good_boy", true).is_err());
//! ```

pub mod error;
pub mod field_cache;
pub mod fields;
pub mod hierarchy;
pub mod instance;
pub mod migrator;
pub mod models;
pub mod navigation;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod settings;
pub mod variants;

pub use error::{Result, TypedModelError};
pub use fields::{FieldDef, FieldType, PRIMARY_KEY};
pub use hierarchy::{BaseType, HierarchyDecl, SubtypeDecl, TypedHierarchy};
pub use instance::{Instance, RecastPolicy, RecastState};
pub use models::{ModelLocation, ModelRegistry, ModelRegistryBuilder, PlainModel, PlainSchema};
pub use registry::{Subtype, TypeRegistry, discriminator_for};
pub use relation::{ModelRef, OnDelete, RelationDef, RelationKind, ResolvedRelation};
pub use schema::TableSchema;
pub use settings::{DatabaseSettings, FieldCollisionPolicy, SettingsError, TypedModelsSettings};
pub use variants::VariantDecoder;

/// Commonly used types
pub mod prelude {
	pub use crate::error::{Result, TypedModelError};
	pub use crate::fields::{FieldDef, FieldType};
	pub use crate::hierarchy::{HierarchyDecl, SubtypeDecl, TypedHierarchy};
	pub use crate::instance::{Instance, RecastPolicy, RecastState};
	pub use crate::models::{ModelRegistry, PlainModel};
	pub use crate::relation::{ModelRef, OnDelete};
	pub use crate::settings::{FieldCollisionPolicy, TypedModelsSettings};
	pub use crate::variants::VariantDecoder;
}
