//! # Reinhardt Typed Models: Database Layer
//!
//! Storage for typed model hierarchies built with
//! [`reinhardt_typedmodels_core`]. Every hierarchy lives in one table; reads
//! through a subtype are restricted to the subtype and its descendants, and
//! every loaded row is materialized as its concrete type.
//!
//! ## Features
//!
//! - **DDL**: one table per hierarchy, discriminator index, foreign keys
//! - **Scoped queries**: [`TypedQuery`] renders `type = ...` / `type IN (...)`
//! - **Managers**: [`TypedManager`] and [`PlainManager`] over a `sqlx` `AnyPool`
//! - **Relations**: forward and reverse traversal honouring subtype restrictions
//!
//! ## Backends
//!
//! PostgreSQL, SQLite and MySQL, chosen from the connection URL.
//!
//! ```rust,no_run
//! use reinhardt_typedmodels_core::prelude::*;
//! use reinhardt_typedmodels_core::DatabaseSettings;
//! use reinhardt_typedmodels_db::TypedDatabase;
//! use std::sync::Arc;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let registry = ModelRegistry::builder(TypedModelsSettings::default())
//!     .hierarchy(
//!         HierarchyDecl::new("app", "Animal")
//!             .field(FieldDef::char("name", 255))
//!             .subtype(SubtypeDecl::new("Canine"))
//!             .subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives").with_default(9))),
//!     )
//!     .build()?;
//!
//! let db = TypedDatabase::connect(&DatabaseSettings::new("sqlite::memory:"), Arc::new(registry)).await?;
//! db.create_tables().await?;
//!
//! let cats = db.objects(&ModelRef::new("app", "Feline"))?;
//! cats.create([("name", "Tom")]).await?;
//! assert_eq!(cats.count().await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod connection;
pub mod ddl;
pub mod error;
pub mod manager;
pub mod query;
mod values;

pub use backend::Backend;
pub use connection::TypedDatabase;
pub use error::{DatabaseError, Result};
pub use manager::{PlainManager, PlainRecord, QuerySet, Record, TypedManager};
pub use query::{OrderDirection, TypedQuery};
