//! # Reinhardt Typed Models
//!
//! Single-table polymorphic inheritance for the Reinhardt ORM.
//!
//! A typed hierarchy stores a base model and every subtype in one table. A
//! discriminator column (`type` by default) records each row's concrete
//! type; subtype fields are migrated onto the shared table as nullable
//! columns, subtype queries are filtered to the subtype and its descendants,
//! and every row is materialized as the type it was saved as.
//!
//! ## Crates
//!
//! - [`reinhardt_typedmodels_core`]: declarations, registry, recast, field
//!   visibility, relation rewriting and navigation (re-exported at the root)
//! - [`db`]: DDL, scoped queries and `sqlx` managers (feature `database`)
//!
//! ## Feature Flags
//!
//! - `database` (default) - storage layer
//! - `db-postgres`, `db-sqlite`, `db-mysql` - database drivers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use reinhardt_typedmodels::prelude::*;
//!
//! # async fn example() -> std::result::Result<(), reinhardt_typedmodels::Error> {
//! let settings = reinhardt_typedmodels::load_settings(Some("typedmodels.toml"))?;
//! let registry = ModelRegistry::builder(settings)
//!     .hierarchy(
//!         HierarchyDecl::new("app", "Animal")
//!             .field(FieldDef::char("name", 255))
//!             .subtype(SubtypeDecl::new("Canine"))
//!             .subtype(SubtypeDecl::new("Feline")),
//!     )
//!     .build()?;
//!
//! let db = reinhardt_typedmodels::setup(registry).await?;
//! db.objects(&ModelRef::new("app", "Canine"))?
//!     .create([("name", "Rex")])
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

pub use reinhardt_typedmodels_core::*;

/// Storage layer
#[cfg(feature = "database")]
pub mod db {
	pub use reinhardt_typedmodels_db::*;
}

/// Errors raised while setting up typed models
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Settings(#[from] SettingsError),

	#[error(transparent)]
	Model(#[from] TypedModelError),

	#[cfg(feature = "database")]
	#[error(transparent)]
	Database(#[from] reinhardt_typedmodels_db::DatabaseError),
}

/// Load settings from an optional TOML file, then the environment
///
/// Without a file, defaults are used. `TYPEDMODELS_*` variables override
/// both, and the result is validated.
///
/// # Examples
///
/// ```
/// let settings = reinhardt_typedmodels::load_settings(None::<&str>).unwrap();
/// assert!(!settings.discriminator_field.is_empty());
/// ```
pub fn load_settings<P: AsRef<Path>>(
	path: Option<P>,
) -> std::result::Result<TypedModelsSettings, SettingsError> {
	let mut settings = match path {
		Some(path) => TypedModelsSettings::from_file(path)?,
		None => TypedModelsSettings::default(),
	};
	settings.apply_env()?;
	settings.validate()?;
	tracing::debug!(
		discriminator_field = %settings.discriminator_field,
		auto_recast = settings.auto_recast,
		database = settings.database.is_some(),
		"loaded typed models settings"
	);
	Ok(settings)
}

/// Connect with the registry's database settings and create every table
#[cfg(feature = "database")]
pub async fn setup(registry: ModelRegistry) -> std::result::Result<db::TypedDatabase, Error> {
	let db = db::TypedDatabase::from_registry(std::sync::Arc::new(registry)).await?;
	db.create_tables().await?;
	Ok(db)
}

pub mod prelude {
	pub use reinhardt_typedmodels_core::prelude::*;

	#[cfg(feature = "database")]
	pub use reinhardt_typedmodels_db::{
		DatabaseError, PlainManager, QuerySet, Record, TypedDatabase, TypedManager,
	};
}
