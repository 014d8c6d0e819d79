//! # Field-Cache Override
//!
//! Every field of every subtype physically lives on the shared table, but a
//! subtype only *appears* to have the base's original fields plus the fields
//! declared somewhere along its own ancestor chain. A `Feline` therefore never
//! exposes `good_boy`, while a `Puppy` sees everything `Canine` declared.

use crate::error::Result;
use crate::fields::FieldDef;
use crate::hierarchy::TypedHierarchy;

impl TypedHierarchy {
	/// Fields visible on `name`, in table order
	///
	/// The base sees every field of the table.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::fields::FieldDef;
	/// use reinhardt_typedmodels_core::hierarchy::{HierarchyDecl, SubtypeDecl};
	/// use reinhardt_typedmodels_core::settings::TypedModelsSettings;
	///
	/// let animals = HierarchyDecl::new("app", "Animal")
	///     .field(FieldDef::char("name", 255))
	///     .subtype(SubtypeDecl::new("Canine").field(FieldDef::boolean("good_boy")))
	///     .subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives")))
	///     .build(&TypedModelsSettings::default())
	///     .unwrap();
	///
	/// assert_eq!(animals.apparent_field_names("Feline").unwrap(), ["id", "type", "name", "lives"]);
	/// assert_eq!(animals.apparent_fields("Animal").unwrap().len(), 5);
	/// ```
	pub fn apparent_fields(&self, name: &str) -> Result<Vec<&FieldDef>> {
		let table = self.table();
		if self.is_base(name) {
			return Ok(table.fields().collect());
		}

		let lineage = self.registry().lineage(name)?;
		Ok(table
			.fields()
			.filter(|field| {
				table.is_original(&field.name)
					|| table
						.declared_by(&field.name)
						.iter()
						.any(|owner| lineage.iter().any(|s| s.name() == owner))
			})
			.collect())
	}

	/// Names of the fields visible on `name`, in table order
	pub fn apparent_field_names(&self, name: &str) -> Result<Vec<&str>> {
		Ok(self
			.apparent_fields(name)?
			.into_iter()
			.map(|f| f.name.as_str())
			.collect())
	}

	/// Whether `field` is visible on `name`
	pub fn has_field(&self, name: &str, field: &str) -> Result<bool> {
		Ok(self
			.apparent_fields(name)?
			.iter()
			.any(|f| f.name == field))
	}

	/// The base type's fields as declared, before any subtype migration
	pub fn original_fields(&self) -> Vec<&FieldDef> {
		self.table().original_fields().collect()
	}
}
