//! # Typed Hierarchies
//!
//! A typed hierarchy is a base type plus any number of subtypes stored in one
//! table and told apart by a discriminator column. Hierarchies are declared
//! with [`HierarchyDecl`] / [`SubtypeDecl`] and compiled once into an
//! immutable [`TypedHierarchy`]:
//!
//! ```
//! use reinhardt_typedmodels_core::fields::FieldDef;
//! use reinhardt_typedmodels_core::hierarchy::{HierarchyDecl, SubtypeDecl};
//! use reinhardt_typedmodels_core::settings::TypedModelsSettings;
//!
//! let animals = HierarchyDecl::new("app", "Animal")
//!     .field(FieldDef::char("name", 255))
//!     .subtype(SubtypeDecl::new("Canine").field(FieldDef::boolean("good_boy")))
//!     .subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives")))
//!     .subtype(SubtypeDecl::new("Puppy").parent("Canine"))
//!     .build(&TypedModelsSettings::default())
//!     .unwrap();
//!
//! assert_eq!(animals.table().name(), "app_animal");
//! assert_eq!(animals.registry().subtypes_of("Canine").unwrap(), vec!["app.canine", "app.puppy"]);
//! assert!(animals.table().field("lives").unwrap().null);
//! ```

use crate::error::{Result, TypedModelError};
use crate::fields::{FieldDef, PRIMARY_KEY};
use crate::instance::RecastPolicy;
use crate::migrator::FieldMigrator;
use crate::registry::{Subtype, TypeRegistry};
use crate::relation::ModelRef;
use crate::schema::TableSchema;
use crate::settings::TypedModelsSettings;

/// Split a CamelCase model name into lowercase words
///
/// # Examples
///
/// ```
/// use reinhardt_typedmodels_core::hierarchy::verbose_name_from;
///
/// assert_eq!(verbose_name_from("Canine"), "canine");
/// assert_eq!(verbose_name_from("BigCat"), "big cat");
/// assert_eq!(verbose_name_from("HTTPRequest"), "http request");
/// ```
pub fn verbose_name_from(name: &str) -> String {
	let chars: Vec<char> = name.chars().collect();
	let mut result = String::with_capacity(name.len() + 4);

	for (i, &ch) in chars.iter().enumerate() {
		if ch.is_ascii_uppercase() && i > 0 {
			let prev = chars[i - 1];
			let next = chars.get(i + 1);
			if prev.is_ascii_lowercase()
				|| prev.is_ascii_digit()
				|| (prev.is_ascii_uppercase() && next.is_some_and(|n| n.is_ascii_lowercase()))
			{
				result.push(' ');
			}
		}
		result.push(ch.to_ascii_lowercase());
	}
	result
}

/// Default table name of a model: `<app_label>_<lowercased name>`
pub fn default_table_name(app_label: &str, name: &str) -> String {
	format!("{}_{}", app_label, name.to_lowercase())
}

/// Declaration of one subtype
#[derive(Debug, Clone)]
pub struct SubtypeDecl {
	name: String,
	parent: Option<String>,
	app_label: Option<String>,
	verbose_name: Option<String>,
	fields: Vec<FieldDef>,
}

impl SubtypeDecl {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			parent: None,
			app_label: None,
			verbose_name: None,
			fields: Vec::new(),
		}
	}

	/// Derive from another subtype instead of the base
	pub fn parent(mut self, parent: impl Into<String>) -> Self {
		self.parent = Some(parent.into());
		self
	}

	/// Register under another application label than the base
	pub fn app_label(mut self, app_label: impl Into<String>) -> Self {
		self.app_label = Some(app_label.into());
		self
	}

	pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
		self.verbose_name = Some(verbose_name.into());
		self
	}

	pub fn field(mut self, field: FieldDef) -> Self {
		self.fields.push(field);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

/// Declaration of a base type and its subtypes
#[derive(Debug, Clone)]
pub struct HierarchyDecl {
	app_label: String,
	name: String,
	table: Option<String>,
	verbose_name: Option<String>,
	auto_recast: Option<bool>,
	fields: Vec<FieldDef>,
	subtypes: Vec<SubtypeDecl>,
}

impl HierarchyDecl {
	pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			app_label: app_label.into(),
			name: name.into(),
			table: None,
			verbose_name: None,
			auto_recast: None,
			fields: Vec::new(),
			subtypes: Vec::new(),
		}
	}

	/// Override the table name
	pub fn table(mut self, table: impl Into<String>) -> Self {
		self.table = Some(table.into());
		self
	}

	pub fn verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
		self.verbose_name = Some(verbose_name.into());
		self
	}

	/// Override the `auto_recast` setting for this hierarchy
	pub fn auto_recast(mut self, enabled: bool) -> Self {
		self.auto_recast = Some(enabled);
		self
	}

	/// Add a field to the base type
	pub fn field(mut self, field: FieldDef) -> Self {
		self.fields.push(field);
		self
	}

	/// Declare a subtype; parents must be declared before their children
	pub fn subtype(mut self, subtype: SubtypeDecl) -> Self {
		self.subtypes.push(subtype);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn app_label(&self) -> &str {
		&self.app_label
	}

	/// Compile the declaration into a hierarchy
	pub fn build(self, settings: &TypedModelsSettings) -> Result<TypedHierarchy> {
		let table_name = self
			.table
			.clone()
			.unwrap_or_else(|| default_table_name(&self.app_label, &self.name));
		let discriminator_field = settings.discriminator_field.clone();

		let mut original = vec![
			FieldDef::auto(PRIMARY_KEY),
			FieldDef::char(&discriminator_field, settings.discriminator_max_length).indexed(),
		];
		for field in self.fields {
			if field.name == PRIMARY_KEY || field.name == discriminator_field {
				return Err(TypedModelError::FieldCollision {
					base: self.name.clone(),
					field: field.name.clone(),
					declared_by: self.name.clone(),
					existing: self.name.clone(),
				});
			}
			if field.is_primary_key() {
				return Err(TypedModelError::misuse(format!(
					"{} cannot declare primary key {:?}; typed models use {PRIMARY_KEY:?}",
					self.name, field.name
				)));
			}
			if original
				.iter()
				.any(|f| f.name == field.name || f.column() == field.column())
			{
				return Err(TypedModelError::misuse(format!(
					"{} declares field {:?} twice",
					self.name, field.name
				)));
			}
			original.push(field);
		}

		let mut table = TableSchema::new(table_name, original);
		let mut registry = TypeRegistry::new(&self.name);
		let migrator = FieldMigrator::new(&self.name, settings.field_collision);

		for decl in self.subtypes {
			if decl.name == self.name {
				return Err(TypedModelError::misuse(format!(
					"subtype {} shadows its base type",
					decl.name
				)));
			}
			let parent = match decl.parent {
				Some(parent) if parent == self.name => None,
				other => other,
			};
			if let Some(parent) = &parent
				&& registry.get(parent).is_none()
			{
				return Err(TypedModelError::misuse(format!(
					"parent {parent} of {} must be a subtype of {} declared before it",
					decl.name, self.name
				)));
			}

			let declared = migrator.migrate(&mut table, &decl.name, decl.fields)?;
			let app_label = decl.app_label.unwrap_or_else(|| self.app_label.clone());
			let verbose_name = decl
				.verbose_name
				.unwrap_or_else(|| verbose_name_from(&decl.name));
			registry.register(Subtype::new(
				decl.name,
				app_label,
				verbose_name,
				parent,
				declared,
			))?;
		}

		table.set_choices(&discriminator_field, registry.choices());

		let auto_recast = self.auto_recast.unwrap_or(settings.auto_recast);
		tracing::debug!(
			base = %self.name,
			table = table.name(),
			subtypes = registry.len(),
			columns = table.len(),
			"built typed hierarchy"
		);

		Ok(TypedHierarchy {
			base: BaseType {
				verbose_name: self
					.verbose_name
					.unwrap_or_else(|| verbose_name_from(&self.name)),
				name: self.name,
				app_label: self.app_label,
			},
			discriminator_field,
			table,
			registry,
			recast_policy: if auto_recast {
				RecastPolicy::Auto
			} else {
				RecastPolicy::Manual
			},
		})
	}
}

/// Root of a typed hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseType {
	name: String,
	app_label: String,
	verbose_name: String,
}

impl BaseType {
	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn app_label(&self) -> &str {
		&self.app_label
	}

	pub fn verbose_name(&self) -> &str {
		&self.verbose_name
	}
}

/// A compiled, immutable typed hierarchy
#[derive(Debug, Clone)]
pub struct TypedHierarchy {
	base: BaseType,
	discriminator_field: String,
	table: TableSchema,
	registry: TypeRegistry,
	recast_policy: RecastPolicy,
}

impl TypedHierarchy {
	pub fn base(&self) -> &BaseType {
		&self.base
	}

	pub fn name(&self) -> &str {
		&self.base.name
	}

	pub fn table(&self) -> &TableSchema {
		&self.table
	}

	pub fn registry(&self) -> &TypeRegistry {
		&self.registry
	}

	/// Column holding the discriminator
	pub fn discriminator_field(&self) -> &str {
		&self.discriminator_field
	}

	/// Default recast behaviour of instances of this hierarchy
	pub fn recast_policy(&self) -> RecastPolicy {
		self.recast_policy
	}

	/// Whether `name` is the base or one of its subtypes
	pub fn contains(&self, name: &str) -> bool {
		self.registry.contains(name)
	}

	pub fn is_base(&self, name: &str) -> bool {
		self.registry.is_base(name)
	}

	pub fn subtype(&self, name: &str) -> Option<&Subtype> {
		self.registry.get(name)
	}

	/// Application-qualified reference to `name`
	pub fn model_ref(&self, name: &str) -> Result<ModelRef> {
		if self.is_base(name) {
			return Ok(ModelRef::new(&self.base.app_label, &self.base.name));
		}
		self.registry
			.get(name)
			.map(|s| ModelRef::new(s.app_label(), s.name()))
			.ok_or_else(|| self.unknown(name))
	}

	/// Verbose name of the base or a subtype
	pub fn verbose_name_of(&self, name: &str) -> Result<&str> {
		if self.is_base(name) {
			return Ok(&self.base.verbose_name);
		}
		self.registry
			.get(name)
			.map(Subtype::verbose_name)
			.ok_or_else(|| self.unknown(name))
	}

	/// Discriminators a query through `name` is restricted to
	///
	/// `None` means unrestricted (the base type).
	pub fn scope_of(&self, name: &str) -> Result<Option<Vec<&str>>> {
		if self.is_base(name) {
			return Ok(None);
		}
		self.registry.subtypes_of(name).map(Some)
	}

	/// Relation fields together with every model that declared them
	///
	/// Fields declared on the base report the base as owner; migrated fields
	/// report each declaring subtype.
	pub fn relation_fields(&self) -> Vec<(&str, &FieldDef)> {
		let mut relations = Vec::new();
		for field in self.table.fields().filter(|f| f.is_relation()) {
			if self.table.is_original(&field.name) {
				relations.push((self.base.name.as_str(), field));
			} else {
				for owner in self.table.declared_by(&field.name) {
					relations.push((owner.as_str(), field));
				}
			}
		}
		relations
	}

	pub(crate) fn unknown(&self, name: &str) -> TypedModelError {
		TypedModelError::UnknownModel(format!("{name} (in the {} hierarchy)", self.base.name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::settings::FieldCollisionPolicy;
	use rstest::{fixture, rstest};

	#[fixture]
	fn settings() -> TypedModelsSettings {
		TypedModelsSettings::default()
	}

	fn animals() -> HierarchyDecl {
		HierarchyDecl::new("app", "Animal")
			.field(FieldDef::char("name", 255))
			.subtype(SubtypeDecl::new("Canine").field(FieldDef::boolean("good_boy")))
			.subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives")))
	}

	#[rstest]
	fn test_base_table_layout(settings: TypedModelsSettings) {
		let hierarchy = animals().build(&settings).unwrap();
		let columns: Vec<_> = hierarchy.table().fields().map(|f| f.column()).collect();
		assert_eq!(columns, ["id", "type", "name", "good_boy", "lives"]);
		let original: Vec<_> = hierarchy
			.table()
			.original_fields()
			.map(|f| f.name.as_str())
			.collect();
		assert_eq!(original, ["id", "type", "name"]);
	}

	#[rstest]
	fn test_discriminator_field_has_choices(settings: TypedModelsSettings) {
		let hierarchy = animals()
			.subtype(SubtypeDecl::new("BigCat").parent("Feline"))
			.build(&settings)
			.unwrap();
		let field = hierarchy.table().field("type").unwrap();
		assert!(field.db_index);
		assert!(!field.null);
		assert_eq!(
			field.choices,
			vec![
				("app.canine".to_string(), "canine".to_string()),
				("app.feline".to_string(), "feline".to_string()),
				("app.bigcat".to_string(), "big cat".to_string()),
			]
		);
	}

	#[rstest]
	fn test_custom_discriminator_field() {
		let settings = TypedModelsSettings {
			discriminator_field: "kind".to_string(),
			discriminator_max_length: 32,
			..Default::default()
		};
		let hierarchy = animals().build(&settings).unwrap();
		assert_eq!(hierarchy.discriminator_field(), "kind");
		assert_eq!(
			hierarchy.table().field("kind").unwrap().field_type,
			crate::fields::FieldType::Char { max_length: 32 }
		);
	}

	#[rstest]
	fn test_subtype_app_label_override(settings: TypedModelsSettings) {
		let hierarchy = animals()
			.subtype(SubtypeDecl::new("Wolf").parent("Canine").app_label("wild"))
			.build(&settings)
			.unwrap();
		assert_eq!(hierarchy.subtype("Wolf").unwrap().discriminator(), "wild.wolf");
		assert_eq!(
			hierarchy.model_ref("Wolf").unwrap(),
			ModelRef::new("wild", "Wolf")
		);
	}

	#[rstest]
	fn test_parent_must_be_declared_first(settings: TypedModelsSettings) {
		let err = HierarchyDecl::new("app", "Animal")
			.subtype(SubtypeDecl::new("Puppy").parent("Canine"))
			.subtype(SubtypeDecl::new("Canine"))
			.build(&settings)
			.unwrap_err();
		assert!(matches!(err, TypedModelError::StructuralMisuse(_)));
	}

	#[rstest]
	fn test_parent_naming_base_is_direct_subtype(settings: TypedModelsSettings) {
		let hierarchy = animals()
			.subtype(SubtypeDecl::new("Bird").parent("Animal"))
			.build(&settings)
			.unwrap();
		assert_eq!(hierarchy.subtype("Bird").unwrap().parent(), None);
	}

	#[rstest]
	fn test_base_field_cannot_shadow_discriminator(settings: TypedModelsSettings) {
		let err = HierarchyDecl::new("app", "Animal")
			.field(FieldDef::text("type"))
			.build(&settings)
			.unwrap_err();
		assert!(matches!(err, TypedModelError::FieldCollision { .. }));
	}

	#[rstest]
	fn test_duplicate_subtype_conflicts(settings: TypedModelsSettings) {
		let err = animals()
			.subtype(SubtypeDecl::new("Canine"))
			.build(&settings)
			.unwrap_err();
		assert!(matches!(err, TypedModelError::RegistrationConflict { .. }));
	}

	#[rstest]
	fn test_recast_policy_override() {
		let settings = TypedModelsSettings {
			auto_recast: false,
			..Default::default()
		};
		assert_eq!(
			animals().build(&settings).unwrap().recast_policy(),
			RecastPolicy::Manual
		);
		assert_eq!(
			animals().auto_recast(true).build(&settings).unwrap().recast_policy(),
			RecastPolicy::Auto
		);
	}

	#[rstest]
	fn test_relation_fields_report_every_owner() {
		let settings = TypedModelsSettings {
			field_collision: FieldCollisionPolicy::LastWriterWins,
			..Default::default()
		};
		let person = ModelRef::new("app", "Person");
		let hierarchy = HierarchyDecl::new("app", "Animal")
			.field(FieldDef::foreign_key("vet", person.clone()).nullable())
			.subtype(SubtypeDecl::new("Canine").field(FieldDef::foreign_key("owner", person.clone())))
			.subtype(SubtypeDecl::new("Feline").field(FieldDef::foreign_key("owner", person)))
			.build(&settings)
			.unwrap();
		let owners: Vec<_> = hierarchy
			.relation_fields()
			.into_iter()
			.map(|(owner, field)| (owner, field.name.as_str()))
			.collect();
		assert_eq!(
			owners,
			[("Animal", "vet"), ("Canine", "owner"), ("Feline", "owner")]
		);
	}
}
