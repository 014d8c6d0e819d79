//! # Model Registry
//!
//! Collects every typed hierarchy and plain model of a project, then resolves
//! relations once all of them are known. Building happens in two phases:
//!
//! 1. each hierarchy is compiled (fields migrated, subtypes registered) and
//!    each plain model gets its table
//! 2. every relation field is rewritten against its target, so restrictions
//!    on typed targets see the final subtypes-lists, and reverse accessors
//!    are checked for clashes
//!
//! The result is immutable and meant to be shared through [`Arc`].
//!
//! ```
//! use reinhardt_typedmodels_core::fields::FieldDef;
//! use reinhardt_typedmodels_core::hierarchy::{HierarchyDecl, SubtypeDecl};
//! use reinhardt_typedmodels_core::models::{ModelRegistry, PlainModel};
//! use reinhardt_typedmodels_core::relation::ModelRef;
//! use reinhardt_typedmodels_core::settings::TypedModelsSettings;
//!
//! let registry = ModelRegistry::builder(TypedModelsSettings::default())
//!     .plain(PlainModel::new("app", "Person").field(FieldDef::char("name", 100)))
//!     .hierarchy(
//!         HierarchyDecl::new("app", "Animal")
//!             .subtype(
//!                 SubtypeDecl::new("Canine")
//!                     .field(FieldDef::foreign_key("owner", ModelRef::new("app", "Person")).nullable()),
//!             ),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let person = ModelRef::new("app", "Person");
//! let relation = registry.reverse_relation(&person, "canine_set").unwrap();
//! assert_eq!(relation.owner_table, "app_animal");
//! assert_eq!(relation.owner_scope, Some(vec!["app.canine".to_string()]));
//! ```

use crate::error::{Result, TypedModelError};
use crate::fields::{FieldDef, PRIMARY_KEY};
use crate::hierarchy::{HierarchyDecl, TypedHierarchy, default_table_name};
use crate::relation::{
	ModelRef, RelationOwner, ResolvedRelation, TargetStorage, rewrite_relation,
};
use crate::schema::TableSchema;
use crate::settings::TypedModelsSettings;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// An ordinary model with its own table
#[derive(Debug, Clone)]
pub struct PlainModel {
	model: ModelRef,
	table: Option<String>,
	fields: Vec<FieldDef>,
}

impl PlainModel {
	pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			model: ModelRef::new(app_label, name),
			table: None,
			fields: Vec::new(),
		}
	}

	pub fn table(mut self, table: impl Into<String>) -> Self {
		self.table = Some(table.into());
		self
	}

	pub fn field(mut self, field: FieldDef) -> Self {
		self.fields.push(field);
		self
	}

	fn build(self) -> Result<PlainSchema> {
		let table = self
			.table
			.unwrap_or_else(|| default_table_name(&self.model.app_label, &self.model.name));
		let mut fields = vec![FieldDef::auto(PRIMARY_KEY)];
		for field in self.fields {
			if field.is_primary_key() || field.name == PRIMARY_KEY {
				return Err(TypedModelError::misuse(format!(
					"{} cannot declare primary key {:?}",
					self.model, field.name
				)));
			}
			if fields
				.iter()
				.any(|f| f.name == field.name || f.column() == field.column())
			{
				return Err(TypedModelError::misuse(format!(
					"{} declares field {:?} twice",
					self.model, field.name
				)));
			}
			fields.push(field);
		}
		Ok(PlainSchema {
			model: self.model,
			table: TableSchema::new(table, fields),
		})
	}
}

/// A built plain model
#[derive(Debug, Clone)]
pub struct PlainSchema {
	model: ModelRef,
	table: TableSchema,
}

impl PlainSchema {
	pub fn model(&self) -> &ModelRef {
		&self.model
	}

	pub fn table(&self) -> &TableSchema {
		&self.table
	}
}

/// Where a model lives in the registry
#[derive(Debug, Clone, Copy)]
pub enum ModelLocation<'a> {
	/// A base or subtype of a typed hierarchy
	Typed {
		hierarchy: &'a Arc<TypedHierarchy>,
		model: &'a str,
	},
	Plain(&'a PlainSchema),
}

impl<'a> ModelLocation<'a> {
	/// Table the model's rows are stored in
	pub fn table(&self) -> &'a TableSchema {
		match self {
			Self::Typed { hierarchy, .. } => hierarchy.table(),
			Self::Plain(plain) => plain.table(),
		}
	}

	/// Model owning the table
	pub fn storage_model(&self) -> Result<ModelRef> {
		match self {
			Self::Typed { hierarchy, .. } => hierarchy.model_ref(hierarchy.name()),
			Self::Plain(plain) => Ok(plain.model.clone()),
		}
	}

	/// Discriminators rows of this model may have, `None` when unrestricted
	pub fn scope(&self) -> Result<Option<Vec<String>>> {
		match self {
			Self::Typed { hierarchy, model } => Ok(hierarchy
				.scope_of(model)?
				.map(|s| s.into_iter().map(str::to_string).collect())),
			Self::Plain(_) => Ok(None),
		}
	}
}

#[derive(Debug, Clone)]
enum Slot {
	Typed { hierarchy: usize, model: String },
	Plain(usize),
}

/// Collects declarations before the registry is built
#[derive(Debug, Clone)]
pub struct ModelRegistryBuilder {
	settings: TypedModelsSettings,
	hierarchies: Vec<HierarchyDecl>,
	plain: Vec<PlainModel>,
}

impl ModelRegistryBuilder {
	pub fn hierarchy(mut self, hierarchy: HierarchyDecl) -> Self {
		self.hierarchies.push(hierarchy);
		self
	}

	pub fn plain(mut self, model: PlainModel) -> Self {
		self.plain.push(model);
		self
	}

	/// Compile every declaration and resolve relations
	pub fn build(self) -> Result<ModelRegistry> {
		let mut hierarchies = Vec::with_capacity(self.hierarchies.len());
		for decl in self.hierarchies {
			hierarchies.push(Arc::new(decl.build(&self.settings)?));
		}
		let mut plain = Vec::with_capacity(self.plain.len());
		for model in self.plain {
			plain.push(model.build()?);
		}

		let mut index: HashMap<ModelRef, Slot> = HashMap::new();
		let mut claim = |model: ModelRef, slot: Slot| -> Result<()> {
			if index.contains_key(&model) {
				return Err(TypedModelError::misuse(format!(
					"model {model} is declared more than once"
				)));
			}
			index.insert(model, slot);
			Ok(())
		};
		for (i, hierarchy) in hierarchies.iter().enumerate() {
			let names = std::iter::once(hierarchy.name())
				.chain(hierarchy.registry().iter().map(|s| s.name()));
			for name in names {
				claim(
					hierarchy.model_ref(name)?,
					Slot::Typed {
						hierarchy: i,
						model: name.to_string(),
					},
				)?;
			}
		}
		for (i, model) in plain.iter().enumerate() {
			claim(model.model.clone(), Slot::Plain(i))?;
		}

		let mut registry = ModelRegistry {
			settings: self.settings,
			hierarchies,
			plain,
			index,
			relations: Vec::new(),
			reverse: IndexMap::new(),
		};
		registry.resolve_relations()?;

		tracing::info!(
			hierarchies = registry.hierarchies.len(),
			plain_models = registry.plain.len(),
			relations = registry.relations.len(),
			"built model registry"
		);
		Ok(registry)
	}
}

/// Immutable registry of every model of a project
#[derive(Debug, Clone)]
pub struct ModelRegistry {
	settings: TypedModelsSettings,
	hierarchies: Vec<Arc<TypedHierarchy>>,
	plain: Vec<PlainSchema>,
	index: HashMap<ModelRef, Slot>,
	relations: Vec<ResolvedRelation>,
	reverse: IndexMap<(ModelRef, String), usize>,
}

impl ModelRegistry {
	pub fn builder(settings: TypedModelsSettings) -> ModelRegistryBuilder {
		ModelRegistryBuilder {
			settings,
			hierarchies: Vec::new(),
			plain: Vec::new(),
		}
	}

	pub fn settings(&self) -> &TypedModelsSettings {
		&self.settings
	}

	pub fn hierarchies(&self) -> impl Iterator<Item = &Arc<TypedHierarchy>> {
		self.hierarchies.iter()
	}

	pub fn plain_models(&self) -> impl Iterator<Item = &PlainSchema> {
		self.plain.iter()
	}

	/// Find a model by reference
	pub fn locate(&self, model: &ModelRef) -> Result<ModelLocation<'_>> {
		match self.index.get(model) {
			Some(Slot::Typed { hierarchy, model }) => Ok(ModelLocation::Typed {
				hierarchy: &self.hierarchies[*hierarchy],
				model,
			}),
			Some(Slot::Plain(i)) => Ok(ModelLocation::Plain(&self.plain[*i])),
			None => Err(TypedModelError::UnknownModel(model.to_string())),
		}
	}

	/// Hierarchy containing `model`, with the model's name inside it
	pub fn hierarchy_of(&self, model: &ModelRef) -> Result<(&Arc<TypedHierarchy>, &str)> {
		match self.locate(model)? {
			ModelLocation::Typed { hierarchy, model } => Ok((hierarchy, model)),
			ModelLocation::Plain(plain) => Err(TypedModelError::misuse(format!(
				"{} is not a typed model",
				plain.model
			))),
		}
	}

	/// Hierarchy whose base type is called `base`
	pub fn hierarchy(&self, base: &str) -> Option<&Arc<TypedHierarchy>> {
		self.hierarchies.iter().find(|h| h.name() == base)
	}

	pub fn plain(&self, model: &ModelRef) -> Option<&PlainSchema> {
		match self.index.get(model) {
			Some(Slot::Plain(i)) => self.plain.get(*i),
			_ => None,
		}
	}

	/// Every resolved relation
	pub fn relations(&self) -> &[ResolvedRelation] {
		&self.relations
	}

	/// Relation `field` as seen from `model`
	///
	/// Subtypes see the relations declared along their ancestor chain.
	pub fn forward_relation(&self, model: &ModelRef, field: &str) -> Result<&ResolvedRelation> {
		let location = self.locate(model)?;
		let owners: Vec<ModelRef> = match location {
			ModelLocation::Typed { hierarchy, model } => {
				if !hierarchy.has_field(model, field)? {
					return Err(TypedModelError::invalid_value(
						field,
						format!("not a field of {model}"),
					));
				}
				let mut owners = vec![hierarchy.model_ref(model)?];
				for ancestor in hierarchy.ancestors(model)? {
					owners.push(hierarchy.model_ref(ancestor)?);
				}
				if hierarchy.is_base(model) {
					// The base sees every migrated relation of the table.
					for (owner, _) in hierarchy.relation_fields() {
						owners.push(hierarchy.model_ref(owner)?);
					}
				}
				owners
			}
			ModelLocation::Plain(plain) => vec![plain.model.clone()],
		};
		self.relations
			.iter()
			.find(|r| r.field == field && owners.contains(&r.owner))
			.ok_or_else(|| {
				TypedModelError::invalid_value(field, format!("not a relation of {model}"))
			})
	}

	/// Relation behind reverse accessor `accessor` on `target`
	///
	/// `target` may be any type stored in the relation's target table.
	pub fn reverse_relation(&self, target: &ModelRef, accessor: &str) -> Result<&ResolvedRelation> {
		let storage = self.locate(target)?.storage_model()?;
		self.reverse
			.get(&(storage, accessor.to_string()))
			.map(|&i| &self.relations[i])
			.ok_or_else(|| {
				TypedModelError::misuse(format!("{target} has no reverse accessor {accessor:?}"))
			})
	}

	/// Reverse accessors generated on the table storing `target`
	pub fn reverse_accessors(&self, target: &ModelRef) -> Result<Vec<&str>> {
		let storage = self.locate(target)?.storage_model()?;
		Ok(self
			.reverse
			.keys()
			.filter(|(model, _)| *model == storage)
			.map(|(_, accessor)| accessor.as_str())
			.collect())
	}

	fn resolve_relations(&mut self) -> Result<()> {
		let mut declared: Vec<(ModelRef, FieldDef)> = Vec::new();
		for hierarchy in &self.hierarchies {
			for (owner, field) in hierarchy.relation_fields() {
				declared.push((hierarchy.model_ref(owner)?, field.clone()));
			}
		}
		for plain in &self.plain {
			for field in plain.table.fields().filter(|f| f.is_relation()) {
				declared.push((plain.model.clone(), field.clone()));
			}
		}

		let mut relations = Vec::with_capacity(declared.len());
		for (owner, field) in declared {
			let Some(relation) = field.relation.as_ref() else {
				continue;
			};
			let location = self.locate(&owner)?;
			let storage_model = location.storage_model()?;
			let resolved = rewrite_relation(
				RelationOwner {
					model: &owner,
					storage_model: &storage_model,
					table: location.table().name(),
					scope: location.scope()?,
				},
				&field.name,
				&field.column(),
				relation,
				|target| self.target_storage(target),
			)?;
			relations.push(resolved);
		}

		let mut reverse = IndexMap::new();
		for (i, relation) in relations.iter().enumerate() {
			let key = (
				relation.target_storage.clone(),
				relation.reverse_accessor.clone(),
			);
			if let Some(&first) = reverse.get(&key) {
				let first: &ResolvedRelation = &relations[first];
				return Err(TypedModelError::AccessorClash {
					target: relation.target_storage.to_string(),
					accessor: relation.reverse_accessor.clone(),
					first: format!("{}.{}", first.owner, first.field),
					second: format!("{}.{}", relation.owner, relation.field),
				});
			}
			reverse.insert(key, i);
		}

		self.relations = relations;
		self.reverse = reverse;
		Ok(())
	}

	fn target_storage(&self, target: &ModelRef) -> Option<TargetStorage> {
		let location = self.locate(target).ok()?;
		Some(TargetStorage {
			storage_model: location.storage_model().ok()?,
			table: location.table().name().to_string(),
			limit_choices_to: location.scope().ok()?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::hierarchy::SubtypeDecl;
	use crate::relation::RelationKind;
	use rstest::{fixture, rstest};

	fn person() -> ModelRef {
		ModelRef::new("app", "Person")
	}

	fn animal(name: &str) -> ModelRef {
		ModelRef::new("app", name)
	}

	#[fixture]
	fn registry() -> ModelRegistry {
		ModelRegistry::builder(TypedModelsSettings::default())
			.plain(
				PlainModel::new("app", "Keeper")
					.field(FieldDef::foreign_key("favourite", animal("Canine")).nullable())
					.field(FieldDef::one_to_one("mascot", animal("Animal")).nullable()),
			)
			.hierarchy(
				HierarchyDecl::new("app", "Animal")
					.field(FieldDef::char("name", 255))
					.subtype(
						SubtypeDecl::new("Canine")
							.field(FieldDef::foreign_key("owner", person()).nullable()),
					)
					.subtype(
						SubtypeDecl::new("Feline")
							.field(FieldDef::foreign_key("keeper", person()).nullable()),
					)
					.subtype(SubtypeDecl::new("Puppy").parent("Canine")),
			)
			.plain(PlainModel::new("app", "Person").field(FieldDef::char("name", 100)))
			.build()
			.unwrap()
	}

	#[rstest]
	fn test_typed_target_restricted_to_final_subtypes(registry: ModelRegistry) {
		let keeper = ModelRef::new("app", "Keeper");
		let relation = registry.forward_relation(&keeper, "favourite").unwrap();
		assert_eq!(relation.target_storage, animal("Animal"));
		assert_eq!(relation.target_table, "app_animal");
		assert_eq!(
			relation.limit_choices_to,
			Some(vec!["app.canine".to_string(), "app.puppy".to_string()])
		);
	}

	#[rstest]
	fn test_base_target_unrestricted(registry: ModelRegistry) {
		let keeper = ModelRef::new("app", "Keeper");
		let relation = registry.forward_relation(&keeper, "mascot").unwrap();
		assert_eq!(relation.limit_choices_to, None);
		assert_eq!(relation.kind, RelationKind::OneToOne);
		assert_eq!(relation.reverse_accessor, "keeper");
	}

	#[rstest]
	fn test_reverse_accessors_named_after_subtypes(registry: ModelRegistry) {
		let mut accessors = registry.reverse_accessors(&person()).unwrap();
		accessors.sort();
		assert_eq!(accessors, ["canine_set", "feline_set"]);
		let relation = registry.reverse_relation(&person(), "feline_set").unwrap();
		assert_eq!(relation.owner, animal("Feline"));
		assert_eq!(relation.owner_storage, animal("Animal"));
		assert_eq!(relation.owner_scope, Some(vec!["app.feline".to_string()]));
	}

	#[rstest]
	fn test_reverse_accessor_reachable_from_any_stored_type(registry: ModelRegistry) {
		let relation = registry
			.reverse_relation(&animal("Puppy"), "keeper_set")
			.unwrap();
		assert_eq!(relation.field, "favourite");
	}

	#[rstest]
	fn test_subtype_sees_inherited_relation(registry: ModelRegistry) {
		let relation = registry.forward_relation(&animal("Puppy"), "owner").unwrap();
		assert_eq!(relation.owner, animal("Canine"));
		assert_eq!(relation.column, "owner_id");
		assert!(registry.forward_relation(&animal("Feline"), "owner").is_err());
		assert!(registry.forward_relation(&animal("Animal"), "keeper").is_ok());
	}

	#[rstest]
	fn test_unknown_relation_target() {
		let err = ModelRegistry::builder(TypedModelsSettings::default())
			.plain(PlainModel::new("app", "Keeper").field(FieldDef::foreign_key("pet", animal("Dodo"))))
			.build()
			.unwrap_err();
		assert!(matches!(err, TypedModelError::UnknownModel(name) if name == "app.Dodo"));
	}

	#[rstest]
	fn test_explicit_related_names_clash() {
		let err = ModelRegistry::builder(TypedModelsSettings {
			field_collision: crate::settings::FieldCollisionPolicy::LastWriterWins,
			..Default::default()
		})
		.plain(PlainModel::new("app", "Person"))
		.hierarchy(
			HierarchyDecl::new("app", "Animal")
				.subtype(
					SubtypeDecl::new("Canine")
						.field(FieldDef::foreign_key("owner", person()).related_name("pets")),
				)
				.subtype(
					SubtypeDecl::new("Feline")
						.field(FieldDef::foreign_key("owner", person()).related_name("pets")),
				),
		)
		.build()
		.unwrap_err();
		assert!(matches!(
			err,
			TypedModelError::AccessorClash { ref accessor, .. } if accessor == "pets"
		));
	}

	#[rstest]
	fn test_same_model_declared_twice() {
		let err = ModelRegistry::builder(TypedModelsSettings::default())
			.plain(PlainModel::new("app", "Canine"))
			.hierarchy(HierarchyDecl::new("app", "Animal").subtype(SubtypeDecl::new("Canine")))
			.build()
			.unwrap_err();
		assert!(matches!(err, TypedModelError::StructuralMisuse(_)));
	}

	#[rstest]
	fn test_hierarchy_of_plain_model_is_misuse(registry: ModelRegistry) {
		assert!(registry.hierarchy_of(&person()).is_err());
		let (hierarchy, name) = registry.hierarchy_of(&animal("Puppy")).unwrap();
		assert_eq!(hierarchy.name(), "Animal");
		assert_eq!(name, "Puppy");
	}
}
