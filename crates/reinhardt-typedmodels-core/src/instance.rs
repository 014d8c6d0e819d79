//! # Recast Engine
//!
//! An [`Instance`] is one row of a typed hierarchy together with the type it
//! currently presents as. Recasting keeps the runtime type and the stored
//! discriminator in agreement:
//!
//! - empty discriminator on a subtype: the subtype's own discriminator is
//!   assigned
//! - empty discriminator on the base: the instance stays unresolved and only
//!   fails when it is saved
//! - any other discriminator: it is looked up and the instance adopts the
//!   registered type
//!
//! Rows loaded from storage go through [`Instance::from_row`] and come out as
//! their concrete type directly.

use crate::error::{Result, TypedModelError};
use crate::fields::PRIMARY_KEY;
use crate::hierarchy::TypedHierarchy;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Whether instances are recast as soon as they are constructed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecastPolicy {
	#[default]
	Auto,
	Manual,
}

/// Recast state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecastState {
	/// No discriminator resolved yet
	Unresolved,
	/// Runtime type and discriminator agree
	Typed,
}

/// A row of a typed hierarchy, presenting as one concrete type
#[derive(Debug, Clone)]
pub struct Instance {
	hierarchy: Arc<TypedHierarchy>,
	model: String,
	values: IndexMap<String, Value>,
	state: RecastState,
}

impl Instance {
	/// Create a new, unsaved instance of `model` using the hierarchy's
	/// recast policy
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::fields::FieldDef;
	/// use reinhardt_typedmodels_core::hierarchy::{HierarchyDecl, SubtypeDecl};
	/// use reinhardt_typedmodels_core::instance::{Instance, RecastState};
	/// use reinhardt_typedmodels_core::settings::TypedModelsSettings;
	/// use std::sync::Arc;
	///
	/// let animals = Arc::new(
	///     HierarchyDecl::new("app", "Animal")
	///         .subtype(SubtypeDecl::new("Canine"))
	///         .build(&TypedModelsSettings::default())
	///         .unwrap(),
	/// );
	///
	/// let dog = Instance::new(animals.clone(), "Canine").unwrap();
	/// assert_eq!(dog.discriminator(), Some("app.canine"));
	///
	/// let animal = Instance::new(animals, "Animal").unwrap();
	/// assert_eq!(animal.state(), RecastState::Unresolved);
	/// ```
	pub fn new(hierarchy: Arc<TypedHierarchy>, model: &str) -> Result<Self> {
		let policy = hierarchy.recast_policy();
		Self::with_policy(hierarchy, model, policy)
	}

	/// Create a new instance with an explicit recast policy
	pub fn with_policy(
		hierarchy: Arc<TypedHierarchy>,
		model: &str,
		policy: RecastPolicy,
	) -> Result<Self> {
		if !hierarchy.contains(model) {
			return Err(hierarchy.unknown(model));
		}
		let mut instance = Self {
			hierarchy,
			model: model.to_string(),
			values: IndexMap::new(),
			state: RecastState::Unresolved,
		};
		instance.conform_values()?;
		if policy == RecastPolicy::Auto {
			instance.recast()?;
		}
		Ok(instance)
	}

	/// Materialize a stored row as its concrete type
	///
	/// `row` maps field names to stored values; columns not visible on the
	/// resolved type are dropped. Loads recast regardless of the recast
	/// policy.
	pub fn from_row(hierarchy: Arc<TypedHierarchy>, row: IndexMap<String, Value>) -> Result<Self> {
		let base = hierarchy.name().to_string();
		let mut instance = Self {
			hierarchy,
			model: base,
			values: row,
			state: RecastState::Unresolved,
		};
		instance.recast()?;
		instance.conform_values()?;
		Ok(instance)
	}

	/// Build an instance of `model` from a serializable struct
	///
	/// Every key of the serialized struct must be a field visible on `model`.
	pub fn from_model<T: Serialize>(
		hierarchy: Arc<TypedHierarchy>,
		model: &str,
		value: &T,
	) -> Result<Self> {
		let mut instance = Self::with_policy(hierarchy, model, RecastPolicy::Manual)?;
		match serde_json::to_value(value)? {
			Value::Object(map) => {
				for (field, value) in map {
					instance.set(&field, value)?;
				}
			}
			other => {
				return Err(TypedModelError::misuse(format!(
					"{model} instances can only be built from structs, got {other}"
				)));
			}
		}
		instance.recast()?;
		Ok(instance)
	}

	pub fn hierarchy(&self) -> &Arc<TypedHierarchy> {
		&self.hierarchy
	}

	/// Name of the type this instance currently presents as
	pub fn model(&self) -> &str {
		&self.model
	}

	pub fn state(&self) -> RecastState {
		self.state
	}

	pub fn is_typed(&self) -> bool {
		self.state == RecastState::Typed
	}

	/// Stored discriminator, `None` when empty
	pub fn discriminator(&self) -> Option<&str> {
		self.values
			.get(self.hierarchy.discriminator_field())
			.and_then(Value::as_str)
			.filter(|d| !d.is_empty())
	}

	/// Assign a new discriminator and recast to the type it names
	///
	/// An empty discriminator falls back to the instance's current type. An
	/// unregistered one is rejected and leaves the instance untouched.
	pub fn set_discriminator(&mut self, discriminator: &str) -> Result<()> {
		if !discriminator.is_empty() {
			self.hierarchy.registry().lookup(discriminator)?;
		}
		let field = self.hierarchy.discriminator_field().to_string();
		self.values
			.insert(field, Value::String(discriminator.to_string()));
		self.state = RecastState::Unresolved;
		self.recast()
	}

	/// Reconcile the runtime type with the stored discriminator
	pub fn recast(&mut self) -> Result<()> {
		let Some(discriminator) = self.discriminator().map(str::to_string) else {
			if self.hierarchy.is_base(&self.model) {
				tracing::trace!(model = %self.model, "deferring recast of untyped instance");
				self.state = RecastState::Unresolved;
				return Ok(());
			}
			let discriminator = self
				.hierarchy
				.subtype(&self.model)
				.map(|s| s.discriminator().to_string())
				.ok_or_else(|| self.hierarchy.unknown(&self.model))?;
			tracing::trace!(model = %self.model, discriminator = %discriminator, "assigned discriminator");
			let field = self.hierarchy.discriminator_field().to_string();
			self.values.insert(field, Value::String(discriminator));
			self.state = RecastState::Typed;
			return Ok(());
		};

		let resolved = self
			.hierarchy
			.registry()
			.lookup(&discriminator)?
			.name()
			.to_string();
		if resolved != self.model {
			tracing::trace!(
				from = %self.model,
				to = %resolved,
				discriminator = %discriminator,
				"recast instance"
			);
			self.model = resolved;
			self.conform_values()?;
		}
		self.state = RecastState::Typed;
		Ok(())
	}

	/// Recast, then refuse instances without a resolved discriminator
	pub fn ensure_typed(&mut self) -> Result<()> {
		self.recast()?;
		if self.state != RecastState::Typed {
			return Err(TypedModelError::UntypedSave {
				model: self.model.clone(),
			});
		}
		Ok(())
	}

	/// Check every visible value against its field definition
	pub fn validate(&self) -> Result<()> {
		for field in self.hierarchy.apparent_fields(&self.model)? {
			let value = self.values.get(&field.name).unwrap_or(&Value::Null);
			if field.name == self.hierarchy.discriminator_field() && self.discriminator().is_none() {
				continue;
			}
			field.validate_value(value)?;
		}
		Ok(())
	}

	pub fn get(&self, field: &str) -> Option<&Value> {
		self.values.get(field)
	}

	/// Set a visible field
	///
	/// Assigning the discriminator field re-types the instance.
	pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
		let value = value.into();
		if field == self.hierarchy.discriminator_field() {
			let discriminator = match &value {
				Value::String(s) => s.clone(),
				Value::Null => String::new(),
				other => {
					return Err(TypedModelError::invalid_value(
						field,
						format!("discriminators are strings, got {other}"),
					));
				}
			};
			return self.set_discriminator(&discriminator);
		}

		let definition = self
			.hierarchy
			.apparent_fields(&self.model)?
			.into_iter()
			.find(|f| f.name == field)
			.ok_or_else(|| {
				TypedModelError::invalid_value(field, format!("not a field of {}", self.model))
			})?;
		definition.validate_value(&value)?;
		self.values.insert(field.to_string(), value);
		Ok(())
	}

	/// Field values in table order
	pub fn values(&self) -> &IndexMap<String, Value> {
		&self.values
	}

	/// Primary key, `None` until the instance is saved
	pub fn pk(&self) -> Option<i64> {
		self.values.get(PRIMARY_KEY).and_then(Value::as_i64)
	}

	pub fn set_pk(&mut self, pk: i64) {
		self.values.insert(PRIMARY_KEY.to_string(), Value::from(pk));
	}

	/// Deserialize the visible field values into `T`
	pub fn to_model<T: DeserializeOwned>(&self) -> Result<T> {
		let object = self
			.values
			.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect::<serde_json::Map<_, _>>();
		Ok(serde_json::from_value(Value::Object(object))?)
	}

	// Keep exactly the fields visible on the current type, in table order,
	// filling missing ones with their default.
	fn conform_values(&mut self) -> Result<()> {
		let mut conformed = IndexMap::new();
		for field in self.hierarchy.apparent_fields(&self.model)? {
			let value = match self.values.swap_remove(&field.name) {
				Some(value) => value,
				None if field.name == self.hierarchy.discriminator_field() => {
					Value::String(String::new())
				}
				None => field.default.clone().unwrap_or(Value::Null),
			};
			conformed.insert(field.name.clone(), value);
		}
		self.values = conformed;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fields::FieldDef;
	use crate::hierarchy::{HierarchyDecl, SubtypeDecl};
	use crate::settings::TypedModelsSettings;
	use rstest::{fixture, rstest};
	use serde::Deserialize;
	use serde_json::json;

	#[fixture]
	fn animals() -> Arc<TypedHierarchy> {
		Arc::new(
			HierarchyDecl::new("app", "Animal")
				.field(FieldDef::char("name", 255).with_default(""))
				.subtype(SubtypeDecl::new("Canine").field(FieldDef::boolean("good_boy")))
				.subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives")))
				.subtype(SubtypeDecl::new("Puppy").parent("Canine"))
				.build(&TypedModelsSettings::default())
				.unwrap(),
		)
	}

	fn row(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.clone()))
			.collect()
	}

	#[rstest]
	fn test_new_subtype_gets_discriminator(animals: Arc<TypedHierarchy>) {
		let cat = Instance::new(animals, "Feline").unwrap();
		assert!(cat.is_typed());
		assert_eq!(cat.discriminator(), Some("app.feline"));
		assert_eq!(cat.get("name"), Some(&json!("")));
		assert_eq!(cat.get("lives"), Some(&Value::Null));
		assert!(cat.get("good_boy").is_none());
	}

	#[rstest]
	fn test_manual_policy_defers_recast(animals: Arc<TypedHierarchy>) {
		let mut cat = Instance::with_policy(animals, "Feline", RecastPolicy::Manual).unwrap();
		assert_eq!(cat.state(), RecastState::Unresolved);
		assert_eq!(cat.discriminator(), None);
		cat.recast().unwrap();
		assert_eq!(cat.discriminator(), Some("app.feline"));
	}

	#[rstest]
	fn test_base_recast_is_deferred_until_save(animals: Arc<TypedHierarchy>) {
		let mut animal = Instance::new(animals, "Animal").unwrap();
		assert_eq!(animal.state(), RecastState::Unresolved);
		let err = animal.ensure_typed().unwrap_err();
		assert_eq!(err.to_string(), "Untyped Animal cannot be saved");
	}

	#[rstest]
	fn test_explicit_discriminator_retypes_base(animals: Arc<TypedHierarchy>) {
		let mut animal = Instance::new(animals, "Animal").unwrap();
		animal.set("type", "app.puppy").unwrap();
		assert_eq!(animal.model(), "Puppy");
		assert!(animal.get("good_boy").is_some());
		assert!(animal.get("lives").is_none());
		animal.ensure_typed().unwrap();
	}

	#[rstest]
	fn test_unknown_discriminator_rejected(animals: Arc<TypedHierarchy>) {
		let mut animal = Instance::new(animals, "Animal").unwrap();
		let err = animal.set_discriminator("app.unicorn").unwrap_err();
		assert!(matches!(err, TypedModelError::InvalidDiscriminator { .. }));
	}

	#[rstest]
	fn test_rejected_discriminator_keeps_type(animals: Arc<TypedHierarchy>) {
		let mut cat = Instance::new(animals, "Feline").unwrap();
		assert!(cat.set("type", "app.unicorn").is_err());
		assert_eq!(cat.model(), "Feline");
		assert_eq!(cat.discriminator(), Some("app.feline"));
		assert_eq!(cat.state(), RecastState::Typed);
		assert_eq!(cat.get("type"), Some(&json!("app.feline")));
	}

	#[rstest]
	fn test_from_row_decodes_concrete_type(animals: Arc<TypedHierarchy>) {
		let instance = Instance::from_row(
			animals,
			row(&[
				("id", json!(7)),
				("type", json!("app.canine")),
				("name", json!("Rex")),
				("good_boy", json!(true)),
				("lives", Value::Null),
			]),
		)
		.unwrap();
		assert_eq!(instance.model(), "Canine");
		assert_eq!(instance.pk(), Some(7));
		assert_eq!(
			instance.values().keys().collect::<Vec<_>>(),
			["id", "type", "name", "good_boy"]
		);
	}

	#[rstest]
	fn test_from_row_with_stale_discriminator(animals: Arc<TypedHierarchy>) {
		let err = Instance::from_row(
			animals,
			row(&[("id", json!(1)), ("type", json!("app.dodo"))]),
		)
		.unwrap_err();
		assert_eq!(err.to_string(), "Invalid Animal identifier: \"app.dodo\"");
	}

	#[rstest]
	fn test_set_rejects_invisible_field(animals: Arc<TypedHierarchy>) {
		let mut cat = Instance::new(animals, "Feline").unwrap();
		let err = cat.set("good_boy", true).unwrap_err();
		assert!(matches!(err, TypedModelError::InvalidValue { .. }));
		cat.set("lives", 9).unwrap();
		assert_eq!(cat.get("lives"), Some(&json!(9)));
	}

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Cat {
		id: Option<i64>,
		name: String,
		lives: Option<i32>,
	}

	#[rstest]
	fn test_model_conversion(animals: Arc<TypedHierarchy>) {
		let cat = Cat {
			id: None,
			name: "Tom".to_string(),
			lives: Some(9),
		};
		let instance = Instance::from_model(animals, "Feline", &cat).unwrap();
		assert_eq!(instance.discriminator(), Some("app.feline"));
		assert_eq!(instance.to_model::<Cat>().unwrap(), cat);
	}

	#[rstest]
	fn test_validate_checks_required_fields(animals: Arc<TypedHierarchy>) {
		let mut cat = Instance::new(animals, "Feline").unwrap();
		cat.validate().unwrap();
		cat.values.insert("name".to_string(), Value::Null);
		assert!(cat.validate().is_err());
	}
}
