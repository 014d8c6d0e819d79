//! Decoding instances into user-defined variant enums
//!
//! ```
//! use reinhardt_typedmodels_core::fields::FieldDef;
//! use reinhardt_typedmodels_core::hierarchy::{HierarchyDecl, SubtypeDecl};
//! use reinhardt_typedmodels_core::instance::Instance;
//! use reinhardt_typedmodels_core::settings::TypedModelsSettings;
//! use reinhardt_typedmodels_core::variants::VariantDecoder;
//! use std::sync::Arc;
//!
//! #[derive(Debug, PartialEq)]
//! enum Animal {
//!     Dog(Option<bool>),
//!     Cat,
//! }
//!
//! let animals = Arc::new(
//!     HierarchyDecl::new("app", "Animal")
//!         .subtype(SubtypeDecl::new("Canine").field(FieldDef::boolean("good_boy")))
//!         .subtype(SubtypeDecl::new("Feline"))
//!         .subtype(SubtypeDecl::new("Puppy").parent("Canine"))
//!         .build(&TypedModelsSettings::default())
//!         .unwrap(),
//! );
//!
//! let decoder = VariantDecoder::new(animals.clone())
//!     .variant("Canine", |i| Ok(Animal::Dog(i.get("good_boy").and_then(|v| v.as_bool()))))
//!     .unwrap()
//!     .variant("Feline", |_| Ok(Animal::Cat))
//!     .unwrap();
//!
//! let puppy = Instance::new(animals, "Puppy").unwrap();
//! assert_eq!(decoder.decode(&puppy).unwrap(), Animal::Dog(None));
//! ```

use crate::error::{Result, TypedModelError};
use crate::hierarchy::TypedHierarchy;
use crate::instance::Instance;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type Constructor<T> = Box<dyn Fn(&Instance) -> Result<T> + Send + Sync>;

/// Maps the types of one hierarchy to constructors of `T`
///
/// A type without its own constructor decodes through its nearest ancestor
/// that has one.
pub struct VariantDecoder<T> {
	hierarchy: Arc<TypedHierarchy>,
	constructors: IndexMap<String, Constructor<T>>,
}

impl<T> VariantDecoder<T> {
	pub fn new(hierarchy: Arc<TypedHierarchy>) -> Self {
		Self {
			hierarchy,
			constructors: IndexMap::new(),
		}
	}

	/// Register the constructor used for `model`
	pub fn variant<F>(mut self, model: &str, constructor: F) -> Result<Self>
	where
		F: Fn(&Instance) -> Result<T> + Send + Sync + 'static,
	{
		if !self.hierarchy.contains(model) {
			return Err(self.hierarchy.unknown(model));
		}
		self.constructors
			.insert(model.to_string(), Box::new(constructor));
		Ok(self)
	}

	/// Decode `instance` with the constructor of its type or nearest ancestor
	pub fn decode(&self, instance: &Instance) -> Result<T> {
		let model = instance.model();
		if let Some(constructor) = self.constructors.get(model) {
			return constructor(instance);
		}
		for ancestor in self.hierarchy.ancestors(model)?.into_iter().rev() {
			if let Some(constructor) = self.constructors.get(ancestor) {
				tracing::trace!(model, variant = ancestor, "decoding through ancestor variant");
				return constructor(instance);
			}
		}
		Err(TypedModelError::misuse(format!(
			"no variant of {} covers {model}",
			self.hierarchy.name()
		)))
	}

	/// Materialize a stored row and decode it
	pub fn decode_row(&self, row: IndexMap<String, Value>) -> Result<T> {
		let instance = Instance::from_row(self.hierarchy.clone(), row)?;
		self.decode(&instance)
	}
}

impl<T> fmt::Debug for VariantDecoder<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("VariantDecoder")
			.field("hierarchy", &self.hierarchy.name())
			.field("variants", &self.constructors.keys().collect::<Vec<_>>())
			.finish()
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

	#[derive(Debug, PartialEq, Deserialize)]
	struct Cat {
		name: String,
		lives: Option<i32>,
	}

	#[derive(Debug, PartialEq)]
	enum Pet {
		Generic(String),
		Cat(Cat),
	}

	#[fixture]
	fn animals() -> Arc<TypedHierarchy> {
		Arc::new(
			HierarchyDecl::new("app", "Animal")
				.field(FieldDef::char("name", 255))
				.subtype(SubtypeDecl::new("Canine"))
				.subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives")))
				.subtype(SubtypeDecl::new("Puppy").parent("Canine"))
				.build(&TypedModelsSettings::default())
				.unwrap(),
		)
	}

	fn decoder(animals: Arc<TypedHierarchy>) -> VariantDecoder<Pet> {
		VariantDecoder::new(animals)
			.variant("Animal", |i| Ok(Pet::Generic(i.model().to_string())))
			.unwrap()
			.variant("Feline", |i| Ok(Pet::Cat(i.to_model()?)))
			.unwrap()
	}

	#[rstest]
	fn test_decode_row_to_variant(animals: Arc<TypedHierarchy>) {
		let row = [
			("id", json!(3)),
			("type", json!("app.feline")),
			("name", json!("Tom")),
			("lives", json!(9)),
		]
		.into_iter()
		.map(|(k, v)| (k.to_string(), v))
		.collect();
		assert_eq!(
			decoder(animals).decode_row(row).unwrap(),
			Pet::Cat(Cat {
				name: "Tom".to_string(),
				lives: Some(9),
			})
		);
	}

	#[rstest]
	fn test_falls_back_to_nearest_ancestor(animals: Arc<TypedHierarchy>) {
		let puppy = Instance::new(animals.clone(), "Puppy").unwrap();
		assert_eq!(
			decoder(animals).decode(&puppy).unwrap(),
			Pet::Generic("Puppy".to_string())
		);
	}

	#[rstest]
	fn test_uncovered_type(animals: Arc<TypedHierarchy>) {
		let only_cats = VariantDecoder::new(animals.clone())
			.variant("Feline", |_| Ok(()))
			.unwrap();
		let dog = Instance::new(animals, "Canine").unwrap();
		assert!(matches!(
			only_cats.decode(&dog),
			Err(TypedModelError::StructuralMisuse(_))
		));
	}

	#[rstest]
	fn test_unknown_variant_name(animals: Arc<TypedHierarchy>) {
		assert!(
			VariantDecoder::<()>::new(animals)
				.variant("Unicorn", |_| Ok(()))
				.is_err()
		);
	}
}
