//! Integration tests for typed hierarchies built through the model registry
//!
//! Covers the Animal / Canine / Feline / Puppy hierarchy end to end without a
//! database: registration, field visibility, recast and relation rewriting.

use indexmap::IndexMap;
use reinhardt_typedmodels_core::prelude::*;
use reinhardt_typedmodels_core::{Subtype, TypeRegistry};
use rstest::{fixture, rstest};
use serde_json::{Value, json};
use std::sync::Arc;

fn animals() -> HierarchyDecl {
	HierarchyDecl::new("app", "Animal")
		.field(FieldDef::char("name", 255))
		.subtype(
			SubtypeDecl::new("Canine")
				.field(FieldDef::boolean("good_boy").with_default(true))
				.field(FieldDef::foreign_key("owner", ModelRef::new("app", "Person")).nullable()),
		)
		.subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives")))
}

#[fixture]
fn registry() -> ModelRegistry {
	ModelRegistry::builder(TypedModelsSettings::default())
		.plain(PlainModel::new("app", "Person").field(FieldDef::char("name", 100)))
		.hierarchy(animals().subtype(SubtypeDecl::new("Puppy").parent("Canine")))
		.build()
		.unwrap()
}

fn hierarchy(registry: &ModelRegistry) -> Arc<TypedHierarchy> {
	Arc::clone(registry.hierarchy("Animal").unwrap())
}

#[rstest]
fn test_new_canine_is_typed(registry: ModelRegistry) {
	let mut rex = Instance::new(hierarchy(&registry), "Canine").unwrap();
	rex.set("name", "Rex").unwrap();

	assert_eq!(rex.discriminator(), Some("app.canine"));
	assert_eq!(rex.get("good_boy"), Some(&json!(true)));
	rex.ensure_typed().unwrap();
	rex.validate().unwrap();
}

#[rstest]
#[case("app.canine", "Canine")]
#[case("app.feline", "Feline")]
#[case("app.puppy", "Puppy")]
fn test_rows_load_as_their_subtype(
	registry: ModelRegistry,
	#[case] discriminator: &str,
	#[case] expected: &str,
) {
	let row: IndexMap<String, Value> = [
		("id".to_string(), json!(1)),
		("type".to_string(), json!(discriminator)),
		("name".to_string(), json!("x")),
	]
	.into_iter()
	.collect();
	let instance = Instance::from_row(hierarchy(&registry), row).unwrap();
	assert_eq!(instance.model(), expected);
	assert!(instance.is_typed());
}

#[rstest]
fn test_puppy_extends_canine_subtypes(registry: ModelRegistry) {
	let animals = hierarchy(&registry);
	assert_eq!(
		animals.registry().subtypes_of("Canine").unwrap(),
		["app.canine", "app.puppy"]
	);
	assert_eq!(animals.scope_of("Feline").unwrap(), Some(vec!["app.feline"]));
	assert_eq!(animals.scope_of("Animal").unwrap(), None);
}

#[rstest]
fn test_apparent_fields_follow_ancestor_chain(registry: ModelRegistry) {
	let animals = hierarchy(&registry);
	assert_eq!(
		animals.apparent_field_names("Puppy").unwrap(),
		["id", "type", "name", "good_boy", "owner"]
	);
	assert_eq!(
		animals.apparent_field_names("Feline").unwrap(),
		["id", "type", "name", "lives"]
	);
}

#[rstest]
fn test_relation_on_subtype_is_scoped(registry: ModelRegistry) {
	let person = ModelRef::new("app", "Person");
	let relation = registry.reverse_relation(&person, "canine_set").unwrap();
	assert_eq!(relation.owner_table, "app_animal");
	assert_eq!(
		relation.owner_scope,
		Some(vec!["app.canine".to_string(), "app.puppy".to_string()])
	);
	assert!(registry.reverse_relation(&person, "animal_set").is_err());
}

#[rstest]
fn test_unsaved_base_instance_cannot_be_saved(registry: ModelRegistry) {
	let mut animal = Instance::new(hierarchy(&registry), "Animal").unwrap();
	assert!(matches!(
		animal.ensure_typed(),
		Err(TypedModelError::UntypedSave { .. })
	));
}

#[rstest]
fn test_type_classes_from_base_only(registry: ModelRegistry) {
	let animals = hierarchy(&registry);
	let names: Vec<_> = animals
		.registry()
		.type_classes("Animal")
		.unwrap()
		.into_iter()
		.map(Subtype::name)
		.collect();
	assert_eq!(names, ["Canine", "Feline", "Puppy"]);
	assert!(animals.registry().type_classes("Puppy").is_err());
}

#[rstest]
fn test_sibling_field_collision_fails_fast() {
	let err = ModelRegistry::builder(TypedModelsSettings::default())
		.plain(PlainModel::new("app", "Person"))
		.hierarchy(animals().subtype(SubtypeDecl::new("Bird").field(FieldDef::integer("lives"))))
		.build()
		.unwrap_err();
	assert!(matches!(
		err,
		TypedModelError::FieldCollision { ref field, ref existing, .. }
			if field == "lives" && existing == "Feline"
	));
}

mod properties {
	use super::*;
	use proptest::prelude::*;

	// Random forests: subtype `i` derives from subtype `parents[i]` when that
	// index is smaller, from the base otherwise.
	fn build(parents: &[usize]) -> TypeRegistry {
		let mut registry = TypeRegistry::new("Base");
		for (i, &parent) in parents.iter().enumerate() {
			let parent = (parent < i).then(|| format!("T{parent}"));
			registry
				.register(Subtype::new(format!("T{i}"), "app", format!("t{i}"), parent, vec![]))
				.unwrap();
		}
		registry
	}

	proptest! {
		#[test]
		fn subtypes_list_is_own_discriminator_plus_descendants(
			parents in proptest::collection::vec(0usize..12, 1..12)
		) {
			let registry = build(&parents);
			for subtype in registry.iter() {
				let list = registry.subtypes_of(subtype.name()).unwrap();
				prop_assert_eq!(list[0], subtype.discriminator());

				for other in registry.iter() {
					let descends = other.name() == subtype.name()
						|| registry
							.ancestors(other.name())
							.unwrap()
							.contains(&subtype.name());
					prop_assert_eq!(list.contains(&other.discriminator()), descends);
				}
			}
			prop_assert_eq!(registry.subtypes_of("Base").unwrap().len(), parents.len());
		}

		#[test]
		fn apparent_fields_never_leak_between_siblings(
			parents in proptest::collection::vec(0usize..8, 1..8)
		) {
			let mut decl = HierarchyDecl::new("app", "Base");
			for (i, &parent) in parents.iter().enumerate() {
				let mut subtype = SubtypeDecl::new(format!("T{i}"))
					.field(FieldDef::integer(format!("f{i}")));
				if parent < i {
					subtype = subtype.parent(format!("T{parent}"));
				}
				decl = decl.subtype(subtype);
			}
			let hierarchy = decl.build(&TypedModelsSettings::default()).unwrap();

			for i in 0..parents.len() {
				let name = format!("T{i}");
				let mut chain: Vec<String> = hierarchy
					.ancestors(&name)
					.unwrap()
					.into_iter()
					.map(str::to_string)
					.collect();
				chain.push(name.clone());
				for j in 0..parents.len() {
					let visible = hierarchy.has_field(&name, &format!("f{j}")).unwrap();
					prop_assert_eq!(visible, chain.contains(&format!("T{j}")));
				}
			}
		}
	}
}
