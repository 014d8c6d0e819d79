//! End-to-end setup: settings file, environment overrides, registry build,
//! table creation and typed reads through the facade crate.

use reinhardt_typedmodels::prelude::*;
use reinhardt_typedmodels::{Error, load_settings, setup};
use rstest::rstest;
use serde::Deserialize;
use serial_test::serial;
use std::io::Write;

const SETTINGS: &str = r#"
discriminator_field = "kind"
auto_recast = true

[database]
url = "sqlite::memory:"
max_connections = 3
"#;

fn settings_file() -> tempfile::NamedTempFile {
	let mut file = tempfile::NamedTempFile::new().expect("Failed to create settings file");
	file.write_all(SETTINGS.as_bytes())
		.expect("Failed to write settings file");
	file
}

fn zoo(settings: TypedModelsSettings) -> ModelRegistry {
	ModelRegistry::builder(settings)
		.hierarchy(
			HierarchyDecl::new("zoo", "Animal")
				.field(FieldDef::char("name", 255))
				.subtype(SubtypeDecl::new("Canine").field(FieldDef::boolean("good_boy").with_default(true)))
				.subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives").with_default(9))),
		)
		.build()
		.unwrap()
}

#[derive(Debug, PartialEq)]
enum Animal {
	Dog { name: String, good_boy: bool },
	Cat { name: String, lives: i64 },
}

#[derive(Deserialize)]
struct Dog {
	name: String,
	good_boy: bool,
}

#[derive(Deserialize)]
struct Cat {
	name: String,
	lives: i64,
}

#[rstest]
#[serial(typedmodels_env)]
fn test_settings_file_with_env_override() {
	let file = settings_file();
	// SAFETY: serialized with every other test touching the environment
	unsafe {
		std::env::set_var("TYPEDMODELS_AUTO_RECAST", "false");
	}
	let settings = load_settings(Some(file.path()));
	unsafe {
		std::env::remove_var("TYPEDMODELS_AUTO_RECAST");
	}

	let settings = settings.unwrap();
	assert_eq!(settings.discriminator_field, "kind");
	assert!(!settings.auto_recast);
	let database = settings.database.unwrap();
	assert_eq!(database.url, "sqlite::memory:");
	assert_eq!(database.max_connections, 3);
}

#[rstest]
#[serial(typedmodels_env)]
fn test_invalid_env_value_is_reported() {
	unsafe {
		std::env::set_var("TYPEDMODELS_DISCRIMINATOR_MAX_LENGTH", "lots");
	}
	let result = load_settings(None::<&str>);
	unsafe {
		std::env::remove_var("TYPEDMODELS_DISCRIMINATOR_MAX_LENGTH");
	}
	assert!(result.is_err());
}

#[rstest]
#[serial(typedmodels_env)]
#[tokio::test]
async fn test_setup_and_decode_variants() {
	let file = settings_file();
	let registry = zoo(load_settings(Some(file.path())).unwrap());
	let db = setup(registry).await.unwrap();

	db.objects(&ModelRef::new("zoo", "Canine"))
		.unwrap()
		.create([("name", "Rex")])
		.await
		.unwrap();
	db.objects(&ModelRef::new("zoo", "Feline"))
		.unwrap()
		.create([("name", "Tom")])
		.await
		.unwrap();

	let animals = db.objects(&ModelRef::new("zoo", "Animal")).unwrap();
	let decoder = VariantDecoder::new(animals.hierarchy().clone())
		.variant("Canine", |i| {
			let dog: Dog = i.to_model()?;
			Ok(Animal::Dog {
				name: dog.name,
				good_boy: dog.good_boy,
			})
		})
		.unwrap()
		.variant("Feline", |i| {
			let cat: Cat = i.to_model()?;
			Ok(Animal::Cat {
				name: cat.name,
				lives: cat.lives,
			})
		})
		.unwrap();

	let decoded: Vec<Animal> = animals
		.query()
		.unwrap()
		.order_by("name")
		.unwrap()
		.all()
		.await
		.unwrap()
		.iter()
		.map(|i| decoder.decode(i).unwrap())
		.collect();
	assert_eq!(
		decoded,
		[
			Animal::Dog {
				name: "Rex".to_string(),
				good_boy: true,
			},
			Animal::Cat {
				name: "Tom".to_string(),
				lives: 9,
			},
		]
	);

	let stored = discriminators(&db).await;
	assert_eq!(stored, ["zoo.canine", "zoo.feline"]);
}

async fn discriminators(db: &TypedDatabase) -> Vec<String> {
	db.objects(&ModelRef::new("zoo", "Animal"))
		.unwrap()
		.query()
		.unwrap()
		.order_by("kind")
		.unwrap()
		.all()
		.await
		.unwrap()
		.iter()
		.filter_map(|i| i.discriminator().map(str::to_string))
		.collect()
}

#[rstest]
#[serial(typedmodels_env)]
#[tokio::test]
async fn test_setup_without_database_settings() {
	let err = setup(zoo(TypedModelsSettings::default())).await.unwrap_err();
	assert!(matches!(err, Error::Database(DatabaseError::NotConfigured)));
}
