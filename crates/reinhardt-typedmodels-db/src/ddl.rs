//! # Schema Emission
//!
//! One `CREATE TABLE` per hierarchy (primary key, discriminator, base fields
//! and every migrated field) and one per plain model, followed by indexes on
//! the discriminator, on indexed fields and on relation columns.
//!
//! Tables are ordered so that relation targets are created before the tables
//! referencing them. Cycles keep declaration order.

use crate::backend::{Backend, render};
use crate::error::Result;
use indexmap::IndexMap;
use reinhardt_typedmodels_core::relation::ResolvedRelation;
use reinhardt_typedmodels_core::{FieldDef, FieldType, ModelRegistry, OnDelete, TableSchema};
use sea_query::{
	Alias, ColumnDef, ForeignKey, ForeignKeyAction, Index, IndexCreateStatement, Table,
	TableCreateStatement,
};

/// Column definition of `field`
fn column_def(field: &FieldDef) -> ColumnDef {
	let mut column = ColumnDef::new(Alias::new(field.column()));
	match field.field_type {
		FieldType::AutoField => {
			column.integer().not_null().auto_increment().primary_key();
			return column;
		}
		FieldType::Char { max_length } => {
			column.string_len(max_length);
		}
		FieldType::Text => {
			column.text();
		}
		FieldType::Integer | FieldType::ForeignKey | FieldType::OneToOne => {
			column.integer();
		}
		FieldType::BigInteger => {
			column.big_integer();
		}
		FieldType::Boolean => {
			column.boolean();
		}
		FieldType::Float => {
			column.double();
		}
	}
	if field.null {
		column.null();
	} else {
		column.not_null();
	}
	if field.unique || field.field_type == FieldType::OneToOne {
		column.unique_key();
	}
	column
}

fn on_delete_action(on_delete: OnDelete) -> ForeignKeyAction {
	match on_delete {
		OnDelete::Cascade => ForeignKeyAction::Cascade,
		OnDelete::SetNull => ForeignKeyAction::SetNull,
		OnDelete::Restrict => ForeignKeyAction::Restrict,
		OnDelete::DoNothing => ForeignKeyAction::NoAction,
	}
}

/// `CREATE TABLE` for one table, with foreign keys for `relations`
///
/// Relations sharing a column yield one foreign key, taken from the last
/// of them, the same way the column definition itself is resolved.
pub fn create_table_statement(
	table: &TableSchema,
	relations: &[&ResolvedRelation],
) -> TableCreateStatement {
	let mut stmt = Table::create();
	stmt.table(Alias::new(table.name())).if_not_exists();
	for field in table.fields() {
		stmt.col(column_def(field));
	}

	let mut by_column: IndexMap<(&str, &str), &ResolvedRelation> = IndexMap::new();
	for relation in relations {
		by_column.insert(
			(relation.owner_table.as_str(), relation.column.as_str()),
			relation,
		);
	}
	for relation in by_column.into_values() {
		let mut fk = ForeignKey::create();
		fk.name(format!("{}_{}_fk", relation.owner_table, relation.column))
			.from(Alias::new(&relation.owner_table), Alias::new(&relation.column))
			.to(
				Alias::new(&relation.target_table),
				Alias::new(reinhardt_typedmodels_core::PRIMARY_KEY),
			)
			.on_delete(on_delete_action(relation.on_delete));
		stmt.foreign_key(&mut fk);
	}
	stmt
}

/// Indexes on indexed fields and relation columns of one table
pub fn create_index_statements(table: &TableSchema) -> Vec<IndexCreateStatement> {
	table
		.fields()
		.filter(|f| {
			!f.is_primary_key()
				&& !f.unique
				&& f.field_type != FieldType::OneToOne
				&& (f.db_index || f.is_relation())
		})
		.map(|field| {
			let column = field.column();
			Index::create()
				.if_not_exists()
				.name(format!("{}_{}_idx", table.name(), column))
				.table(Alias::new(table.name()))
				.col(Alias::new(column))
				.to_owned()
		})
		.collect()
}

/// Every table of `registry`, relation targets first
pub fn ordered_tables(registry: &ModelRegistry) -> Vec<&TableSchema> {
	let mut pending: Vec<&TableSchema> = registry
		.hierarchies()
		.map(|h| h.table())
		.chain(registry.plain_models().map(|p| p.table()))
		.collect();

	let depends_on = |table: &TableSchema, other: &TableSchema| {
		registry.relations().iter().any(|r| {
			r.owner_table == table.name()
				&& r.target_table == other.name()
				&& r.target_table != r.owner_table
		})
	};

	let mut ordered = Vec::with_capacity(pending.len());
	while !pending.is_empty() {
		let ready = pending.iter().position(|table| {
			!pending
				.iter()
				.any(|other| other.name() != table.name() && depends_on(table, other))
		});
		// Cycles fall back to declaration order.
		ordered.push(pending.remove(ready.unwrap_or(0)));
	}
	ordered
}

/// Every DDL statement of `registry`, rendered for `backend`
///
/// # Examples
///
/// ```
/// use reinhardt_typedmodels_core::prelude::*;
/// use reinhardt_typedmodels_db::backend::Backend;
/// use reinhardt_typedmodels_db::ddl::schema_sql;
///
/// let registry = ModelRegistry::builder(TypedModelsSettings::default())
///     .hierarchy(
///         HierarchyDecl::new("app", "Animal")
///             .field(FieldDef::char("name", 255))
///             .subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives"))),
///     )
///     .build()
///     .unwrap();
///
/// let sql = schema_sql(&registry, Backend::Sqlite).unwrap();
/// assert!(sql[0].starts_with(r#"CREATE TABLE IF NOT EXISTS "app_animal""#));
/// assert!(sql[0].contains(r#""lives" integer NULL"#));
/// assert!(sql[1].contains(r#""app_animal_type_idx""#));
/// ```
pub fn schema_sql(registry: &ModelRegistry, backend: Backend) -> Result<Vec<String>> {
	let mut statements = Vec::new();
	for table in ordered_tables(registry) {
		let relations: Vec<&ResolvedRelation> = registry
			.relations()
			.iter()
			.filter(|r| r.owner_table == table.name())
			.collect();
		let create = create_table_statement(table, &relations);
		statements.push(render!(backend, create));
		for index in create_index_statements(table) {
			statements.push(render!(backend, index));
		}
	}
	Ok(statements)
}

#[cfg(test)]
mod tests {
	use super::*;
	use reinhardt_typedmodels_core::prelude::*;
	use rstest::{fixture, rstest};

	#[fixture]
	fn registry() -> ModelRegistry {
		ModelRegistry::builder(TypedModelsSettings::default())
			.hierarchy(
				HierarchyDecl::new("app", "Animal")
					.field(FieldDef::char("name", 255))
					.subtype(
						SubtypeDecl::new("Canine").field(
							FieldDef::foreign_key("owner", ModelRef::new("app", "Person"))
								.on_delete(OnDelete::SetNull),
						),
					)
					.subtype(SubtypeDecl::new("Feline").field(FieldDef::integer("lives"))),
			)
			.plain(PlainModel::new("app", "Person").field(FieldDef::char("name", 100)))
			.build()
			.unwrap()
	}

	#[rstest]
	fn test_targets_created_first(registry: ModelRegistry) {
		let names: Vec<_> = ordered_tables(&registry).iter().map(|t| t.name()).collect();
		assert_eq!(names, ["app_person", "app_animal"]);
	}

	#[rstest]
	fn test_typed_table_layout(registry: ModelRegistry) {
		let sql = schema_sql(&registry, Backend::Sqlite).unwrap();
		let animal = sql
			.iter()
			.find(|s| s.starts_with(r#"CREATE TABLE IF NOT EXISTS "app_animal""#))
			.unwrap();
		assert!(animal.contains(r#""type" varchar(255) NOT NULL"#));
		assert!(animal.contains(r#""name" varchar(255) NOT NULL"#));
		assert!(animal.contains(r#""owner_id" integer NULL"#));
		assert!(animal.contains(r#""lives" integer NULL"#));
		assert!(animal.contains("ON DELETE SET NULL"));
	}

	#[rstest]
	fn test_shared_relation_column_has_one_foreign_key() {
		let registry = ModelRegistry::builder(TypedModelsSettings {
			field_collision: FieldCollisionPolicy::LastWriterWins,
			..Default::default()
		})
		.plain(PlainModel::new("app", "Person"))
		.hierarchy(
			HierarchyDecl::new("app", "Animal")
				.subtype(
					SubtypeDecl::new("Canine")
						.field(FieldDef::foreign_key("owner", ModelRef::new("app", "Person"))),
				)
				.subtype(
					SubtypeDecl::new("Feline").field(
						FieldDef::foreign_key("owner", ModelRef::new("app", "Person"))
							.on_delete(OnDelete::SetNull),
					),
				),
		)
		.build()
		.unwrap();

		let sql = schema_sql(&registry, Backend::Postgres).unwrap();
		let animal = sql
			.iter()
			.find(|s| s.starts_with(r#"CREATE TABLE IF NOT EXISTS "app_animal""#))
			.unwrap();
		assert_eq!(animal.matches(r#""app_animal_owner_id_fk""#).count(), 1);
		assert!(animal.contains("ON DELETE SET NULL"));
	}

	#[rstest]
	fn test_indexes_cover_discriminator_and_relations(registry: ModelRegistry) {
		let animals = registry.hierarchy("Animal").unwrap();
		let indexes: Vec<_> = create_index_statements(animals.table())
			.into_iter()
			.map(|i| render!(Backend::Postgres, i))
			.collect();
		assert_eq!(indexes.len(), 2);
		assert!(indexes[0].contains(r#""app_animal_type_idx""#));
		assert!(indexes[1].contains(r#""app_animal_owner_id_idx""#));
	}
}
