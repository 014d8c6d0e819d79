//! # Field Migration
//!
//! Fields declared on a subtype are lifted onto the base type's table and made
//! nullable there, since rows of other subtypes never carry them. Migration
//! always records provenance (field → declaring subtypes) so the field cache
//! can later show each field only to the branch that declared it.

use crate::error::{Result, TypedModelError};
use crate::fields::FieldDef;
use crate::schema::TableSchema;
use crate::settings::FieldCollisionPolicy;

/// Moves subtype fields onto the shared table of one hierarchy
#[derive(Debug, Clone, Copy)]
pub struct FieldMigrator<'a> {
	base: &'a str,
	policy: FieldCollisionPolicy,
}

impl<'a> FieldMigrator<'a> {
	pub fn new(base: &'a str, policy: FieldCollisionPolicy) -> Self {
		Self { base, policy }
	}

	/// Migrate `fields` declared by `subtype` into `table`
	///
	/// Returns the names of the migrated fields in declaration order.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::fields::FieldDef;
	/// use reinhardt_typedmodels_core::migrator::FieldMigrator;
	/// use reinhardt_typedmodels_core::schema::TableSchema;
	/// use reinhardt_typedmodels_core::settings::FieldCollisionPolicy;
	///
	/// let mut table = TableSchema::new("app_animal", vec![FieldDef::auto("id")]);
	/// let migrator = FieldMigrator::new("Animal", FieldCollisionPolicy::Reject);
	/// let declared = migrator
	///     .migrate(&mut table, "Canine", vec![FieldDef::boolean("good_boy")])
	///     .unwrap();
	///
	/// assert_eq!(declared, vec!["good_boy"]);
	/// assert!(table.field("good_boy").unwrap().null);
	/// assert_eq!(table.declared_by("good_boy"), ["Canine"]);
	/// ```
	pub fn migrate(
		&self,
		table: &mut TableSchema,
		subtype: &str,
		fields: Vec<FieldDef>,
	) -> Result<Vec<String>> {
		let mut declared: Vec<String> = Vec::with_capacity(fields.len());

		for mut field in fields {
			if declared.contains(&field.name) {
				return Err(TypedModelError::misuse(format!(
					"{subtype} declares field {:?} twice",
					field.name
				)));
			}
			if field.is_primary_key() {
				return Err(TypedModelError::misuse(format!(
					"{subtype} cannot declare primary key {:?}; subtypes share the key of {}",
					field.name, self.base
				)));
			}

			field.null = true;
			self.check_collision(table, subtype, &field)?;

			tracing::debug!(
				base = self.base,
				subtype,
				field = %field.name,
				table = table.name(),
				"migrated subtype field to base table"
			);
			declared.push(field.name.clone());
			table.put_migrated(field, subtype);
		}

		Ok(declared)
	}

	fn check_collision(&self, table: &TableSchema, subtype: &str, field: &FieldDef) -> Result<()> {
		let column = field.column();
		let clash = table
			.field(&field.name)
			.or_else(|| table.field_by_column(&column))
			.map(|existing| existing.name.clone());
		let Some(existing) = clash else {
			return Ok(());
		};

		let collision = |existing_owner: String| TypedModelError::FieldCollision {
			base: self.base.to_string(),
			field: field.name.clone(),
			declared_by: subtype.to_string(),
			existing: existing_owner,
		};

		if table.is_original(&existing) || existing != field.name {
			let owner = if table.is_original(&existing) {
				self.base.to_string()
			} else {
				table.declared_by(&existing).join(", ")
			};
			return Err(collision(owner));
		}

		let owners = table.declared_by(&existing).join(", ");
		match self.policy {
			FieldCollisionPolicy::Reject => Err(collision(owners)),
			FieldCollisionPolicy::LastWriterWins => {
				tracing::warn!(
					base = self.base,
					field = %field.name,
					previous = %owners,
					subtype,
					"field declared by several subtypes, keeping the latest definition"
				);
				Ok(())
			}
		}
	}
}
