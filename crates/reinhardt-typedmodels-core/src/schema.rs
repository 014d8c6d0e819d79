//! Physical table definition shared by a typed hierarchy

use crate::fields::FieldDef;
use indexmap::IndexMap;

/// One physical table: the base type's original fields followed by every
/// field migrated from a subtype, with the provenance of the latter
#[derive(Debug, Clone)]
pub struct TableSchema {
	name: String,
	fields: IndexMap<String, FieldDef>,
	original: Vec<String>,
	provenance: IndexMap<String, Vec<String>>,
}

impl TableSchema {
	/// Create a table whose fields are all original (declared on the base)
	pub fn new(name: impl Into<String>, original_fields: Vec<FieldDef>) -> Self {
		let original = original_fields.iter().map(|f| f.name.clone()).collect();
		let fields = original_fields
			.into_iter()
			.map(|f| (f.name.clone(), f))
			.collect();
		Self {
			name: name.into(),
			fields,
			original,
			provenance: IndexMap::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Every field in column order
	pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
		self.fields.values()
	}

	pub fn field(&self, name: &str) -> Option<&FieldDef> {
		self.fields.get(name)
	}

	/// Field owning column `column`
	pub fn field_by_column(&self, column: &str) -> Option<&FieldDef> {
		self.fields.values().find(|f| f.column() == column)
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn is_original(&self, name: &str) -> bool {
		self.original.iter().any(|o| o == name)
	}

	/// Fields declared on the base itself, before any migration
	pub fn original_fields(&self) -> impl Iterator<Item = &FieldDef> {
		self.original.iter().filter_map(|name| self.fields.get(name))
	}

	/// Subtypes that declared the migrated field `name`
	pub fn declared_by(&self, name: &str) -> &[String] {
		self.provenance.get(name).map_or(&[], Vec::as_slice)
	}

	/// Insert a migrated field, or replace the definition of an existing one
	/// in place, and record `declared_by` as one of its declaring subtypes
	pub(crate) fn put_migrated(&mut self, field: FieldDef, declared_by: &str) {
		let providers = self.provenance.entry(field.name.clone()).or_default();
		if !providers.iter().any(|p| p == declared_by) {
			providers.push(declared_by.to_string());
		}
		self.fields.insert(field.name.clone(), field);
	}

	/// Replace the choices of field `name`
	pub(crate) fn set_choices(&mut self, name: &str, choices: Vec<(String, String)>) {
		if let Some(field) = self.fields.get_mut(name) {
			field.choices = choices;
		}
	}
}
