//! Field definitions for typed model hierarchies
//!
//! The subset of column types a shared table needs, with value validation.

use crate::error::{Result, TypedModelError};
use crate::relation::{ModelRef, OnDelete, RelationDef, RelationKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the implicit auto-incremented primary key column
pub const PRIMARY_KEY: &str = "id";

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
	/// Auto-incremented integer primary key
	AutoField,
	/// Bounded string (`VARCHAR(max_length)`)
	Char { max_length: u32 },
	/// Unbounded string
	Text,
	/// 32-bit integer
	Integer,
	/// 64-bit integer
	BigInteger,
	/// Boolean
	Boolean,
	/// Double precision float
	Float,
	/// Many-to-one reference stored as the target primary key
	ForeignKey,
	/// One-to-one reference stored as the target primary key
	OneToOne,
}

impl FieldType {
	/// Whether values of this type are primary keys of another row
	pub fn is_relation(&self) -> bool {
		matches!(self, Self::ForeignKey | Self::OneToOne)
	}
}

/// A single field of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
	pub name: String,
	pub field_type: FieldType,
	pub null: bool,
	pub blank: bool,
	pub db_index: bool,
	pub unique: bool,
	pub choices: Vec<(String, String)>,
	pub default: Option<Value>,
	pub relation: Option<RelationDef>,
}

impl FieldDef {
	/// Creates a non-null field of the given type
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::fields::{FieldDef, FieldType};
	///
	/// let field = FieldDef::new("age", FieldType::Integer);
	/// assert_eq!(field.name, "age");
	/// assert!(!field.null);
	/// assert!(!field.db_index);
	/// ```
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			null: false,
			blank: false,
			db_index: false,
			unique: false,
			choices: Vec::new(),
			default: None,
			relation: None,
		}
	}

	pub fn auto(name: impl Into<String>) -> Self {
		Self::new(name, FieldType::AutoField)
	}

	pub fn char(name: impl Into<String>, max_length: u32) -> Self {
		Self::new(name, FieldType::Char { max_length })
	}

	pub fn text(name: impl Into<String>) -> Self {
		Self::new(name, FieldType::Text)
	}

	pub fn integer(name: impl Into<String>) -> Self {
		Self::new(name, FieldType::Integer)
	}

	pub fn big_integer(name: impl Into<String>) -> Self {
		Self::new(name, FieldType::BigInteger)
	}

	pub fn boolean(name: impl Into<String>) -> Self {
		Self::new(name, FieldType::Boolean)
	}

	pub fn float(name: impl Into<String>) -> Self {
		Self::new(name, FieldType::Float)
	}

	/// Creates a many-to-one relation to `target`
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::fields::FieldDef;
	/// use reinhardt_typedmodels_core::relation::ModelRef;
	///
	/// let field = FieldDef::foreign_key("owner", ModelRef::new("app", "Person"));
	/// assert_eq!(field.column(), "owner_id");
	/// assert!(field.is_relation());
	/// ```
	pub fn foreign_key(name: impl Into<String>, target: ModelRef) -> Self {
		let mut field = Self::new(name, FieldType::ForeignKey);
		field.relation = Some(RelationDef::new(RelationKind::ForeignKey, target));
		field
	}

	/// Creates a one-to-one relation to `target`
	pub fn one_to_one(name: impl Into<String>, target: ModelRef) -> Self {
		let mut field = Self::new(name, FieldType::OneToOne);
		field.relation = Some(RelationDef::new(RelationKind::OneToOne, target));
		field
	}

	/// Allow NULL in the column
	pub fn nullable(mut self) -> Self {
		self.null = true;
		self
	}

	/// Allow empty values in forms
	pub fn blank(mut self) -> Self {
		self.blank = true;
		self
	}

	pub fn indexed(mut self) -> Self {
		self.db_index = true;
		self
	}

	pub fn unique(mut self) -> Self {
		self.unique = true;
		self
	}

	pub fn with_choices<I, K, L>(mut self, choices: I) -> Self
	where
		I: IntoIterator<Item = (K, L)>,
		K: Into<String>,
		L: Into<String>,
	{
		self.choices = choices
			.into_iter()
			.map(|(k, l)| (k.into(), l.into()))
			.collect();
		self
	}

	pub fn with_default(mut self, default: impl Into<Value>) -> Self {
		self.default = Some(default.into());
		self
	}

	/// Set the reverse accessor name of a relation field
	///
	/// Has no effect on non-relation fields.
	pub fn related_name(mut self, related_name: impl Into<String>) -> Self {
		if let Some(relation) = self.relation.as_mut() {
			relation.related_name = Some(related_name.into());
		}
		self
	}

	/// Set what happens to this row when the relation target is deleted
	pub fn on_delete(mut self, on_delete: OnDelete) -> Self {
		if let Some(relation) = self.relation.as_mut() {
			relation.on_delete = on_delete;
		}
		self
	}

	pub fn is_relation(&self) -> bool {
		self.relation.is_some()
	}

	pub fn is_primary_key(&self) -> bool {
		self.field_type == FieldType::AutoField
	}

	/// Column name in the table (`<name>_id` for relations)
	pub fn column(&self) -> String {
		if self.field_type.is_relation() {
			format!("{}_id", self.name)
		} else {
			self.name.clone()
		}
	}

	/// Check that `value` can be stored in this field
	///
	/// `null` is accepted for nullable fields and for the primary key, which
	/// stays empty until the row is inserted.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::fields::FieldDef;
	/// use serde_json::json;
	///
	/// let field = FieldDef::char("name", 4);
	/// assert!(field.validate_value(&json!("Rex")).is_ok());
	/// assert!(field.validate_value(&json!("Rexxy")).is_err());
	/// assert!(field.validate_value(&json!(null)).is_err());
	/// ```
	pub fn validate_value(&self, value: &Value) -> Result<()> {
		if value.is_null() {
			if self.null || self.is_primary_key() {
				return Ok(());
			}
			return Err(TypedModelError::invalid_value(
				&self.name,
				"field is not nullable",
			));
		}

		let ok = match self.field_type {
			FieldType::Char { max_length } => match value.as_str() {
				Some(s) if s.chars().count() > max_length as usize => {
					return Err(TypedModelError::invalid_value(
						&self.name,
						format!("longer than max_length {max_length}"),
					));
				}
				Some(_) => true,
				None => false,
			},
			FieldType::Text => value.is_string(),
			// Stored as 32-bit `integer` columns.
			FieldType::AutoField
			| FieldType::Integer
			| FieldType::ForeignKey
			| FieldType::OneToOne => match value.as_i64() {
				Some(n) if i32::try_from(n).is_err() => {
					return Err(TypedModelError::invalid_value(
						&self.name,
						format!("{n} is out of range for a 32-bit integer"),
					));
				}
				Some(_) => true,
				None if value.is_u64() => {
					return Err(TypedModelError::invalid_value(
						&self.name,
						format!("{value} is out of range for a 32-bit integer"),
					));
				}
				None => false,
			},
			FieldType::BigInteger => value.is_i64() || value.is_u64(),
			FieldType::Boolean => value.is_boolean(),
			FieldType::Float => value.is_number(),
		};
		if !ok {
			return Err(TypedModelError::invalid_value(
				&self.name,
				format!("expected {:?}, got {value}", self.field_type),
			));
		}

		if !self.choices.is_empty()
			&& let Some(s) = value.as_str()
			&& !s.is_empty()
			&& !self.choices.iter().any(|(key, _)| key == s)
		{
			return Err(TypedModelError::invalid_value(
				&self.name,
				format!("{s:?} is not a valid choice"),
			));
		}
		Ok(())
	}
}
