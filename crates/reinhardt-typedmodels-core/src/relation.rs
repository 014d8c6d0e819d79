//! # Relation Rewriting
//!
//! Relation fields declared on a subtype physically live on the shared table of
//! the hierarchy. When the target of a relation is itself a typed subtype, the
//! relation is redirected to the target's base table and restricted to rows
//! whose discriminator belongs to the target's subtypes-list, so traversal
//! still only yields semantically valid targets.
//!
//! Reverse accessors are named after the *declaring* model, never after the
//! base it was migrated to. Two subtypes relating to the same target therefore
//! get distinct accessors (`canine_set`, `feline_set`) instead of clashing on
//! `animal_set`.

use crate::error::{Result, TypedModelError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a model by application label and model name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef {
	pub app_label: String,
	pub name: String,
}

impl ModelRef {
	/// Create a model reference
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::relation::ModelRef;
	///
	/// let model = ModelRef::new("app", "Canine");
	/// assert_eq!(model.to_string(), "app.Canine");
	/// ```
	pub fn new(app_label: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			app_label: app_label.into(),
			name: name.into(),
		}
	}

	/// Parse an `"app_label.Model"` reference
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::relation::ModelRef;
	///
	/// let model = ModelRef::parse("zoo.Keeper").unwrap();
	/// assert_eq!(model.app_label, "zoo");
	/// assert_eq!(model.name, "Keeper");
	/// assert!(ModelRef::parse("Keeper").is_err());
	/// ```
	pub fn parse(reference: &str) -> Result<Self> {
		match reference.split_once('.') {
			Some((app_label, name)) if !app_label.is_empty() && !name.is_empty() => {
				Ok(Self::new(app_label, name))
			}
			_ => Err(TypedModelError::misuse(format!(
				"model reference {reference:?} must look like \"app_label.Model\""
			))),
		}
	}
}

impl fmt::Display for ModelRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.app_label, self.name)
	}
}

/// Cardinality of a relation field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
	ForeignKey,
	OneToOne,
}

/// Behaviour when the referenced row is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnDelete {
	#[default]
	Cascade,
	SetNull,
	Restrict,
	DoNothing,
}

/// Relation part of a field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
	pub kind: RelationKind,
	pub target: ModelRef,
	pub related_name: Option<String>,
	pub on_delete: OnDelete,
}

impl RelationDef {
	pub fn new(kind: RelationKind, target: ModelRef) -> Self {
		Self {
			kind,
			target,
			related_name: None,
			on_delete: OnDelete::default(),
		}
	}
}

/// Name of the accessor generated on the target of a relation
///
/// An explicit `related_name` always wins. Otherwise the name derives from
/// the declaring model: `<owner>_set` for foreign keys, `<owner>` for
/// one-to-one relations.
///
/// # Examples
///
/// ```
/// use reinhardt_typedmodels_core::relation::{RelationKind, reverse_accessor_name};
///
/// assert_eq!(reverse_accessor_name("Canine", None, RelationKind::ForeignKey), "canine_set");
/// assert_eq!(reverse_accessor_name("Canine", None, RelationKind::OneToOne), "canine");
/// assert_eq!(reverse_accessor_name("Canine", Some("dogs"), RelationKind::ForeignKey), "dogs");
/// ```
pub fn reverse_accessor_name(owner: &str, related_name: Option<&str>, kind: RelationKind) -> String {
	if let Some(name) = related_name {
		return name.to_string();
	}
	let owner = owner.to_lowercase();
	match kind {
		RelationKind::ForeignKey => format!("{owner}_set"),
		RelationKind::OneToOne => owner,
	}
}

/// Where a relation target is physically stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetStorage {
	/// Model owning the table (the base type for typed targets)
	pub storage_model: ModelRef,
	pub table: String,
	/// Discriminators the target may have, `None` when unrestricted
	pub limit_choices_to: Option<Vec<String>>,
}

/// A relation after target rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRelation {
	/// Field name on the declaring model
	pub field: String,
	/// Column holding the target primary key
	pub column: String,
	pub kind: RelationKind,
	pub on_delete: OnDelete,
	/// Model the field was declared on (a subtype when migrated)
	pub owner: ModelRef,
	/// Model owning the table the column lives in
	pub owner_storage: ModelRef,
	pub owner_table: String,
	/// Discriminators the owner rows may have, `None` when unrestricted
	pub owner_scope: Option<Vec<String>>,
	/// Target as declared
	pub target: ModelRef,
	/// Model owning the target table
	pub target_storage: ModelRef,
	pub target_table: String,
	/// Restriction applied when resolving the target
	pub limit_choices_to: Option<Vec<String>>,
	/// Accessor generated on the target storage model
	pub reverse_accessor: String,
}

/// Where the declaring side of a relation lives
#[derive(Debug, Clone)]
pub struct RelationOwner<'a> {
	pub model: &'a ModelRef,
	pub storage_model: &'a ModelRef,
	pub table: &'a str,
	pub scope: Option<Vec<String>>,
}

/// Rewrite a declared relation against its resolved target storage
///
/// `resolve` maps a declared target to where it lives; it returns `None` for
/// unknown models.
pub fn rewrite_relation<F>(
	owner: RelationOwner<'_>,
	field: &str,
	column: &str,
	relation: &RelationDef,
	resolve: F,
) -> Result<ResolvedRelation>
where
	F: FnOnce(&ModelRef) -> Option<TargetStorage>,
{
	let storage = resolve(&relation.target)
		.ok_or_else(|| TypedModelError::UnknownModel(relation.target.to_string()))?;

	let reverse_accessor = reverse_accessor_name(
		&owner.model.name,
		relation.related_name.as_deref(),
		relation.kind,
	);

	tracing::debug!(
		owner = %owner.model,
		field,
		target = %relation.target,
		storage = %storage.storage_model,
		accessor = %reverse_accessor,
		"rewrote relation target"
	);

	Ok(ResolvedRelation {
		field: field.to_string(),
		column: column.to_string(),
		kind: relation.kind,
		on_delete: relation.on_delete,
		owner: owner.model.clone(),
		owner_storage: owner.storage_model.clone(),
		owner_table: owner.table.to_string(),
		owner_scope: owner.scope,
		target: relation.target.clone(),
		target_storage: storage.storage_model,
		target_table: storage.table,
		limit_choices_to: storage.limit_choices_to,
		reverse_accessor,
	})
}
