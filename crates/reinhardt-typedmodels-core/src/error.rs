//! Error types for typed model hierarchies
//!
//! Every failure in this crate is a programmer or data-integrity error and is
//! surfaced immediately. There is no retryable class.

/// Result alias used throughout the typed models core
pub type Result<T> = std::result::Result<T, TypedModelError>;

/// Errors raised while declaring, building or using typed model hierarchies
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TypedModelError {
	/// A discriminator was registered twice within one hierarchy
	#[error("Can't register {model} type {discriminator:?} to {base}: already registered to {existing}")]
	RegistrationConflict {
		base: String,
		discriminator: String,
		model: String,
		existing: String,
	},

	/// A stored or assigned discriminator is not registered in the hierarchy
	#[error("Invalid {base} identifier: {discriminator:?}")]
	InvalidDiscriminator { base: String, discriminator: String },

	/// Save attempted on an instance without a resolved discriminator
	#[error("Untyped {model} cannot be saved")]
	UntypedSave { model: String },

	/// An operation was used from the wrong place in the hierarchy
	#[error("{0}")]
	StructuralMisuse(String),

	/// A migrated field would overwrite an existing column of the shared table
	#[error("Field {field:?} declared by {declared_by} collides with a field of {base} declared by {existing}")]
	FieldCollision {
		base: String,
		field: String,
		declared_by: String,
		existing: String,
	},

	/// A model reference could not be resolved
	#[error("Unknown model {0:?}")]
	UnknownModel(String),

	/// Two relations generate the same reverse accessor on one target
	#[error("Reverse accessor {accessor:?} on {target} clashes between {first} and {second}")]
	AccessorClash {
		target: String,
		accessor: String,
		first: String,
		second: String,
	},

	/// A field value does not fit the field definition
	#[error("Invalid value for field {field:?}: {reason}")]
	InvalidValue { field: String, reason: String },

	/// Field values could not be converted to or from a model struct
	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl TypedModelError {
	pub(crate) fn misuse(message: impl Into<String>) -> Self {
		Self::StructuralMisuse(message.into())
	}

	pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidValue {
			field: field.into(),
			reason: reason.into(),
		}
	}
}
