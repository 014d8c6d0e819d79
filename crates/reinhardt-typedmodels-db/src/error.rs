//! Database error types

use reinhardt_typedmodels_core::TypedModelError;

/// Result alias for database operations on typed models
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Errors raised while storing or querying typed models
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
	/// Model-level failure (untyped save, invalid discriminator, ...)
	#[error(transparent)]
	Model(#[from] TypedModelError),

	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	/// A statement could not be built
	#[error("Query error: {0}")]
	Query(String),

	#[error("{model} matching query does not exist")]
	NotFound { model: String },

	#[error("get() returned more than one {model}: {count} rows")]
	MultipleResults { model: String, count: usize },

	#[error("Unsupported database backend for URL {0:?}")]
	UnsupportedBackend(String),

	#[error("No database configured")]
	NotConfigured,

	/// A stored value does not fit its field
	#[error("Cannot decode column {column:?}: {reason}")]
	Decode { column: String, reason: String },
}

impl DatabaseError {
	pub(crate) fn not_found(model: impl Into<String>) -> Self {
		Self::NotFound {
			model: model.into(),
		}
	}

	/// Whether the error is a missing row
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_model_errors_pass_through() {
		let err: DatabaseError = TypedModelError::UntypedSave {
			model: "Animal".to_string(),
		}
		.into();
		assert_eq!(err.to_string(), "Untyped Animal cannot be saved");
		assert!(!err.is_not_found());
	}

	#[rstest]
	fn test_not_found_message() {
		let err = DatabaseError::not_found("Canine");
		assert!(err.is_not_found());
		assert_eq!(err.to_string(), "Canine matching query does not exist");
	}
}
