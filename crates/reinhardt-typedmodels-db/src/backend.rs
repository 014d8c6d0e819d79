//! SQL dialect selection
//!
//! Statements are built once with `sea-query` and rendered for the dialect of
//! the connected database. Identifiers are always quoted, so a discriminator
//! column called `type` is safe on every backend.

use crate::error::{DatabaseError, Result};

/// Database flavour behind an `AnyPool`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
	Postgres,
	Sqlite,
	Mysql,
}

impl Backend {
	/// Detect the backend from a connection URL
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_db::backend::Backend;
	///
	/// assert_eq!(Backend::from_url("sqlite::memory:").unwrap(), Backend::Sqlite);
	/// assert_eq!(Backend::from_url("postgresql://localhost/zoo").unwrap(), Backend::Postgres);
	/// assert_eq!(Backend::from_url("mysql://localhost/zoo").unwrap(), Backend::Mysql);
	/// assert!(Backend::from_url("oracle://localhost").is_err());
	/// ```
	pub fn from_url(url: &str) -> Result<Self> {
		let scheme = url.split(':').next().unwrap_or_default();
		match scheme {
			"postgres" | "postgresql" => Ok(Self::Postgres),
			"sqlite" => Ok(Self::Sqlite),
			"mysql" | "mariadb" => Ok(Self::Mysql),
			_ => Err(DatabaseError::UnsupportedBackend(url.to_string())),
		}
	}

	/// Whether `INSERT ... RETURNING` can hand back the new primary key
	pub fn supports_returning(&self) -> bool {
		matches!(self, Self::Postgres | Self::Sqlite)
	}

	pub fn name(&self) -> &'static str {
		match self {
			Self::Postgres => "postgres",
			Self::Sqlite => "sqlite",
			Self::Mysql => "mysql",
		}
	}
}

/// Render a `sea-query` statement for `backend`
macro_rules! render {
	($backend:expr, $stmt:expr) => {
		match $backend {
			$crate::backend::Backend::Postgres => $stmt.to_string(::sea_query::PostgresQueryBuilder),
			$crate::backend::Backend::Sqlite => $stmt.to_string(::sea_query::SqliteQueryBuilder),
			$crate::backend::Backend::Mysql => $stmt.to_string(::sea_query::MysqlQueryBuilder),
		}
	};
}

pub(crate) use render;
