//! Settings for typed model hierarchies
//!
//! Settings are layered the same way as the rest of Reinhardt's configuration:
//! defaults, then a TOML file, then `TYPEDMODELS_*` environment variables.
//!
//! ```toml
//! discriminator_field = "type"
//! discriminator_max_length = 255
//! auto_recast = true
//! field_collision = "reject"
//!
//! [database]
//! url = "sqlite::memory:"
//! max_connections = 1
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "TYPEDMODELS_";

/// Error type for settings loading and validation
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("Invalid value {value:?} for environment variable {key}: {reason}")]
	InvalidEnv {
		key: String,
		value: String,
		reason: String,
	},

	#[error("Invalid settings: {0}")]
	Invalid(String),
}

/// How the field migrator treats two subtypes declaring the same field name
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCollisionPolicy {
	/// Fail the hierarchy build with `FieldCollision`
	#[default]
	Reject,
	/// Keep the later column definition, remember every declaring subtype
	LastWriterWins,
}

impl std::str::FromStr for FieldCollisionPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"reject" => Ok(Self::Reject),
			"last_writer_wins" | "last-writer-wins" => Ok(Self::LastWriterWins),
			other => Err(format!(
				"expected \"reject\" or \"last_writer_wins\", got {other:?}"
			)),
		}
	}
}

/// Database connection settings consumed by the persistence layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
	/// Connection URL (`postgres://`, `mysql://`, `sqlite:`)
	pub url: String,

	/// Maximum pool size
	#[serde(default = "default_max_connections")]
	pub max_connections: u32,
}

fn default_max_connections() -> u32 {
	5
}

impl DatabaseSettings {
	/// Create database settings with the default pool size
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::settings::DatabaseSettings;
	///
	/// let db = DatabaseSettings::new("sqlite::memory:");
	/// assert_eq!(db.url, "sqlite::memory:");
	/// assert_eq!(db.max_connections, 5);
	/// ```
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			max_connections: default_max_connections(),
		}
	}

	/// Set the maximum pool size
	pub fn with_max_connections(mut self, max_connections: u32) -> Self {
		self.max_connections = max_connections;
		self
	}
}

/// Settings shared by every hierarchy built from one registry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypedModelsSettings {
	/// Column holding the discriminator
	pub discriminator_field: String,

	/// `max_length` of the discriminator column
	pub discriminator_max_length: u32,

	/// Recast instances automatically after construction
	///
	/// Only affects instances built with `Instance::new`. Rows loaded from
	/// storage are always materialized as their stored type.
	pub auto_recast: bool,

	/// Policy for field names declared by more than one subtype
	pub field_collision: FieldCollisionPolicy,

	/// Optional database connection
	pub database: Option<DatabaseSettings>,
}

impl Default for TypedModelsSettings {
	fn default() -> Self {
		Self {
			discriminator_field: "type".to_string(),
			discriminator_max_length: 255,
			auto_recast: true,
			field_collision: FieldCollisionPolicy::Reject,
			database: None,
		}
	}
}

impl TypedModelsSettings {
	/// Parse settings from a TOML document, filling in defaults
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::settings::{FieldCollisionPolicy, TypedModelsSettings};
	///
	/// let settings = TypedModelsSettings::from_toml_str(r#"
	///     discriminator_field = "kind"
	///     field_collision = "last_writer_wins"
	/// "#).unwrap();
	/// assert_eq!(settings.discriminator_field, "kind");
	/// assert_eq!(settings.field_collision, FieldCollisionPolicy::LastWriterWins);
	/// assert!(settings.auto_recast);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
		let settings: Self = toml::from_str(source)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Read settings from a TOML file
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path)?;
		tracing::debug!(path = %path.display(), "loading typed models settings");
		Self::from_toml_str(&source)
	}

	/// Defaults overridden by the process environment
	pub fn from_env() -> Result<Self, SettingsError> {
		let mut settings = Self::default();
		settings.apply_env()?;
		Ok(settings)
	}

	/// Override fields from `TYPEDMODELS_*` environment variables
	pub fn apply_env(&mut self) -> Result<(), SettingsError> {
		self.apply_env_from(|key| std::env::var(key).ok())
	}

	/// Override fields from an arbitrary variable lookup
	///
	/// Recognised keys (after the `TYPEDMODELS_` prefix): `DISCRIMINATOR_FIELD`,
	/// `DISCRIMINATOR_MAX_LENGTH`, `AUTO_RECAST`, `FIELD_COLLISION`,
	/// `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`.
	pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| {
			let key = format!("{ENV_PREFIX}{name}");
			lookup(&key).map(|value| (key, value))
		};

		if let Some((_, value)) = var("DISCRIMINATOR_FIELD") {
			self.discriminator_field = value;
		}
		if let Some((key, value)) = var("DISCRIMINATOR_MAX_LENGTH") {
			self.discriminator_max_length = parse_env(&key, &value)?;
		}
		if let Some((key, value)) = var("AUTO_RECAST") {
			self.auto_recast = parse_bool(&key, &value)?;
		}
		if let Some((key, value)) = var("FIELD_COLLISION") {
			self.field_collision = value
				.parse()
				.map_err(|reason| SettingsError::InvalidEnv {
					key,
					value: value.clone(),
					reason,
				})?;
		}
		if let Some((_, url)) = var("DATABASE_URL") {
			let max_connections = self
				.database
				.as_ref()
				.map_or_else(default_max_connections, |db| db.max_connections);
			self.database = Some(DatabaseSettings {
				url,
				max_connections,
			});
		}
		if let Some((key, value)) = var("DATABASE_MAX_CONNECTIONS") {
			let max_connections = parse_env(&key, &value)?;
			match self.database.as_mut() {
				Some(db) => db.max_connections = max_connections,
				None => {
					return Err(SettingsError::InvalidEnv {
						key,
						value,
						reason: "no database url configured".to_string(),
					});
				}
			}
		}

		self.validate()
	}

	/// Check the settings are usable
	pub fn validate(&self) -> Result<(), SettingsError> {
		let field = self.discriminator_field.as_str();
		if field.is_empty()
			|| !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
			|| field.starts_with(|c: char| c.is_ascii_digit())
		{
			return Err(SettingsError::Invalid(format!(
				"discriminator_field {field:?} is not a valid column name"
			)));
		}
		if field == crate::fields::PRIMARY_KEY {
			return Err(SettingsError::Invalid(
				"discriminator_field cannot be the primary key column".to_string(),
			));
		}
		if self.discriminator_max_length == 0 {
			return Err(SettingsError::Invalid(
				"discriminator_max_length must be positive".to_string(),
			));
		}
		if let Some(db) = &self.database {
			if db.url.trim().is_empty() {
				return Err(SettingsError::Invalid("database url is empty".to_string()));
			}
			if db.max_connections == 0 {
				return Err(SettingsError::Invalid(
					"database max_connections must be positive".to_string(),
				));
			}
		}
		Ok(())
	}
}

fn parse_env<T>(key: &str, value: &str) -> Result<T, SettingsError>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	value
		.trim()
		.parse()
		.map_err(|e: T::Err| SettingsError::InvalidEnv {
			key: key.to_string(),
			value: value.to_string(),
			reason: e.to_string(),
		})
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(SettingsError::InvalidEnv {
			key: key.to_string(),
			value: value.to_string(),
			reason: "expected a boolean".to_string(),
		}),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serial_test::serial;
	use std::collections::HashMap;
	use std::io::Write;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |key| vars.get(key).cloned()
	}

	#[rstest]
	fn test_defaults() {
		let settings = TypedModelsSettings::default();
		assert_eq!(settings.discriminator_field, "type");
		assert_eq!(settings.discriminator_max_length, 255);
		assert!(settings.auto_recast);
		assert_eq!(settings.field_collision, FieldCollisionPolicy::Reject);
		assert!(settings.database.is_none());
		assert!(settings.validate().is_ok());
	}

	#[rstest]
	fn test_from_toml_with_database() {
		let settings = TypedModelsSettings::from_toml_str(
			r#"
			auto_recast = false

			[database]
			url = "sqlite::memory:"
			"#,
		)
		.unwrap();
		assert!(!settings.auto_recast);
		let db = settings.database.unwrap();
		assert_eq!(db.url, "sqlite::memory:");
		assert_eq!(db.max_connections, 5);
	}

	#[rstest]
	#[case("")]
	#[case("type-name")]
	#[case("1type")]
	#[case("id")]
	fn test_invalid_discriminator_field(#[case] field: &str) {
		let settings = TypedModelsSettings {
			discriminator_field: field.to_string(),
			..Default::default()
		};
		assert!(matches!(
			settings.validate(),
			Err(SettingsError::Invalid(_))
		));
	}

	#[rstest]
	fn test_apply_env_overrides() {
		let mut settings = TypedModelsSettings::default();
		settings
			.apply_env_from(lookup(&[
				("TYPEDMODELS_DISCRIMINATOR_FIELD", "kind"),
				("TYPEDMODELS_AUTO_RECAST", "off"),
				("TYPEDMODELS_FIELD_COLLISION", "last-writer-wins"),
				("TYPEDMODELS_DATABASE_URL", "sqlite::memory:"),
				("TYPEDMODELS_DATABASE_MAX_CONNECTIONS", "1"),
			]))
			.unwrap();
		assert_eq!(settings.discriminator_field, "kind");
		assert!(!settings.auto_recast);
		assert_eq!(settings.field_collision, FieldCollisionPolicy::LastWriterWins);
		assert_eq!(
			settings.database,
			Some(DatabaseSettings::new("sqlite::memory:").with_max_connections(1))
		);
	}

	#[rstest]
	fn test_apply_env_rejects_bad_number() {
		let mut settings = TypedModelsSettings::default();
		let err = settings
			.apply_env_from(lookup(&[("TYPEDMODELS_DISCRIMINATOR_MAX_LENGTH", "lots")]))
			.unwrap_err();
		assert!(matches!(err, SettingsError::InvalidEnv { .. }));
	}

	#[rstest]
	fn test_max_connections_without_url_is_rejected() {
		let mut settings = TypedModelsSettings::default();
		let err = settings
			.apply_env_from(lookup(&[("TYPEDMODELS_DATABASE_MAX_CONNECTIONS", "3")]))
			.unwrap_err();
		assert!(matches!(err, SettingsError::InvalidEnv { .. }));
	}

	#[rstest]
	fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "discriminator_max_length = 64").unwrap();
		let settings = TypedModelsSettings::from_file(file.path()).unwrap();
		assert_eq!(settings.discriminator_max_length, 64);
	}

	#[rstest]
	#[serial(typedmodels_env)]
	fn test_from_process_env() {
		// SAFETY: serialized with every other test touching the environment
		unsafe { std::env::set_var("TYPEDMODELS_DISCRIMINATOR_MAX_LENGTH", "128") };
		let settings = TypedModelsSettings::from_env();
		unsafe { std::env::remove_var("TYPEDMODELS_DISCRIMINATOR_MAX_LENGTH") };
		assert_eq!(settings.unwrap().discriminator_max_length, 128);
	}
}
