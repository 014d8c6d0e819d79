//! Connection to the database backing a model registry

use crate::backend::{Backend, render};
use crate::ddl::schema_sql;
use crate::error::{DatabaseError, Result};
use crate::manager::{PlainManager, PlainRecord, Record, TypedManager};
use crate::values::{decode_integer, to_sql_value};
use indexmap::IndexMap;
use reinhardt_typedmodels_core::{
	DatabaseSettings, ModelLocation, ModelRef, ModelRegistry, PRIMARY_KEY, TableSchema,
	TypedModelError,
};
use sea_query::{Alias, Expr, ExprTrait, Query};
use serde_json::Value;
use sqlx::AnyPool;
use sqlx::any::{AnyPoolOptions, AnyQueryResult, AnyRow};
use std::sync::{Arc, Once};
use std::time::Duration;

static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
	INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
}

/// A model registry bound to a connection pool
///
/// Cloning is cheap; clones share the pool and the registry.
#[derive(Debug, Clone)]
pub struct TypedDatabase {
	pool: Arc<AnyPool>,
	backend: Backend,
	registry: Arc<ModelRegistry>,
}

impl TypedDatabase {
	/// Connect using `settings`
	///
	/// In-memory SQLite databases exist per connection, so their pool is
	/// pinned to a single connection that is never recycled.
	///
	/// # Examples
	///
	/// ```rust,no_run
	/// use reinhardt_typedmodels_core::prelude::*;
	/// use reinhardt_typedmodels_core::DatabaseSettings;
	/// use reinhardt_typedmodels_db::TypedDatabase;
	/// use std::sync::Arc;
	///
	/// # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
	/// let registry = Arc::new(ModelRegistry::builder(TypedModelsSettings::default()).build()?);
	/// let db = TypedDatabase::connect(&DatabaseSettings::new("sqlite::memory:"), registry).await?;
	/// db.create_tables().await?;
	/// # Ok(())
	/// # }
	/// ```
	pub async fn connect(settings: &DatabaseSettings, registry: Arc<ModelRegistry>) -> Result<Self> {
		let backend = Backend::from_url(&settings.url)?;
		install_drivers();

		let mut options = AnyPoolOptions::new().max_connections(settings.max_connections);
		if backend == Backend::Sqlite && settings.url.contains(":memory:") {
			tracing::debug!("pinning in-memory sqlite pool to one connection");
			options = options
				.max_connections(1)
				.idle_timeout(None::<Duration>)
				.max_lifetime(None::<Duration>);
		}
		let pool = options.connect(&settings.url).await?;

		tracing::info!(
			backend = backend.name(),
			max_connections = settings.max_connections,
			"connected typed models database"
		);
		Ok(Self::from_pool(Arc::new(pool), backend, registry))
	}

	/// Connect with the database settings carried by `registry`
	pub async fn from_registry(registry: Arc<ModelRegistry>) -> Result<Self> {
		let settings = registry
			.settings()
			.database
			.clone()
			.ok_or(DatabaseError::NotConfigured)?;
		Self::connect(&settings, registry).await
	}

	/// Wrap an existing pool
	pub fn from_pool(pool: Arc<AnyPool>, backend: Backend, registry: Arc<ModelRegistry>) -> Self {
		Self {
			pool,
			backend,
			registry,
		}
	}

	pub fn pool(&self) -> &Arc<AnyPool> {
		&self.pool
	}

	pub fn backend(&self) -> Backend {
		self.backend
	}

	pub fn registry(&self) -> &Arc<ModelRegistry> {
		&self.registry
	}

	/// Create every table and index of the registry
	pub async fn create_tables(&self) -> Result<()> {
		let statements = schema_sql(&self.registry, self.backend)?;
		for sql in &statements {
			self.execute(sql).await?;
		}
		tracing::info!(
			statements = statements.len(),
			backend = self.backend.name(),
			"created typed model tables"
		);
		Ok(())
	}

	/// Manager reading and writing through a typed model
	pub fn objects(&self, model: &ModelRef) -> Result<TypedManager> {
		let (hierarchy, name) = self.registry.hierarchy_of(model)?;
		Ok(TypedManager::new(self.clone(), Arc::clone(hierarchy), name))
	}

	/// Manager for a plain model
	pub fn plain(&self, model: &ModelRef) -> Result<PlainManager> {
		let schema = self
			.registry
			.plain(model)
			.ok_or_else(|| TypedModelError::UnknownModel(model.to_string()))?;
		Ok(PlainManager::new(self.clone(), schema.model().clone()))
	}

	/// Follow relation `field` of a row of `owner`
	///
	/// Returns `None` when the relation is empty.
	pub async fn related(
		&self,
		owner: &ModelRef,
		values: &IndexMap<String, Value>,
		field: &str,
	) -> Result<Option<Record>> {
		let relation = self.registry.forward_relation(owner, field)?;
		let Some(pk) = values.get(field).and_then(Value::as_i64) else {
			return Ok(None);
		};
		let target = relation.target.clone();
		tracing::trace!(owner = %owner, field, target = %target, pk, "following relation");
		self.fetch_record(&target, pk).await.map(Some)
	}

	/// Rows pointing at row `pk` of `target` through reverse accessor `accessor`
	pub async fn reverse(&self, target: &ModelRef, pk: i64, accessor: &str) -> Result<Vec<Record>> {
		let relation = self.registry.reverse_relation(target, accessor)?.clone();

		if let Some(allowed) = &relation.limit_choices_to
			&& let ModelLocation::Typed { hierarchy, model } = self.registry.locate(target)?
		{
			let own = hierarchy.subtype(model).map(|s| s.discriminator());
			if !own.is_some_and(|d| allowed.iter().any(|a| a == d)) {
				return Err(TypedModelError::StructuralMisuse(format!(
					"{target} has no reverse accessor {accessor:?}; it belongs to {}",
					relation.target
				))
				.into());
			}
		}

		match self.registry.locate(&relation.owner)? {
			ModelLocation::Typed { hierarchy, model } => {
				let instances = TypedManager::new(self.clone(), Arc::clone(hierarchy), model)
					.filter(&relation.field, pk)?
					.all()
					.await?;
				Ok(instances.into_iter().map(Record::Typed).collect())
			}
			ModelLocation::Plain(plain) => {
				let rows = PlainManager::new(self.clone(), plain.model().clone())
					.filter(&relation.field, pk)
					.await?;
				Ok(rows.into_iter().map(Record::Plain).collect())
			}
		}
	}

	async fn fetch_record(&self, model: &ModelRef, pk: i64) -> Result<Record> {
		match self.registry.locate(model)? {
			ModelLocation::Typed { hierarchy, model } => {
				let instance = TypedManager::new(self.clone(), Arc::clone(hierarchy), model)
					.get(pk)
					.await?;
				Ok(Record::Typed(instance))
			}
			ModelLocation::Plain(plain) => {
				let row: PlainRecord = PlainManager::new(self.clone(), plain.model().clone())
					.get(pk)
					.await?;
				Ok(Record::Plain(row))
			}
		}
	}

	/// Insert `values` into `table` and return the new primary key
	///
	/// Fields missing from `values` are stored as NULL.
	pub(crate) async fn insert_row(
		&self,
		table: &TableSchema,
		values: &IndexMap<String, Value>,
	) -> Result<i64> {
		let mut columns = Vec::new();
		let mut exprs = Vec::new();
		for field in table.fields().filter(|f| !f.is_primary_key()) {
			let value = values.get(&field.name).unwrap_or(&Value::Null);
			columns.push(Alias::new(field.column()));
			exprs.push(Expr::val(to_sql_value(field, value)?));
		}

		let mut stmt = Query::insert();
		stmt.into_table(Alias::new(table.name()));
		if columns.is_empty() {
			stmt.or_default_values();
		} else {
			stmt.columns(columns);
			stmt.values(exprs)
				.map_err(|e| DatabaseError::Query(e.to_string()))?;
		}

		if self.backend.supports_returning() {
			stmt.returning_col(Alias::new(PRIMARY_KEY));
			let sql = render!(self.backend, stmt);
			let row = self.fetch_one(&sql).await?;
			return decode_integer(&row, PRIMARY_KEY)?.ok_or_else(|| DatabaseError::Decode {
				column: PRIMARY_KEY.to_string(),
				reason: "insert returned no primary key".to_string(),
			});
		}

		let sql = render!(self.backend, stmt);
		let result = self.execute(&sql).await?;
		result.last_insert_id().ok_or_else(|| DatabaseError::Decode {
			column: PRIMARY_KEY.to_string(),
			reason: "driver reported no last insert id".to_string(),
		})
	}

	/// Overwrite every column of row `pk` in `table`
	pub(crate) async fn update_row(
		&self,
		table: &TableSchema,
		pk: i64,
		values: &IndexMap<String, Value>,
	) -> Result<u64> {
		let mut stmt = Query::update();
		stmt.table(Alias::new(table.name()));
		for field in table.fields().filter(|f| !f.is_primary_key()) {
			let value = values.get(&field.name).unwrap_or(&Value::Null);
			stmt.value(Alias::new(field.column()), Expr::val(to_sql_value(field, value)?));
		}
		stmt.and_where(Expr::col(Alias::new(PRIMARY_KEY)).eq(pk));

		let sql = render!(self.backend, stmt);
		Ok(self.execute(&sql).await?.rows_affected())
	}

	pub(crate) async fn execute(&self, sql: &str) -> Result<AnyQueryResult> {
		tracing::trace!(sql, "executing statement");
		Ok(sqlx::query(sql).execute(&*self.pool).await?)
	}

	pub(crate) async fn fetch_all(&self, sql: &str) -> Result<Vec<AnyRow>> {
		tracing::trace!(sql, "fetching rows");
		Ok(sqlx::query(sql).fetch_all(&*self.pool).await?)
	}

	pub(crate) async fn fetch_one(&self, sql: &str) -> Result<AnyRow> {
		tracing::trace!(sql, "fetching row");
		Ok(sqlx::query(sql).fetch_one(&*self.pool).await?)
	}
}
