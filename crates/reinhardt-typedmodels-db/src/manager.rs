//! # Managers
//!
//! [`TypedManager`] is the `objects` entry point of one type of a hierarchy:
//! every read goes through a [`TypedQuery`] scoped to that type, and every
//! saved instance is recast first so that untyped rows never reach storage.
//! [`PlainManager`] covers models outside any hierarchy, which typed models
//! point at through relations.

use crate::backend::render;
use crate::connection::TypedDatabase;
use crate::error::{DatabaseError, Result};
use crate::query::TypedQuery;
use crate::values::{decode_row, to_sql_value};
use indexmap::IndexMap;
use reinhardt_typedmodels_core::{
	FieldDef, Instance, ModelRef, PRIMARY_KEY, PlainSchema, TypedHierarchy, TypedModelError,
};
use sea_query::{Alias, Expr, ExprTrait, Func, Order, Query, SelectStatement};
use serde_json::Value;
use sqlx::Row;
use sqlx::any::AnyRow;
use std::sync::Arc;

/// A row of a plain model
#[derive(Debug, Clone, PartialEq)]
pub struct PlainRecord {
	pub model: ModelRef,
	pub values: IndexMap<String, Value>,
}

impl PlainRecord {
	pub fn pk(&self) -> Option<i64> {
		self.values.get(PRIMARY_KEY).and_then(Value::as_i64)
	}

	pub fn get(&self, field: &str) -> Option<&Value> {
		self.values.get(field)
	}
}

/// A row reached through a relation
#[derive(Debug, Clone)]
pub enum Record {
	/// A row of a hierarchy, materialized as its concrete type
	Typed(Instance),
	Plain(PlainRecord),
}

impl Record {
	pub fn pk(&self) -> Option<i64> {
		match self {
			Self::Typed(instance) => instance.pk(),
			Self::Plain(record) => record.pk(),
		}
	}

	pub fn get(&self, field: &str) -> Option<&Value> {
		match self {
			Self::Typed(instance) => instance.get(field),
			Self::Plain(record) => record.get(field),
		}
	}

	pub fn as_typed(&self) -> Option<&Instance> {
		match self {
			Self::Typed(instance) => Some(instance),
			Self::Plain(_) => None,
		}
	}

	pub fn into_typed(self) -> Option<Instance> {
		match self {
			Self::Typed(instance) => Some(instance),
			Self::Plain(_) => None,
		}
	}

	pub fn as_plain(&self) -> Option<&PlainRecord> {
		match self {
			Self::Typed(_) => None,
			Self::Plain(record) => Some(record),
		}
	}
}

fn decode_count(row: &AnyRow) -> Result<i64> {
	if let Ok(count) = row.try_get::<i64, _>(0) {
		return Ok(count);
	}
	row.try_get::<i32, _>(0)
		.map(i64::from)
		.map_err(|e| DatabaseError::Decode {
			column: "count".to_string(),
			reason: e.to_string(),
		})
}

/// A lazily executed [`TypedQuery`]
#[derive(Debug, Clone)]
pub struct QuerySet {
	db: TypedDatabase,
	query: TypedQuery,
}

impl QuerySet {
	pub(crate) fn new(db: TypedDatabase, query: TypedQuery) -> Self {
		Self { db, query }
	}

	pub fn query(&self) -> &TypedQuery {
		&self.query
	}

	pub fn filter(self, field: &str, value: impl Into<Value>) -> Result<Self> {
		Ok(Self {
			query: self.query.filter(field, value)?,
			db: self.db,
		})
	}

	pub fn filter_in<I, V>(self, field: &str, values: I) -> Result<Self>
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		Ok(Self {
			query: self.query.filter_in(field, values)?,
			db: self.db,
		})
	}

	pub fn order_by(self, field: &str) -> Result<Self> {
		Ok(Self {
			query: self.query.order_by(field)?,
			db: self.db,
		})
	}

	pub fn order_by_desc(self, field: &str) -> Result<Self> {
		Ok(Self {
			query: self.query.order_by_desc(field)?,
			db: self.db,
		})
	}

	pub fn limit(self, limit: u64) -> Self {
		Self {
			query: self.query.limit(limit),
			db: self.db,
		}
	}

	pub fn offset(self, offset: u64) -> Self {
		Self {
			query: self.query.offset(offset),
			db: self.db,
		}
	}

	/// Every matching row, each materialized as its concrete type
	pub async fn all(&self) -> Result<Vec<Instance>> {
		Self::load(&self.db, &self.query).await
	}

	/// First matching row, by primary key unless an ordering was given
	pub async fn first(&self) -> Result<Option<Instance>> {
		let query = if self.query.is_ordered() {
			self.query.clone()
		} else {
			self.query.clone().order_by(PRIMARY_KEY)?
		};
		let mut rows = Self::load(&self.db, &query.limit(1)).await?;
		Ok(rows.pop())
	}

	/// The single matching row
	pub async fn get(&self) -> Result<Instance> {
		let mut rows = self.all().await?;
		match rows.len() {
			0 => Err(DatabaseError::not_found(self.query.model())),
			1 => Ok(rows.remove(0)),
			count => Err(DatabaseError::MultipleResults {
				model: self.query.model().to_string(),
				count,
			}),
		}
	}

	pub async fn count(&self) -> Result<i64> {
		let stmt = self.query.count_statement()?;
		let sql = render!(self.db.backend(), stmt);
		decode_count(&self.db.fetch_one(&sql).await?)
	}

	pub async fn exists(&self) -> Result<bool> {
		Ok(self.clone().limit(1).all().await?.len() == 1)
	}

	/// Delete every matching row and return how many went
	pub async fn delete(&self) -> Result<u64> {
		let stmt = self.query.delete_statement()?;
		let sql = render!(self.db.backend(), stmt);
		let deleted = self.db.execute(&sql).await?.rows_affected();
		tracing::debug!(model = self.query.model(), deleted, "deleted typed rows");
		Ok(deleted)
	}

	async fn load(db: &TypedDatabase, query: &TypedQuery) -> Result<Vec<Instance>> {
		let columns = query.load_columns()?;
		let stmt = query.load_statement()?;
		let sql = render!(db.backend(), stmt);
		let rows = db.fetch_all(&sql).await?;
		rows.iter()
			.map(|row| -> Result<Instance> {
				let values = decode_row(row, &columns)?;
				Ok(Instance::from_row(Arc::clone(query.hierarchy()), values)?)
			})
			.collect()
	}
}

/// Manager of one type of a hierarchy
///
/// # Examples
///
/// ```rust,no_run
/// use reinhardt_typedmodels_core::prelude::*;
/// use reinhardt_typedmodels_db::TypedDatabase;
///
/// # async fn example(db: TypedDatabase) -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let canines = db.objects(&ModelRef::new("app", "Canine"))?;
/// let rex = canines.create([("name", "Rex")]).await?;
/// assert_eq!(rex.model(), "Canine");
///
/// // Base queries return every row, each as its own type.
/// let animals = db.objects(&ModelRef::new("app", "Animal"))?;
/// let loaded = animals.get(rex.pk().unwrap()).await?;
/// assert_eq!(loaded.model(), "Canine");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TypedManager {
	db: TypedDatabase,
	hierarchy: Arc<TypedHierarchy>,
	model: String,
}

impl TypedManager {
	pub(crate) fn new(db: TypedDatabase, hierarchy: Arc<TypedHierarchy>, model: &str) -> Self {
		Self {
			db,
			hierarchy,
			model: model.to_string(),
		}
	}

	pub fn model(&self) -> &str {
		&self.model
	}

	pub fn hierarchy(&self) -> &Arc<TypedHierarchy> {
		&self.hierarchy
	}

	/// Query over every row visible through this type
	pub fn query(&self) -> Result<QuerySet> {
		let query = TypedQuery::new(Arc::clone(&self.hierarchy), &self.model)?;
		Ok(QuerySet::new(self.db.clone(), query))
	}

	/// Unsaved instance of this type
	pub fn new_instance(&self) -> Result<Instance> {
		Ok(Instance::new(Arc::clone(&self.hierarchy), &self.model)?)
	}

	pub async fn all(&self) -> Result<Vec<Instance>> {
		self.query()?.all().await
	}

	pub fn filter(&self, field: &str, value: impl Into<Value>) -> Result<QuerySet> {
		self.query()?.filter(field, value)
	}

	/// Row `pk`, provided it is visible through this type
	pub async fn get(&self, pk: i64) -> Result<Instance> {
		self.filter(PRIMARY_KEY, pk)?.get().await
	}

	pub async fn first(&self) -> Result<Option<Instance>> {
		self.query()?.first().await
	}

	pub async fn count(&self) -> Result<i64> {
		self.query()?.count().await
	}

	/// Build, save and return a new instance
	pub async fn create<I, K, V>(&self, values: I) -> Result<Instance>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<Value>,
	{
		let mut instance = self.new_instance()?;
		for (field, value) in values {
			instance.set(field.as_ref(), value)?;
		}
		self.save(&mut instance).await?;
		Ok(instance)
	}

	/// Insert or update `instance`
	///
	/// The instance is recast first and must resolve to a type this manager
	/// covers. Inserts write the new primary key back. Updates store NULL in
	/// every column the instance's type cannot see, so re-typing a row drops
	/// the fields of its former type.
	pub async fn save(&self, instance: &mut Instance) -> Result<()> {
		self.check_hierarchy(instance)?;
		instance.ensure_typed()?;
		instance.validate()?;
		self.check_scope(instance)?;

		let table = self.hierarchy.table();
		match instance.pk() {
			None => {
				let pk = self.db.insert_row(table, instance.values()).await?;
				instance.set_pk(pk);
				tracing::debug!(
					model = instance.model(),
					discriminator = instance.discriminator(),
					pk,
					"inserted typed row"
				);
			}
			Some(pk) => {
				let updated = self.db.update_row(table, pk, instance.values()).await?;
				if updated == 0 {
					return Err(DatabaseError::not_found(instance.model()));
				}
				tracing::debug!(
					model = instance.model(),
					discriminator = instance.discriminator(),
					pk,
					"updated typed row"
				);
			}
		}
		Ok(())
	}

	/// Delete the row of `instance`, if visible through this type
	pub async fn delete(&self, instance: &Instance) -> Result<u64> {
		self.check_hierarchy(instance)?;
		let pk = instance.pk().ok_or_else(|| {
			TypedModelError::StructuralMisuse(format!(
				"{} object can't be deleted because its id is not set",
				instance.model()
			))
		})?;
		self.filter(PRIMARY_KEY, pk)?.delete().await
	}

	/// Follow relation `field` of `instance`
	pub async fn related(&self, instance: &Instance, field: &str) -> Result<Option<Record>> {
		self.check_hierarchy(instance)?;
		let model = self.hierarchy.model_ref(instance.model())?;
		self.db.related(&model, instance.values(), field).await
	}

	/// Rows pointing at `instance` through reverse accessor `accessor`
	///
	/// Fails when the accessor belongs to a relation restricted to other
	/// types of the hierarchy.
	pub async fn reverse(&self, instance: &Instance, accessor: &str) -> Result<Vec<Record>> {
		self.check_hierarchy(instance)?;
		let pk = instance.pk().ok_or_else(|| {
			TypedModelError::StructuralMisuse(format!(
				"unsaved {} has no related rows",
				instance.model()
			))
		})?;
		let model = self.hierarchy.model_ref(instance.model())?;
		self.db.reverse(&model, pk, accessor).await
	}

	fn check_hierarchy(&self, instance: &Instance) -> Result<()> {
		if instance.hierarchy().table().name() != self.hierarchy.table().name() {
			return Err(TypedModelError::StructuralMisuse(format!(
				"{} does not belong to the {} hierarchy",
				instance.model(),
				self.hierarchy.name()
			))
			.into());
		}
		Ok(())
	}

	fn check_scope(&self, instance: &Instance) -> Result<()> {
		let Some(scope) = self.hierarchy.scope_of(&self.model)? else {
			return Ok(());
		};
		let discriminator = instance.discriminator().unwrap_or_default();
		if !scope.contains(&discriminator) {
			return Err(TypedModelError::StructuralMisuse(format!(
				"{} cannot be saved through the {} manager",
				instance.model(),
				self.model
			))
			.into());
		}
		Ok(())
	}
}

/// Manager of a plain model
#[derive(Debug, Clone)]
pub struct PlainManager {
	db: TypedDatabase,
	model: ModelRef,
}

impl PlainManager {
	pub(crate) fn new(db: TypedDatabase, model: ModelRef) -> Self {
		Self { db, model }
	}

	pub fn model(&self) -> &ModelRef {
		&self.model
	}

	/// Insert a row and return it with its primary key
	///
	/// Omitted fields take their default, or NULL.
	pub async fn create<I, K, V>(&self, values: I) -> Result<PlainRecord>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<Value>,
	{
		let schema = self.schema()?;
		let mut given: IndexMap<String, Value> = values
			.into_iter()
			.map(|(k, v)| (k.as_ref().to_string(), v.into()))
			.collect();

		let mut row = IndexMap::new();
		for field in schema.table().fields().filter(|f| !f.is_primary_key()) {
			let value = given
				.swap_remove(&field.name)
				.or_else(|| field.default.clone())
				.unwrap_or(Value::Null);
			field.validate_value(&value)?;
			row.insert(field.name.clone(), value);
		}
		if let Some(unknown) = given.keys().next() {
			return Err(TypedModelError::InvalidValue {
				field: unknown.clone(),
				reason: format!("not a field of {}", self.model),
			}
			.into());
		}

		let pk = self.db.insert_row(schema.table(), &row).await?;
		tracing::debug!(model = %self.model, pk, "inserted plain row");

		let mut values = IndexMap::with_capacity(row.len() + 1);
		values.insert(PRIMARY_KEY.to_string(), Value::from(pk));
		values.extend(row);
		Ok(PlainRecord {
			model: self.model.clone(),
			values,
		})
	}

	pub async fn get(&self, pk: i64) -> Result<PlainRecord> {
		self.filter(PRIMARY_KEY, pk)
			.await?
			.pop()
			.ok_or_else(|| DatabaseError::not_found(self.model.to_string()))
	}

	pub async fn all(&self) -> Result<Vec<PlainRecord>> {
		let schema = self.schema()?;
		let stmt = Self::select(schema);
		self.fetch(schema, stmt).await
	}

	/// Rows whose `field` equals `value`
	pub async fn filter(&self, field: &str, value: impl Into<Value>) -> Result<Vec<PlainRecord>> {
		let schema = self.schema()?;
		let definition = Self::field(schema, field)?;
		let mut stmt = Self::select(schema);
		let value = value.into();
		let column = Expr::col(Alias::new(definition.column()));
		if value.is_null() {
			stmt.and_where(column.is_null());
		} else {
			stmt.and_where(column.eq(Expr::val(to_sql_value(definition, &value)?)));
		}
		self.fetch(schema, stmt).await
	}

	pub async fn count(&self) -> Result<i64> {
		let schema = self.schema()?;
		let mut stmt = Query::select();
		stmt.expr(Func::count(Expr::col(Alias::new(PRIMARY_KEY))))
			.from(Alias::new(schema.table().name()));
		let sql = render!(self.db.backend(), stmt);
		decode_count(&self.db.fetch_one(&sql).await?)
	}

	pub async fn delete(&self, pk: i64) -> Result<u64> {
		let schema = self.schema()?;
		let mut stmt = Query::delete();
		stmt.from_table(Alias::new(schema.table().name()))
			.and_where(Expr::col(Alias::new(PRIMARY_KEY)).eq(pk));
		let sql = render!(self.db.backend(), stmt);
		Ok(self.db.execute(&sql).await?.rows_affected())
	}

	fn schema(&self) -> Result<&PlainSchema> {
		self.db
			.registry()
			.plain(&self.model)
			.ok_or_else(|| TypedModelError::UnknownModel(self.model.to_string()).into())
	}

	fn field<'a>(schema: &'a PlainSchema, name: &str) -> Result<&'a FieldDef> {
		schema.table().field(name).ok_or_else(|| {
			DatabaseError::Query(format!("{} has no field {name:?}", schema.model()))
		})
	}

	fn select(schema: &PlainSchema) -> SelectStatement {
		let mut stmt = Query::select();
		stmt.columns(schema.table().fields().map(|f| Alias::new(f.column())))
			.from(Alias::new(schema.table().name()))
			.order_by(Alias::new(PRIMARY_KEY), Order::Asc);
		stmt
	}

	async fn fetch(&self, schema: &PlainSchema, stmt: SelectStatement) -> Result<Vec<PlainRecord>> {
		let sql = render!(self.db.backend(), stmt);
		let fields: Vec<&FieldDef> = schema.table().fields().collect();
		self.db
			.fetch_all(&sql)
			.await?
			.iter()
			.map(|row| -> Result<PlainRecord> {
				Ok(PlainRecord {
					model: self.model.clone(),
					values: decode_row(row, &fields)?,
				})
			})
			.collect()
	}
}
