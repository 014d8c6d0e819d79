//! # Scoped Queries
//!
//! A [`TypedQuery`] always reads through one type of a hierarchy. Querying a
//! subtype restricts the discriminator to the subtype's subtypes-list (`=` for
//! a single discriminator, `IN` otherwise); querying the base is unrestricted.
//! Only the columns visible on the queried type are selected.
//!
//! ```
//! use reinhardt_typedmodels_core::prelude::*;
//! use reinhardt_typedmodels_db::backend::Backend;
//! use reinhardt_typedmodels_db::query::TypedQuery;
//! use std::sync::Arc;
//!
//! let animals = Arc::new(
//!     HierarchyDecl::new("app", "Animal")
//!         .field(FieldDef::char("name", 255))
//!         .subtype(SubtypeDecl::new("Canine"))
//!         .subtype(SubtypeDecl::new("Puppy").parent("Canine"))
//!         .build(&TypedModelsSettings::default())
//!         .unwrap(),
//! );
//!
//! let sql = TypedQuery::new(animals, "Canine")
//!     .unwrap()
//!     .to_sql(Backend::Sqlite)
//!     .unwrap();
//! assert_eq!(
//!     sql,
//!     r#"SELECT "id", "type", "name" FROM "app_animal" WHERE "type" IN ('app.canine', 'app.puppy')"#
//! );
//! ```

use crate::backend::{Backend, render};
use crate::error::{DatabaseError, Result};
use crate::values::to_sql_value;
use reinhardt_typedmodels_core::{FieldDef, PRIMARY_KEY, TypedHierarchy, TypedModelError};
use sea_query::{
	Alias, DeleteStatement, Expr, ExprTrait, Func, Order, Query, SelectStatement,
	Value as SqlValue,
};
use serde_json::Value;
use std::sync::Arc;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
	Asc,
	Desc,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
	Eq { column: String, value: SqlValue },
	IsNull { column: String },
	In { column: String, values: Vec<SqlValue> },
}

impl Predicate {
	fn to_expr(&self) -> Expr {
		match self {
			Self::Eq { column, value } => Expr::col(Alias::new(column)).eq(Expr::val(value.clone())),
			Self::IsNull { column } => Expr::col(Alias::new(column)).is_null(),
			Self::In { column, values } => {
				Expr::col(Alias::new(column)).is_in(values.iter().cloned().map(Expr::val))
			}
		}
	}
}

/// Query scoped to one type of a hierarchy
#[derive(Debug, Clone)]
pub struct TypedQuery {
	hierarchy: Arc<TypedHierarchy>,
	model: String,
	predicates: Vec<Predicate>,
	order_by: Vec<(String, OrderDirection)>,
	limit: Option<u64>,
	offset: Option<u64>,
}

impl TypedQuery {
	/// Query every row visible through `model`
	pub fn new(hierarchy: Arc<TypedHierarchy>, model: &str) -> Result<Self> {
		if !hierarchy.contains(model) {
			return Err(TypedModelError::UnknownModel(format!(
				"{model} (in the {} hierarchy)",
				hierarchy.name()
			))
			.into());
		}
		Ok(Self {
			hierarchy,
			model: model.to_string(),
			predicates: Vec::new(),
			order_by: Vec::new(),
			limit: None,
			offset: None,
		})
	}

	pub fn hierarchy(&self) -> &Arc<TypedHierarchy> {
		&self.hierarchy
	}

	/// Type the query reads through
	pub fn model(&self) -> &str {
		&self.model
	}

	/// Keep rows whose `field` equals `value`; `null` matches NULL
	pub fn filter(mut self, field: &str, value: impl Into<Value>) -> Result<Self> {
		let definition = self.field(field)?;
		let column = definition.column();
		let value = value.into();
		let predicate = if value.is_null() {
			Predicate::IsNull { column }
		} else {
			Predicate::Eq {
				value: to_sql_value(definition, &value)?,
				column,
			}
		};
		self.predicates.push(predicate);
		Ok(self)
	}

	/// Keep rows whose `field` is one of `values`
	pub fn filter_in<I, V>(mut self, field: &str, values: I) -> Result<Self>
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		let definition = self.field(field)?;
		let column = definition.column();
		let values = values
			.into_iter()
			.map(|v| to_sql_value(definition, &v.into()))
			.collect::<Result<Vec<_>>>()?;
		self.predicates.push(Predicate::In { column, values });
		Ok(self)
	}

	pub fn order_by(self, field: &str) -> Result<Self> {
		self.order(field, OrderDirection::Asc)
	}

	pub fn order_by_desc(self, field: &str) -> Result<Self> {
		self.order(field, OrderDirection::Desc)
	}

	pub fn limit(mut self, limit: u64) -> Self {
		self.limit = Some(limit);
		self
	}

	pub fn offset(mut self, offset: u64) -> Self {
		self.offset = Some(offset);
		self
	}

	/// Discriminators the query is restricted to, `None` for the base
	pub fn scope(&self) -> Result<Option<Vec<&str>>> {
		Ok(self.hierarchy.scope_of(&self.model)?)
	}

	/// Fields selected by the query, in table order
	pub fn columns(&self) -> Result<Vec<&FieldDef>> {
		Ok(self.hierarchy.apparent_fields(&self.model)?)
	}

	/// Fields needed to materialize every type the query can return
	///
	/// Rows of descendants carry columns the queried type cannot see; loading
	/// them keeps recast instances complete.
	pub fn load_columns(&self) -> Result<Vec<&FieldDef>> {
		let Some(scope) = self.scope()? else {
			return self.columns();
		};
		let mut types = Vec::with_capacity(scope.len());
		for discriminator in scope {
			types.push(self.hierarchy.registry().lookup(discriminator)?.name());
		}
		let mut columns = Vec::new();
		for field in self.hierarchy.table().fields() {
			for name in &types {
				if self.hierarchy.has_field(name, &field.name)? {
					columns.push(field);
					break;
				}
			}
		}
		Ok(columns)
	}

	/// Whether an ordering was requested
	pub fn is_ordered(&self) -> bool {
		!self.order_by.is_empty()
	}

	/// SELECT statement over the visible columns
	pub fn select_statement(&self) -> Result<SelectStatement> {
		self.select_columns(&self.columns()?)
	}

	/// SELECT statement over [`TypedQuery::load_columns`]
	pub fn load_statement(&self) -> Result<SelectStatement> {
		self.select_columns(&self.load_columns()?)
	}

	fn select_columns(&self, columns: &[&FieldDef]) -> Result<SelectStatement> {
		let mut stmt = Query::select();
		stmt.columns(columns.iter().map(|f| Alias::new(f.column())))
			.from(Alias::new(self.hierarchy.table().name()));
		self.apply_conditions(&mut stmt)?;

		for (field, direction) in &self.order_by {
			let column = self.field(field)?.column();
			stmt.order_by(
				Alias::new(column),
				match direction {
					OrderDirection::Asc => Order::Asc,
					OrderDirection::Desc => Order::Desc,
				},
			);
		}
		if let Some(limit) = self.limit {
			stmt.limit(limit);
		}
		if let Some(offset) = self.offset {
			stmt.offset(offset);
		}
		Ok(stmt)
	}

	/// `COUNT` over the same rows, ignoring ordering and paging
	pub fn count_statement(&self) -> Result<SelectStatement> {
		let mut stmt = Query::select();
		stmt.expr(Func::count(Expr::col(Alias::new(PRIMARY_KEY))))
			.from(Alias::new(self.hierarchy.table().name()));
		self.apply_conditions(&mut stmt)?;
		Ok(stmt)
	}

	/// DELETE of the same rows
	pub fn delete_statement(&self) -> Result<DeleteStatement> {
		let mut stmt = Query::delete();
		stmt.from_table(Alias::new(self.hierarchy.table().name()));
		for condition in self.conditions()? {
			stmt.and_where(condition);
		}
		Ok(stmt)
	}

	/// SELECT rendered for `backend`
	pub fn to_sql(&self, backend: Backend) -> Result<String> {
		let stmt = self.select_statement()?;
		Ok(render!(backend, stmt))
	}

	fn apply_conditions(&self, stmt: &mut SelectStatement) -> Result<()> {
		for condition in self.conditions()? {
			stmt.and_where(condition);
		}
		Ok(())
	}

	// Discriminator scope first, then the user predicates.
	fn conditions(&self) -> Result<Vec<Expr>> {
		let mut conditions = Vec::with_capacity(self.predicates.len() + 1);
		if let Some(scope) = self.scope()? {
			let column = Expr::col(Alias::new(self.hierarchy.discriminator_field()));
			conditions.push(match scope.as_slice() {
				[single] => column.eq(*single),
				many => column.is_in(many.iter().map(|d| Expr::val(*d))),
			});
		}
		conditions.extend(self.predicates.iter().map(Predicate::to_expr));
		Ok(conditions)
	}

	fn order(mut self, field: &str, direction: OrderDirection) -> Result<Self> {
		self.field(field)?;
		self.order_by.push((field.to_string(), direction));
		Ok(self)
	}

	fn field(&self, name: &str) -> Result<&FieldDef> {
		self.hierarchy
			.apparent_fields(&self.model)?
			.into_iter()
			.find(|f| f.name == name)
			.ok_or_else(|| {
				DatabaseError::Query(format!("{} has no field {name:?}", self.model))
			})
	}
}
