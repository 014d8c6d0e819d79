//! # Type Registry
//!
//! Per-hierarchy mapping from discriminator to subtype, together with the
//! children registry (type → immediate subtypes, in declaration order) and the
//! subtypes-list of every branch used to scope queries.
//!
//! The registry only grows while a hierarchy is being built. Once the owning
//! [`TypedHierarchy`](crate::hierarchy::TypedHierarchy) is constructed it is
//! read-only and can be shared between threads without locking.

use crate::error::{Result, TypedModelError};
use indexmap::IndexMap;

/// Discriminator string of a subtype: `"<app_label>.<lowercased name>"`
///
/// # Examples
///
/// ```
/// use reinhardt_typedmodels_core::registry::discriminator_for;
///
/// assert_eq!(discriminator_for("app", "BigCat"), "app.bigcat");
/// ```
pub fn discriminator_for(app_label: &str, model_name: &str) -> String {
	format!("{}.{}", app_label, model_name.to_lowercase())
}

/// A registered subtype of a typed hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtype {
	name: String,
	app_label: String,
	discriminator: String,
	verbose_name: String,
	parent: Option<String>,
	declared_fields: Vec<String>,
	subtypes: Vec<String>,
}

impl Subtype {
	/// Create a subtype record; its subtypes-list starts with itself
	pub fn new(
		name: impl Into<String>,
		app_label: impl Into<String>,
		verbose_name: impl Into<String>,
		parent: Option<String>,
		declared_fields: Vec<String>,
	) -> Self {
		let name = name.into();
		let app_label = app_label.into();
		let discriminator = discriminator_for(&app_label, &name);
		Self {
			subtypes: vec![discriminator.clone()],
			name,
			app_label,
			discriminator,
			verbose_name: verbose_name.into(),
			parent,
			declared_fields,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn app_label(&self) -> &str {
		&self.app_label
	}

	pub fn discriminator(&self) -> &str {
		&self.discriminator
	}

	pub fn verbose_name(&self) -> &str {
		&self.verbose_name
	}

	/// Parent subtype name, `None` when the parent is the base type
	pub fn parent(&self) -> Option<&str> {
		self.parent.as_deref()
	}

	/// Fields migrated to the base table from this subtype's declaration
	pub fn declared_fields(&self) -> &[String] {
		&self.declared_fields
	}

	/// Own discriminator followed by every descendant's, in declaration order
	pub fn subtypes(&self) -> &[String] {
		&self.subtypes
	}
}

/// Discriminator registry of one hierarchy
#[derive(Debug, Clone)]
pub struct TypeRegistry {
	base: String,
	subtypes: IndexMap<String, Subtype>,
	by_discriminator: IndexMap<String, String>,
	children: IndexMap<String, Vec<String>>,
}

impl TypeRegistry {
	/// Create an empty registry for the base type `base`
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::registry::TypeRegistry;
	///
	/// let registry = TypeRegistry::new("Animal");
	/// assert_eq!(registry.len(), 0);
	/// assert!(registry.children_of("Animal").unwrap().is_empty());
	/// ```
	pub fn new(base: impl Into<String>) -> Self {
		let base = base.into();
		let mut children = IndexMap::new();
		children.insert(base.clone(), Vec::new());
		Self {
			base,
			subtypes: IndexMap::new(),
			by_discriminator: IndexMap::new(),
			children,
		}
	}

	pub fn base(&self) -> &str {
		&self.base
	}

	pub fn len(&self) -> usize {
		self.subtypes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.subtypes.is_empty()
	}

	/// Whether `name` is the base or a registered subtype
	pub fn contains(&self, name: &str) -> bool {
		self.children.contains_key(name)
	}

	pub fn is_base(&self, name: &str) -> bool {
		name == self.base
	}

	/// Register a subtype
	///
	/// The subtype's discriminator is appended to the subtypes-list of every
	/// ancestor subtype. The parent must already be registered.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::registry::{Subtype, TypeRegistry};
	///
	/// let mut registry = TypeRegistry::new("Animal");
	/// registry.register(Subtype::new("Canine", "app", "canine", None, vec![])).unwrap();
	/// registry
	///     .register(Subtype::new("Puppy", "app", "puppy", Some("Canine".into()), vec![]))
	///     .unwrap();
	///
	/// assert_eq!(registry.subtypes_of("Canine").unwrap(), vec!["app.canine", "app.puppy"]);
	/// assert!(registry.register(Subtype::new("Canine", "app", "canine", None, vec![])).is_err());
	/// ```
	pub fn register(&mut self, subtype: Subtype) -> Result<()> {
		if let Some(existing) = self.by_discriminator.get(subtype.discriminator()) {
			return Err(TypedModelError::RegistrationConflict {
				base: self.base.clone(),
				discriminator: subtype.discriminator().to_string(),
				model: subtype.name().to_string(),
				existing: existing.clone(),
			});
		}
		if self.contains(subtype.name()) {
			return Err(TypedModelError::misuse(format!(
				"{} already declares a model named {}",
				self.base,
				subtype.name()
			)));
		}

		let parent = subtype.parent().unwrap_or(&self.base).to_string();
		let Some(siblings) = self.children.get_mut(&parent) else {
			return Err(TypedModelError::misuse(format!(
				"parent {parent} of {} is not part of the {} hierarchy",
				subtype.name(),
				self.base
			)));
		};
		siblings.push(subtype.name().to_string());

		let discriminator = subtype.discriminator().to_string();
		let mut ancestor = subtype.parent().map(str::to_string);
		while let Some(name) = ancestor {
			let entry = self
				.subtypes
				.get_mut(&name)
				.ok_or_else(|| TypedModelError::UnknownModel(name.clone()))?;
			entry.subtypes.push(discriminator.clone());
			ancestor = entry.parent.clone();
		}

		tracing::debug!(
			base = %self.base,
			model = subtype.name(),
			discriminator = %discriminator,
			parent = %parent,
			"registered typed model"
		);

		self.children.insert(subtype.name().to_string(), Vec::new());
		self.by_discriminator
			.insert(discriminator, subtype.name().to_string());
		self.subtypes.insert(subtype.name().to_string(), subtype);
		Ok(())
	}

	/// Resolve a discriminator to its subtype
	pub fn lookup(&self, discriminator: &str) -> Result<&Subtype> {
		self.by_discriminator
			.get(discriminator)
			.and_then(|name| self.subtypes.get(name))
			.ok_or_else(|| TypedModelError::InvalidDiscriminator {
				base: self.base.clone(),
				discriminator: discriminator.to_string(),
			})
	}

	/// Subtype by model name
	pub fn get(&self, name: &str) -> Option<&Subtype> {
		self.subtypes.get(name)
	}

	/// Subtypes in declaration order
	pub fn iter(&self) -> impl Iterator<Item = &Subtype> {
		self.subtypes.values()
	}

	/// Immediate subtypes of `name`, in declaration order
	pub fn children_of(&self, name: &str) -> Result<Vec<&Subtype>> {
		let children = self
			.children
			.get(name)
			.ok_or_else(|| self.unknown(name))?;
		Ok(children
			.iter()
			.filter_map(|child| self.subtypes.get(child))
			.collect())
	}

	/// Discriminators a query on `name` may return
	///
	/// For a subtype this is its subtypes-list; for the base it is every
	/// registered discriminator.
	pub fn subtypes_of(&self, name: &str) -> Result<Vec<&str>> {
		if self.is_base(name) {
			return Ok(self.by_discriminator.keys().map(String::as_str).collect());
		}
		let subtype = self.subtypes.get(name).ok_or_else(|| self.unknown(name))?;
		Ok(subtype.subtypes.iter().map(String::as_str).collect())
	}

	/// Immediate parent of `name`: `None` for the base, the base name for
	/// direct subtypes
	pub fn parent_of(&self, name: &str) -> Result<Option<&str>> {
		if self.is_base(name) {
			return Ok(None);
		}
		let subtype = self.subtypes.get(name).ok_or_else(|| self.unknown(name))?;
		Ok(Some(subtype.parent().unwrap_or(&self.base)))
	}

	/// Ancestors of `name`, root first, excluding `name` itself
	pub fn ancestors(&self, name: &str) -> Result<Vec<&str>> {
		let mut chain = Vec::new();
		let mut current = self.parent_of(name)?;
		while let Some(parent) = current {
			chain.push(parent);
			current = self.parent_of(parent)?;
		}
		chain.reverse();
		Ok(chain)
	}

	/// `name` and its ancestor subtypes (the base excluded), nearest first
	pub fn lineage(&self, name: &str) -> Result<Vec<&Subtype>> {
		if self.is_base(name) {
			return Ok(Vec::new());
		}
		let mut lineage = Vec::new();
		let mut current = Some(name);
		while let Some(model) = current {
			let subtype = self.subtypes.get(model).ok_or_else(|| self.unknown(model))?;
			lineage.push(subtype);
			current = subtype.parent();
		}
		Ok(lineage)
	}

	/// Every subtype of the hierarchy; only valid on the base
	pub fn type_classes(&self, name: &str) -> Result<Vec<&Subtype>> {
		if !self.is_base(name) {
			return Err(TypedModelError::misuse(format!(
				"type_classes() is not accessible from subtypes of {} (was called from {})",
				self.base, name
			)));
		}
		Ok(self.subtypes.values().collect())
	}

	/// `(discriminator, verbose name)` choices of the discriminator field
	pub fn choices(&self) -> Vec<(String, String)> {
		self.subtypes
			.values()
			.map(|s| (s.discriminator.clone(), s.verbose_name.clone()))
			.collect()
	}

	fn unknown(&self, name: &str) -> TypedModelError {
		TypedModelError::UnknownModel(format!("{name} (in the {} hierarchy)", self.base))
	}
}
