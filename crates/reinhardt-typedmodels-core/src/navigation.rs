//! # Hierarchy Navigation
//!
//! Read-only queries used by administrative views and templates: walking a
//! hierarchy up and down, naming admin routes, and redirecting an edit of a
//! generic type to the change view of the record's concrete type.

use crate::error::Result;
use crate::hierarchy::TypedHierarchy;
use crate::registry::Subtype;

impl TypedHierarchy {
	/// Immediate parent of `name`; `None` for the base
	pub fn parent_of(&self, name: &str) -> Result<Option<&str>> {
		self.registry().parent_of(name)
	}

	/// Immediate subtypes of `name`, in declaration order
	pub fn children_of(&self, name: &str) -> Result<Vec<&Subtype>> {
		self.registry().children_of(name)
	}

	pub fn has_children(&self, name: &str) -> Result<bool> {
		Ok(!self.children_of(name)?.is_empty())
	}

	/// Ancestors of `name`, root first, for breadcrumbs
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::hierarchy::{HierarchyDecl, SubtypeDecl};
	/// use reinhardt_typedmodels_core::settings::TypedModelsSettings;
	///
	/// let animals = HierarchyDecl::new("app", "Animal")
	///     .subtype(SubtypeDecl::new("Canine"))
	///     .subtype(SubtypeDecl::new("Puppy").parent("Canine"))
	///     .build(&TypedModelsSettings::default())
	///     .unwrap();
	///
	/// assert_eq!(animals.ancestors("Puppy").unwrap(), ["Animal", "Canine"]);
	/// ```
	pub fn ancestors(&self, name: &str) -> Result<Vec<&str>> {
		self.registry().ancestors(name)
	}

	/// Admin route name of `name` for `action`: `admin:<app>_<model>_<action>`
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_typedmodels_core::hierarchy::{HierarchyDecl, SubtypeDecl};
	/// use reinhardt_typedmodels_core::settings::TypedModelsSettings;
	///
	/// let animals = HierarchyDecl::new("app", "Animal")
	///     .subtype(SubtypeDecl::new("BigCat"))
	///     .build(&TypedModelsSettings::default())
	///     .unwrap();
	///
	/// assert_eq!(animals.admin_urlname("BigCat", "change").unwrap(), "admin:app_bigcat_change");
	/// assert_eq!(animals.admin_urlname("Animal", "changelist").unwrap(), "admin:app_animal_changelist");
	/// ```
	pub fn admin_urlname(&self, name: &str, action: &str) -> Result<String> {
		let model = self.model_ref(name)?;
		Ok(format!(
			"admin:{}_{}_{}",
			model.app_label,
			model.name.to_lowercase(),
			action
		))
	}

	/// Change view a record edited through `name` should be redirected to
	///
	/// Returns the change route of the record's concrete type when `name`
	/// has subtypes and `discriminator` names one of them, `None` when the
	/// record can be edited in place.
	pub fn change_redirect(&self, name: &str, discriminator: &str) -> Result<Option<String>> {
		if !self.has_children(name)? {
			return Ok(None);
		}
		let concrete = self.registry().lookup(discriminator)?;
		if concrete.name() == name {
			return Ok(None);
		}
		let route = self.admin_urlname(concrete.name(), "change")?;
		tracing::debug!(
			from = name,
			to = concrete.name(),
			route = %route,
			"redirecting change view to concrete type"
		);
		Ok(Some(route))
	}
}
