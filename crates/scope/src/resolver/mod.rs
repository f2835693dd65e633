use std::sync::Arc;

use crate::catalog::ScopeCatalog;
use crate::error::ScopeViolation;
use crate::ids::{BrandId, StoreId};
use crate::selection::{ScopeKey, ScopeSelection, ScopeTarget};

/// Committed scope transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChange {
	pub previous: ScopeSelection,
	pub current: ScopeSelection,
}

impl ScopeChange {
	/// Returns true when the channel key changed with the selection.
	pub fn key_changed(&self) -> bool {
		self.previous.key() != self.current.key()
	}
}

/// Owner of the actor's current [`ScopeSelection`].
///
/// The resolver is the only writer of the selection. Each transition
/// resolves the target against the catalog first and commits the whole
/// selection in one assignment; a rejected transition leaves the previous
/// selection untouched. A store transition derives the parent brand from the
/// organization tree, so brand and store always change together.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
	catalog: Arc<ScopeCatalog>,
	selection: ScopeSelection,
}

impl ScopeResolver {
	/// Creates a resolver positioned at the catalog's broadest accessible scope.
	pub fn new(catalog: Arc<ScopeCatalog>) -> Self {
		let selection = catalog.default_selection().clone();
		Self { catalog, selection }
	}

	pub fn catalog(&self) -> &Arc<ScopeCatalog> {
		&self.catalog
	}

	pub fn selection(&self) -> &ScopeSelection {
		&self.selection
	}

	pub fn key(&self) -> ScopeKey {
		self.selection.key()
	}

	pub fn select_company_wide(&mut self) -> Result<Option<ScopeChange>, ScopeViolation> {
		self.apply(&ScopeTarget::CompanyWide)
	}

	pub fn select_brand(&mut self, brand: &BrandId) -> Result<Option<ScopeChange>, ScopeViolation> {
		self.apply(&ScopeTarget::Brand(brand.clone()))
	}

	pub fn select_store(&mut self, store: &StoreId) -> Result<Option<ScopeChange>, ScopeViolation> {
		self.apply(&ScopeTarget::Store(store.clone()))
	}

	/// Moves to `target`.
	///
	/// Returns `Ok(None)` when the target resolves to the current selection.
	///
	/// # Errors
	///
	/// Returns [`ScopeViolation`] when the target is outside the access set;
	/// the selection is unchanged.
	pub fn apply(&mut self, target: &ScopeTarget) -> Result<Option<ScopeChange>, ScopeViolation> {
		let Some(next) = self.catalog.resolve(target) else {
			tracing::debug!(target = %target, current = %self.selection, "scope.transition.rejected");
			return Err(ScopeViolation { target: target.clone() });
		};
		Ok(self.commit(next))
	}

	/// Swaps in a refreshed catalog.
	///
	/// The current selection survives when the new catalog still permits it;
	/// otherwise the resolver falls back to the new default.
	pub fn replace_catalog(&mut self, catalog: Arc<ScopeCatalog>) -> Option<ScopeChange> {
		let next = if catalog.permits(&self.selection) {
			self.selection.clone()
		} else {
			tracing::debug!(current = %self.selection, "scope.catalog.selection_revoked");
			catalog.default_selection().clone()
		};
		self.catalog = catalog;
		self.commit(next)
	}

	fn commit(&mut self, next: ScopeSelection) -> Option<ScopeChange> {
		if next == self.selection {
			return None;
		}
		let previous = std::mem::replace(&mut self.selection, next);
		tracing::debug!(from = %previous, to = %self.selection, "scope.transition.committed");
		Some(ScopeChange {
			previous,
			current: self.selection.clone(),
		})
	}
}

#[cfg(test)]
mod tests;
