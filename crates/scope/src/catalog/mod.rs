use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::ids::{BrandId, CompanyId, StoreId};
use crate::org::{Brand, OrgTree, Store};
use crate::role::Role;
use crate::selection::{ScopeSelection, ScopeTarget};

/// Authorization payload for one actor, supplied by the identity provider.
///
/// `None` for `brand_ids` or `store_ids` means the actor is unrestricted at
/// that level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
	pub role: Role,
	pub company_id: CompanyId,
	#[serde(default)]
	pub brand_ids: Option<BTreeSet<BrandId>>,
	#[serde(default)]
	pub store_ids: Option<BTreeSet<StoreId>>,
}

impl AccessGrant {
	/// Grant without any brand or store restriction.
	pub fn unrestricted(role: Role, company_id: impl Into<CompanyId>) -> Self {
		Self {
			role,
			company_id: company_id.into(),
			brand_ids: None,
			store_ids: None,
		}
	}

	/// Grant limited to the given brands and stores.
	pub fn restricted(
		role: Role,
		company_id: impl Into<CompanyId>,
		brand_ids: impl IntoIterator<Item = BrandId>,
		store_ids: impl IntoIterator<Item = StoreId>,
	) -> Self {
		Self {
			role,
			company_id: company_id.into(),
			brand_ids: Some(brand_ids.into_iter().collect()),
			store_ids: Some(store_ids.into_iter().collect()),
		}
	}
}

/// Nodes one actor may view, partitioned by level.
///
/// Every store belongs to a brand in the set and every brand to the
/// company; inactive nodes are never included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessSet {
	company_ids: BTreeSet<CompanyId>,
	brand_ids: BTreeSet<BrandId>,
	store_ids: BTreeSet<StoreId>,
}

impl AccessSet {
	/// Computes the access set of `grant` over `tree`.
	///
	/// Granted ids that are unknown, inactive, or whose parent is not
	/// accessible are dropped.
	///
	/// # Errors
	///
	/// Fails when the grant names another company or leaves nothing visible.
	pub fn compute(tree: &OrgTree, grant: &AccessGrant) -> Result<Self, CatalogError> {
		let company = tree.company();
		if grant.company_id != company.id {
			return Err(CatalogError::ForeignCompany {
				granted: grant.company_id.clone(),
				actual: company.id.clone(),
			});
		}
		if !company.active {
			return Err(CatalogError::NoAccessibleScope);
		}

		let brand_ids: BTreeSet<BrandId> = match &grant.brand_ids {
			None => tree.brands().filter(|b| b.active).map(|b| b.id.clone()).collect(),
			Some(granted) => granted
				.iter()
				.filter(|id| match tree.brand(id) {
					Some(brand) => brand.active,
					None => {
						tracing::warn!(brand = %id, "scope.access.unknown_brand");
						false
					}
				})
				.cloned()
				.collect(),
		};

		let store_ids: BTreeSet<StoreId> = match &grant.store_ids {
			None => brand_ids
				.iter()
				.flat_map(|brand| tree.stores_of(brand))
				.filter(|s| s.active)
				.map(|s| s.id.clone())
				.collect(),
			Some(granted) => granted
				.iter()
				.filter(|id| match tree.store(id) {
					Some(store) if !brand_ids.contains(&store.brand_id) => {
						tracing::warn!(store = %id, brand = %store.brand_id, "scope.access.orphaned_store");
						false
					}
					Some(store) => store.active,
					None => {
						tracing::warn!(store = %id, "scope.access.unknown_store");
						false
					}
				})
				.cloned()
				.collect(),
		};

		if brand_ids.is_empty() {
			return Err(CatalogError::NoAccessibleScope);
		}

		// Company-wide follows the brand restriction alone; store limits only
		// narrow store-level selection.
		let mut company_ids = BTreeSet::new();
		if grant.brand_ids.is_none() {
			company_ids.insert(company.id.clone());
		}

		Ok(Self {
			company_ids,
			brand_ids,
			store_ids,
		})
	}

	pub fn company_ids(&self) -> &BTreeSet<CompanyId> {
		&self.company_ids
	}

	pub fn brand_ids(&self) -> &BTreeSet<BrandId> {
		&self.brand_ids
	}

	pub fn store_ids(&self) -> &BTreeSet<StoreId> {
		&self.store_ids
	}

	pub fn contains_company(&self, id: &CompanyId) -> bool {
		self.company_ids.contains(id)
	}

	pub fn contains_brand(&self, id: &BrandId) -> bool {
		self.brand_ids.contains(id)
	}

	pub fn contains_store(&self, id: &StoreId) -> bool {
		self.store_ids.contains(id)
	}
}

/// Read-only snapshot of the organization and of one actor's access.
///
/// Replaced wholesale on refresh; never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeCatalog {
	tree: OrgTree,
	access: AccessSet,
	role: Role,
	default_selection: ScopeSelection,
}

impl ScopeCatalog {
	/// Builds the catalog for `grant`.
	///
	/// # Errors
	///
	/// Propagates [`AccessSet::compute`] failures.
	pub fn new(tree: OrgTree, grant: &AccessGrant) -> Result<Self, CatalogError> {
		let access = AccessSet::compute(&tree, grant)?;
		let company_id = &tree.company().id;
		let default_selection = if access.contains_company(company_id) {
			ScopeSelection::Company {
				company_id: company_id.clone(),
			}
		} else {
			let brand_id = access.brand_ids.first().cloned().ok_or(CatalogError::NoAccessibleScope)?;
			ScopeSelection::Brand { brand_id }
		};
		tracing::debug!(
			role = %grant.role,
			company_wide = !access.company_ids.is_empty(),
			brands = access.brand_ids.len(),
			stores = access.store_ids.len(),
			default = %default_selection,
			"scope.catalog.built"
		);
		Ok(Self {
			tree,
			access,
			role: grant.role,
			default_selection,
		})
	}

	pub fn tree(&self) -> &OrgTree {
		&self.tree
	}

	pub fn access(&self) -> &AccessSet {
		&self.access
	}

	pub fn role(&self) -> Role {
		self.role
	}

	/// Accessible brands, ordered by id.
	pub fn accessible_brands(&self) -> impl Iterator<Item = &Brand> {
		self.access.brand_ids.iter().filter_map(|id| self.tree.brand(id))
	}

	/// Accessible stores of `brand`, ordered by id.
	pub fn accessible_stores<'a>(&'a self, brand: &BrandId) -> impl Iterator<Item = &'a Store> + 'a {
		self.tree.stores_of(brand).filter(|s| self.access.contains_store(&s.id))
	}

	/// Broadest selection the actor may hold.
	///
	/// Company-wide when the actor is unrestricted, otherwise the first
	/// accessible brand by id.
	pub fn default_selection(&self) -> &ScopeSelection {
		&self.default_selection
	}

	/// Resolves `target` to a selection, or `None` if it is not accessible.
	///
	/// Store targets resolve their parent brand from the tree, never from the
	/// caller.
	pub fn resolve(&self, target: &ScopeTarget) -> Option<ScopeSelection> {
		match target {
			ScopeTarget::CompanyWide => {
				let company_id = &self.tree.company().id;
				self.access.contains_company(company_id).then(|| ScopeSelection::Company {
					company_id: company_id.clone(),
				})
			}
			ScopeTarget::Brand(brand_id) => self.access.contains_brand(brand_id).then(|| ScopeSelection::Brand { brand_id: brand_id.clone() }),
			ScopeTarget::Store(store_id) => {
				if !self.access.contains_store(store_id) {
					return None;
				}
				let brand_id = self.tree.parent_brand(store_id)?;
				Some(ScopeSelection::Store {
					brand_id: brand_id.clone(),
					store_id: store_id.clone(),
				})
			}
		}
	}

	/// Returns true when `selection` is consistent with the tree and inside the access set.
	pub fn permits(&self, selection: &ScopeSelection) -> bool {
		match selection {
			ScopeSelection::Company { company_id } => self.access.contains_company(company_id),
			ScopeSelection::Brand { brand_id } => self.access.contains_brand(brand_id),
			ScopeSelection::Store { brand_id, store_id } => {
				self.access.contains_brand(brand_id) && self.access.contains_store(store_id) && self.tree.parent_brand(store_id) == Some(brand_id)
			}
		}
	}
}
