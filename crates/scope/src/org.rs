use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::ids::{BrandId, CompanyId, StoreId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
	pub id: CompanyId,
	pub name: String,
	#[serde(default = "default_active")]
	pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
	pub id: BrandId,
	pub company_id: CompanyId,
	pub name: String,
	#[serde(default = "default_active")]
	pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
	pub id: StoreId,
	pub brand_id: BrandId,
	pub name: String,
	#[serde(default = "default_active")]
	pub active: bool,
}

fn default_active() -> bool {
	true
}

/// One node of the organization tree, as delivered by the access-control backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum OrgNode {
	Company(Company),
	Brand(Brand),
	Store(Store),
}

/// Validated organization tree with a single company root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgTree {
	company: Company,
	brands: BTreeMap<BrandId, Brand>,
	stores: BTreeMap<StoreId, Store>,
	stores_by_brand: BTreeMap<BrandId, BTreeSet<StoreId>>,
}

impl OrgTree {
	/// Builds a tree from a flat node list.
	///
	/// # Errors
	///
	/// Fails when there is not exactly one company, when ids repeat across
	/// nodes, or when a brand or store references a parent that is absent.
	pub fn from_nodes(nodes: impl IntoIterator<Item = OrgNode>) -> Result<Self, CatalogError> {
		let mut company: Option<Company> = None;
		let mut brands = Vec::new();
		let mut stores = Vec::new();
		for node in nodes {
			match node {
				OrgNode::Company(c) => {
					if let Some(first) = &company {
						return Err(CatalogError::MultipleCompanies {
							first: first.id.clone(),
							second: c.id,
						});
					}
					company = Some(c);
				}
				OrgNode::Brand(b) => brands.push(b),
				OrgNode::Store(s) => stores.push(s),
			}
		}
		let company = company.ok_or(CatalogError::MissingCompany)?;

		let mut seen: HashSet<String> = HashSet::new();
		seen.insert(company.id.to_string());

		let mut brand_map = BTreeMap::new();
		for brand in brands {
			if brand.company_id != company.id {
				return Err(CatalogError::UnknownCompany {
					brand: brand.id,
					company: brand.company_id,
				});
			}
			if !seen.insert(brand.id.to_string()) {
				return Err(CatalogError::DuplicateId(brand.id.to_string()));
			}
			brand_map.insert(brand.id.clone(), brand);
		}

		let mut store_map = BTreeMap::new();
		let mut stores_by_brand: BTreeMap<BrandId, BTreeSet<StoreId>> = BTreeMap::new();
		for store in stores {
			if !brand_map.contains_key(&store.brand_id) {
				return Err(CatalogError::UnknownBrand {
					store: store.id,
					brand: store.brand_id,
				});
			}
			if !seen.insert(store.id.to_string()) {
				return Err(CatalogError::DuplicateId(store.id.to_string()));
			}
			stores_by_brand.entry(store.brand_id.clone()).or_default().insert(store.id.clone());
			store_map.insert(store.id.clone(), store);
		}

		Ok(Self {
			company,
			brands: brand_map,
			stores: store_map,
			stores_by_brand,
		})
	}

	pub fn company(&self) -> &Company {
		&self.company
	}

	pub fn brand(&self, id: &BrandId) -> Option<&Brand> {
		self.brands.get(id)
	}

	pub fn store(&self, id: &StoreId) -> Option<&Store> {
		self.stores.get(id)
	}

	/// All brands, ordered by id.
	pub fn brands(&self) -> impl Iterator<Item = &Brand> {
		self.brands.values()
	}

	/// Stores of `brand`, ordered by id.
	pub fn stores_of<'a>(&'a self, brand: &BrandId) -> impl Iterator<Item = &'a Store> + 'a {
		self.stores_by_brand
			.get(brand)
			.into_iter()
			.flat_map(|ids| ids.iter())
			.filter_map(|id| self.stores.get(id))
	}

	/// Parent brand of `store`.
	pub fn parent_brand(&self, store: &StoreId) -> Option<&BrandId> {
		self.stores.get(store).map(|s| &s.brand_id)
	}
}
