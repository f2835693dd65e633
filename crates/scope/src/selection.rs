use serde::{Deserialize, Serialize};

use crate::ids::{BrandId, CompanyId, StoreId};

/// Organizational level of a scope, broadest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
	Company,
	Brand,
	Store,
}

impl ScopeLevel {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Company => "company",
			Self::Brand => "brand",
			Self::Store => "store",
		}
	}
}

impl std::fmt::Display for ScopeLevel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The node an actor is currently viewing.
///
/// A store selection always carries its parent brand; a brand selection
/// never carries a store. Both hold by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum ScopeSelection {
	Company { company_id: CompanyId },
	Brand { brand_id: BrandId },
	Store { brand_id: BrandId, store_id: StoreId },
}

impl ScopeSelection {
	pub const fn level(&self) -> ScopeLevel {
		match self {
			Self::Company { .. } => ScopeLevel::Company,
			Self::Brand { .. } => ScopeLevel::Brand,
			Self::Store { .. } => ScopeLevel::Store,
		}
	}

	pub fn brand_id(&self) -> Option<&BrandId> {
		match self {
			Self::Company { .. } => None,
			Self::Brand { brand_id } | Self::Store { brand_id, .. } => Some(brand_id),
		}
	}

	pub fn store_id(&self) -> Option<&StoreId> {
		match self {
			Self::Store { store_id, .. } => Some(store_id),
			_ => None,
		}
	}

	/// Channel key for this selection.
	pub fn key(&self) -> ScopeKey {
		match self {
			Self::Company { company_id } => ScopeKey::new(ScopeLevel::Company, company_id.as_str()),
			Self::Brand { brand_id } => ScopeKey::new(ScopeLevel::Brand, brand_id.as_str()),
			Self::Store { store_id, .. } => ScopeKey::new(ScopeLevel::Store, store_id.as_str()),
		}
	}
}

impl std::fmt::Display for ScopeSelection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Company { company_id } => write!(f, "company {company_id}"),
			Self::Brand { brand_id } => write!(f, "brand {brand_id}"),
			Self::Store { brand_id, store_id } => write!(f, "store {store_id} (brand {brand_id})"),
		}
	}
}

/// Deterministic encoding of a scope selection: `<level>:<node id>`.
///
/// Two selections resolving to the same key share one realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
	pub fn new(level: ScopeLevel, node: &str) -> Self {
		Self(format!("{}:{node}", level.as_str()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Level encoded in the key.
	pub fn level(&self) -> Option<ScopeLevel> {
		match self.0.split_once(':')?.0 {
			"company" => Some(ScopeLevel::Company),
			"brand" => Some(ScopeLevel::Brand),
			"store" => Some(ScopeLevel::Store),
			_ => None,
		}
	}

	/// Node id encoded in the key.
	pub fn node(&self) -> &str {
		self.0.split_once(':').map_or("", |(_, node)| node)
	}
}

impl std::fmt::Display for ScopeKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

/// Requested destination of a scope transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "snake_case")]
pub enum ScopeTarget {
	CompanyWide,
	Brand(BrandId),
	Store(StoreId),
}

impl std::fmt::Display for ScopeTarget {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::CompanyWide => f.write_str("company-wide"),
			Self::Brand(id) => write!(f, "brand {id}"),
			Self::Store(id) => write!(f, "store {id}"),
		}
	}
}
