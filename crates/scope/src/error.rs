use thiserror::Error;

use crate::ids::{BrandId, CompanyId, StoreId};
use crate::selection::ScopeTarget;

/// Requested scope lies outside the actor's access set.
///
/// The selection that was current when the request was made is retained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scope {target} is outside the actor's access set")]
pub struct ScopeViolation {
	pub target: ScopeTarget,
}

/// Failure of a scope change request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeChangeError {
	#[error(transparent)]
	Violation(#[from] ScopeViolation),
	/// The access set has not been loaded, or loading it failed.
	#[error("scope catalog is not ready")]
	NotReady,
}

/// Failure to build an organization tree or access set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
	#[error("organization has no company root")]
	MissingCompany,
	#[error("organization has more than one company root: {first} and {second}")]
	MultipleCompanies { first: CompanyId, second: CompanyId },
	#[error("duplicate node id {0}")]
	DuplicateId(String),
	#[error("brand {brand} references unknown company {company}")]
	UnknownCompany { brand: BrandId, company: CompanyId },
	#[error("store {store} references unknown brand {brand}")]
	UnknownBrand { store: StoreId, brand: BrandId },
	#[error("access grant targets company {granted}, organization root is {actual}")]
	ForeignCompany { granted: CompanyId, actual: CompanyId },
	#[error("actor has no accessible scope")]
	NoAccessibleScope,
}
