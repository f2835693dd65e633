//! Scope resolution for the company → brand → store hierarchy.
//!
//! [`ScopeCatalog`] is an immutable snapshot of the organization tree and of
//! what one actor may see. [`ScopeResolver`] owns the actor's current
//! [`ScopeSelection`] and is the only thing allowed to change it; every
//! transition is validated against the catalog before it is committed, so a
//! selection observed anywhere downstream never names a node outside the
//! actor's [`AccessSet`].

/// Organization snapshot and per-actor access set.
pub mod catalog;
/// Error types for catalog construction and scope transitions.
pub mod error;
/// Identifier newtypes for organization nodes.
pub mod ids;
/// Role-gated navigation filtering.
pub mod nav;
/// Organization tree nodes.
pub mod org;
/// Scope selection state machine.
pub mod resolver;
/// Role ordering.
pub mod role;
/// Scope levels, selections, keys and targets.
pub mod selection;

pub use catalog::{AccessGrant, AccessSet, ScopeCatalog};
pub use error::{CatalogError, ScopeChangeError, ScopeViolation};
pub use ids::{BrandId, CompanyId, StoreId};
pub use nav::{NavItem, visible_items};
pub use org::{Brand, Company, OrgNode, OrgTree, Store};
pub use resolver::{ScopeChange, ScopeResolver};
pub use role::{Role, satisfies};
pub use selection::{ScopeKey, ScopeLevel, ScopeSelection, ScopeTarget};
