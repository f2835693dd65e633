use async_trait::async_trait;
use brigade_scope::{AccessGrant, CatalogError, OrgNode, OrgTree, ScopeCatalog};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Organization nodes and the actor's grant, as returned by the access-control backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSnapshot {
	pub nodes: Vec<OrgNode>,
	pub grant: AccessGrant,
}

impl AccessSnapshot {
	/// Validates the tree and computes the actor's catalog.
	///
	/// # Errors
	///
	/// Returns [`CatalogError`] for malformed trees or grants that leave
	/// the actor without any accessible scope.
	pub fn into_catalog(self) -> Result<ScopeCatalog, CatalogError> {
		let tree = OrgTree::from_nodes(self.nodes)?;
		ScopeCatalog::new(tree, &self.grant)
	}
}

/// Source of the actor's role and accessible organization nodes.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
	/// Loads the current access snapshot. Called at startup and on every
	/// [`Session::refresh_access`](crate::Session::refresh_access).
	async fn load_access(&self) -> Result<AccessSnapshot, IdentityError>;
}
