use std::path::PathBuf;

use brigade_realtime::TransportError;
use brigade_scope::CatalogError;
use thiserror::Error;

/// Failure to load or validate a [`SessionConfig`](crate::SessionConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	/// A value is outside its allowed range.
	#[error("invalid config: {0}")]
	Invalid(String),
}

/// Failure reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
	#[error("actor is not authenticated")]
	Unauthenticated,
	#[error("identity provider unavailable: {0}")]
	Unavailable(String),
}

/// Session setup and refresh failures.
#[derive(Debug, Error)]
pub enum SessionError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Identity(#[from] IdentityError),
	#[error(transparent)]
	Catalog(#[from] CatalogError),
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// The operation needs a loaded access set.
	#[error("session is not ready")]
	NotReady,
	#[error("session has been shut down")]
	Closed,
}
