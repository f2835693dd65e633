//! Client session core for the restaurant back office.
//!
//! A [`Session`] loads the actor's access from an [`IdentityProvider`],
//! owns the [`ScopeResolver`](brigade_scope::ScopeResolver), keeps one
//! realtime channel open for the resolved scope, and routes updates into the
//! notification center and the [`ToastSink`].
//!
//! Scope transitions are serialized: a request waits for the previous one's
//! channel swap to finish, and requests made before the access set has
//! loaded wait for it, failing with
//! [`ScopeChangeError::NotReady`](brigade_scope::ScopeChangeError::NotReady)
//! if loading fails.

/// TOML configuration.
pub mod config;
/// Session error types.
pub mod error;
/// Identity provider seam.
pub mod identity;
mod session;
/// Toast sink seam.
pub mod toast;

pub use config::SessionConfig;
pub use error::{ConfigError, IdentityError, SessionError};
pub use identity::{AccessSnapshot, IdentityProvider};
pub use session::{Readiness, Session, SessionBuilder};
pub use toast::{LogToastSink, Toast, ToastSink};
