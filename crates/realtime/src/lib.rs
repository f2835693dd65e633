//! Realtime synchronization for the resolved scope.
//!
//! [`ChannelManager`] keeps one reference-counted transport subscription per
//! [`ScopeKey`](brigade_scope::ScopeKey), reconnects failed subscriptions
//! with jittered exponential backoff, and drops events that arrive for a
//! channel after it was released. Accepted events are handed to the
//! [`UpdateDispatcher`], which normalizes them into [`UpdateRecord`]s, keeps
//! a short history for "last synced" indicators, and escalates significant
//! changes.

/// Reconnect backoff policy.
pub mod backoff;
/// Channel handles, statuses and connection quality.
pub mod channel;
/// Update normalization, significance filtering and fan-out.
pub mod dispatcher;
/// Error types.
pub mod error;
/// Reference-counted channel lifecycle.
pub mod manager;
/// Transport abstraction.
pub mod transport;
/// Normalized update records.
pub mod update;

pub use backoff::ReconnectPolicy;
pub use channel::{Channel, ChannelId, ChannelStatus, ConnectionQuality, StatusEvent};
pub use dispatcher::{DispatchOutcome, Escalation, SignificancePolicy, SignificanceRule, UpdateDispatcher};
pub use error::{NormalizeError, TransportError};
pub use manager::{ChannelManager, DeliveryOutcome, ReleaseOutcome};
pub use transport::{RealtimeTransport, TopicFilter, TransportEvent, TransportHandle};
pub use update::{FieldChange, PayloadDelta, RawPayload, UpdateKind, UpdateRecord};
