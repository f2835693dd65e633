use async_trait::async_trait;
use brigade_scope::ScopeKey;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::update::RawPayload;

/// Opaque identifier of one open transport subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransportHandle(pub u64);

impl std::fmt::Display for TransportHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// What a subscription listens to: a set of topics narrowed to one scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicFilter {
	pub topics: Vec<String>,
	pub scope: ScopeKey,
}

impl TopicFilter {
	/// Compact `topic,topic@scope` descriptor used in logs and channel metadata.
	pub fn descriptor(&self) -> String {
		format!("{}@{}", self.topics.join(","), self.scope)
	}
}

/// Push event from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	/// A change event on an open subscription.
	Payload { handle: TransportHandle, payload: RawPayload },
	/// A heartbeat arrived on time.
	Heartbeat { handle: TransportHandle },
	/// A heartbeat was missed or the transport reported a recoverable warning.
	Warning { handle: TransportHandle, message: String },
	/// The subscription failed and will not recover on its own.
	Failed { handle: TransportHandle, error: TransportError },
}

impl TransportEvent {
	pub fn handle(&self) -> TransportHandle {
		match self {
			Self::Payload { handle, .. } | Self::Heartbeat { handle } | Self::Warning { handle, .. } | Self::Failed { handle, .. } => *handle,
		}
	}
}

/// Realtime transport primitive.
///
/// The backend protocol lives behind this trait; the channel manager only
/// needs subscriptions it can open and close, and a stream of push events
/// tagged with the handle they belong to.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + 'static {
	/// Takes the push-event stream.
	///
	/// # Errors
	///
	/// Returns [`TransportError::EventsTaken`] on every call after the first.
	fn events(&self) -> Result<mpsc::UnboundedReceiver<TransportEvent>, TransportError>;

	/// Opens a subscription and completes once the handshake has finished.
	async fn open(&self, filter: TopicFilter) -> Result<TransportHandle, TransportError>;

	/// Closes a subscription. Closing an unknown handle is a no-op.
	async fn close(&self, handle: TransportHandle);
}
