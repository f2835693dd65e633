use std::cell::Cell;
use std::sync::Arc;

use brigade_scope::ScopeKey;
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, watch};

use crate::transport::{TopicFilter, TransportHandle};

/// Process-unique channel identifier. A key that is released and ensured
/// again gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "ch{}", self.0)
	}
}

/// Lifecycle state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
	/// Handshake in flight.
	Connecting,
	/// Subscribed and healthy.
	Open,
	/// Subscribed, but heartbeats are late or the transport warned.
	Degraded,
	/// Not subscribed. Either released, or failed and waiting to retry.
	Closed,
	/// Reconnect attempts exhausted; no further retries until asked.
	Offline,
}

/// Coarse connection indicator for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
	Online,
	Degraded,
	Offline,
}

impl ChannelStatus {
	/// Quality shown for a channel that is still referenced.
	pub const fn quality(self) -> ConnectionQuality {
		match self {
			Self::Open => ConnectionQuality::Online,
			Self::Connecting | Self::Degraded | Self::Closed => ConnectionQuality::Degraded,
			Self::Offline => ConnectionQuality::Offline,
		}
	}

	/// Returns true when the channel holds a live subscription.
	pub const fn is_subscribed(self) -> bool {
		matches!(self, Self::Open | Self::Degraded)
	}
}

/// Status transition broadcast by the channel manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
	pub key: ScopeKey,
	pub channel: ChannelId,
	pub status: ChannelStatus,
}

pub(crate) struct ChannelShared {
	pub(crate) id: ChannelId,
	pub(crate) key: ScopeKey,
	pub(crate) filter: TopicFilter,
	pub(crate) status: watch::Sender<ChannelStatus>,
	pub(crate) handle: Mutex<Option<TransportHandle>>,
	pub(crate) failed: Notify,
	/// Delivery gate. Held for the duration of every delivery; cleared on
	/// release so nothing is forwarded once release has returned. Reentrant
	/// so an observer may release its own channel mid-delivery.
	live: ReentrantMutex<Cell<bool>>,
}

impl ChannelShared {
	pub(crate) fn new(id: ChannelId, filter: TopicFilter) -> Self {
		let (status, _) = watch::channel(ChannelStatus::Connecting);
		Self {
			id,
			key: filter.scope.clone(),
			filter,
			status,
			handle: Mutex::new(None),
			failed: Notify::new(),
			live: ReentrantMutex::new(Cell::new(true)),
		}
	}

	/// Runs `deliver` if the channel has not been retired.
	pub(crate) fn deliver<R>(&self, deliver: impl FnOnce() -> R) -> Option<R> {
		let live = self.live.lock();
		if !live.get() {
			return None;
		}
		Some(deliver())
	}

	/// Stops all further deliveries, waiting for one in progress on another thread.
	pub(crate) fn retire(&self) {
		self.live.lock().set(false);
	}

	pub(crate) fn is_live(&self) -> bool {
		self.live.lock().get()
	}
}

/// Handle to a reference-counted realtime channel.
///
/// Clones refer to the same channel. Obtained from
/// [`ChannelManager::ensure`](crate::ChannelManager::ensure).
#[derive(Clone)]
pub struct Channel {
	pub(crate) shared: Arc<ChannelShared>,
}

impl Channel {
	pub fn id(&self) -> ChannelId {
		self.shared.id
	}

	pub fn key(&self) -> &ScopeKey {
		&self.shared.key
	}

	/// Topic descriptor, e.g. `inventory,notifications@store:s1`.
	pub fn topic(&self) -> String {
		self.shared.filter.descriptor()
	}

	pub fn filter(&self) -> &TopicFilter {
		&self.shared.filter
	}

	pub fn status(&self) -> ChannelStatus {
		*self.shared.status.borrow()
	}

	pub fn quality(&self) -> ConnectionQuality {
		self.status().quality()
	}

	/// Receiver observing every status transition of this channel.
	pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
		self.shared.status.subscribe()
	}

	/// Returns true when both handles refer to the same channel instance.
	pub fn same_channel(&self, other: &Channel) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}

	/// Returns false once the channel has been released.
	pub fn is_live(&self) -> bool {
		self.shared.is_live()
	}
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel")
			.field("id", &self.shared.id)
			.field("key", &self.shared.key)
			.field("status", &self.status())
			.finish()
	}
}
