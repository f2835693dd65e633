use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU64, Ordering};

use brigade_scope::ScopeKey;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::ReconnectPolicy;
use crate::channel::{Channel, ChannelId, ChannelShared, ChannelStatus, ConnectionQuality, StatusEvent};
use crate::dispatcher::{DispatchOutcome, UpdateDispatcher};
use crate::error::TransportError;
use crate::transport::{RealtimeTransport, TopicFilter, TransportEvent, TransportHandle};

/// Result of [`ChannelManager::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
	/// Other references remain; the channel stays up.
	Released { remaining: usize },
	/// The last reference was dropped and the channel closed.
	Closed,
	/// No channel is tracked for the key.
	NotTracked,
}

/// Result of [`ChannelManager::handle_transport_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
	/// The payload reached the dispatcher.
	Delivered(DispatchOutcome),
	/// A heartbeat or warning moved the channel to a new status.
	StatusChanged(ChannelStatus),
	/// A heartbeat or warning that did not change anything.
	Unchanged,
	/// The subscription failed; its channel will reconnect.
	Failed,
	/// The handle belongs to no live channel. The event was dropped.
	Stale,
}

struct ChannelEntry {
	channel: Channel,
	refs: usize,
	cancel: CancellationToken,
}

/// Channel indices. Both maps change together under one lock.
struct ManagerState {
	channels: FxHashMap<ScopeKey, ChannelEntry>,
	/// Open subscriptions. A handle is removed before its channel is
	/// retired, so events looked up here after removal are stale.
	handles: FxHashMap<TransportHandle, Arc<ChannelShared>>,
}

struct ManagerCore {
	transport: Arc<dyn RealtimeTransport>,
	dispatcher: Arc<UpdateDispatcher>,
	policy: ReconnectPolicy,
	topics: Vec<String>,
	state: Mutex<ManagerState>,
	status_tx: broadcast::Sender<StatusEvent>,
	next_id: AtomicU64,
	shutdown: CancellationToken,
}

/// Reference-counted realtime channels keyed by [`ScopeKey`].
///
/// # Concurrency
///
/// - `state`: one `parking_lot` lock over channel and handle indices; never
///   held across an await.
/// - Each channel runs one task that opens the subscription and reconnects
///   it after failures. Release cancels that task's token under the state
///   lock, and the task checks the token under the same lock before every
///   transition, so a released channel never changes status again.
/// - Payloads pass through the channel's delivery gate. Release retires the
///   gate before returning, so no payload is forwarded afterwards.
/// - Shutdown cancels the root token under the state lock; `ensure` checks
///   it under the same lock, so no channel outlives shutdown.
///
/// Clones share the same channels.
#[derive(Clone)]
pub struct ChannelManager {
	core: Arc<ManagerCore>,
}

impl ChannelManager {
	/// Creates a manager subscribing every channel to `topics`.
	pub fn new(
		transport: Arc<dyn RealtimeTransport>,
		dispatcher: Arc<UpdateDispatcher>,
		topics: Vec<String>,
		policy: ReconnectPolicy,
		status_buffer: usize,
	) -> Self {
		let (status_tx, _) = broadcast::channel(status_buffer.max(1));
		Self {
			core: Arc::new(ManagerCore {
				transport,
				dispatcher,
				policy,
				topics,
				state: Mutex::new(ManagerState {
					channels: FxHashMap::default(),
					handles: FxHashMap::default(),
				}),
				status_tx,
				next_id: AtomicU64::new(1),
				shutdown: CancellationToken::new(),
			}),
		}
	}

	pub fn dispatcher(&self) -> &Arc<UpdateDispatcher> {
		&self.core.dispatcher
	}

	/// Returns the channel for `key`, opening it if none is tracked.
	///
	/// Takes one reference. The handle is returned immediately in
	/// [`ChannelStatus::Connecting`] while the handshake runs in the
	/// background; watch [`Channel::watch_status`] or
	/// [`Self::subscribe_status`] for the transition. Ensuring an offline
	/// channel restarts its reconnect attempts.
	///
	/// Returns `None` after [`Self::shutdown`].
	pub fn ensure(&self, key: &ScopeKey) -> Option<Channel> {
		let mut state = self.core.state.lock();
		if self.core.shutdown.is_cancelled() {
			tracing::debug!(scope = %key, "realtime.channel.ensure_after_shutdown");
			return None;
		}
		if let Some(entry) = state.channels.get_mut(key) {
			entry.refs += 1;
			tracing::trace!(scope = %key, refs = entry.refs, "realtime.channel.shared");
			let channel = entry.channel.clone();
			if channel.status() == ChannelStatus::Offline {
				let cancel = self.core.revive(entry);
				drop(state);
				self.core.start(Arc::clone(&channel.shared), cancel);
			}
			return Some(channel);
		}

		let id = ChannelId(self.core.next_id.fetch_add(1, Ordering::Relaxed));
		let filter = TopicFilter {
			topics: self.core.topics.clone(),
			scope: key.clone(),
		};
		let shared = Arc::new(ChannelShared::new(id, filter));
		let cancel = self.core.shutdown.child_token();
		let channel = Channel {
			shared: Arc::clone(&shared),
		};
		state.channels.insert(
			key.clone(),
			ChannelEntry {
				channel: channel.clone(),
				refs: 1,
				cancel: cancel.clone(),
			},
		);
		self.core.emit(&shared, ChannelStatus::Connecting);
		drop(state);

		tracing::debug!(scope = %key, channel = %id, topic = %channel.topic(), "realtime.channel.open");
		self.core.start(shared, cancel);
		Some(channel)
	}

	/// Drops one reference to `key`, closing the channel at zero.
	///
	/// Closing cancels a pending handshake or backoff timer. Once this
	/// returns no further payload for the channel reaches the dispatcher.
	pub fn release(&self, key: &ScopeKey) -> ReleaseOutcome {
		let (entry, handle) = {
			let mut state = self.core.state.lock();
			let Some(entry) = state.channels.get_mut(key) else {
				tracing::trace!(scope = %key, "realtime.channel.release_untracked");
				return ReleaseOutcome::NotTracked;
			};
			entry.refs -= 1;
			if entry.refs > 0 {
				tracing::trace!(scope = %key, refs = entry.refs, "realtime.channel.released");
				return ReleaseOutcome::Released { remaining: entry.refs };
			}
			let Some(entry) = state.channels.remove(key) else {
				return ReleaseOutcome::NotTracked;
			};
			entry.cancel.cancel();
			let handle = entry.channel.shared.handle.lock().take();
			if let Some(handle) = handle {
				state.handles.remove(&handle);
			}
			(entry, handle)
		};

		let shared = &entry.channel.shared;
		shared.retire();
		self.core.set_status(shared, ChannelStatus::Closed);
		tracing::debug!(scope = %key, channel = %shared.id, "realtime.channel.closed");

		if let Some(handle) = handle {
			let transport = Arc::clone(&self.core.transport);
			spawn("close", async move { transport.close(handle).await });
		}
		ReleaseOutcome::Closed
	}

	/// Routes one push event from the transport to its channel.
	pub fn handle_transport_event(&self, event: TransportEvent) -> DeliveryOutcome {
		match event {
			TransportEvent::Payload { handle, payload } => {
				let Some(shared) = self.core.state.lock().handles.get(&handle).cloned() else {
					tracing::trace!(handle = %handle, "realtime.event.stale");
					return DeliveryOutcome::Stale;
				};
				let dispatcher = &self.core.dispatcher;
				match shared.deliver(|| dispatcher.on_raw_event(&shared.key, payload)) {
					Some(outcome) => DeliveryOutcome::Delivered(outcome),
					None => {
						tracing::trace!(handle = %handle, scope = %shared.key, "realtime.event.stale");
						DeliveryOutcome::Stale
					}
				}
			}
			TransportEvent::Warning { handle, message } => {
				let state = self.core.state.lock();
				let Some(shared) = state.handles.get(&handle) else {
					return DeliveryOutcome::Stale;
				};
				tracing::debug!(scope = %shared.key, message = %message, "realtime.channel.warning");
				if *shared.status.borrow() != ChannelStatus::Open {
					return DeliveryOutcome::Unchanged;
				}
				self.core.set_status(shared, ChannelStatus::Degraded);
				DeliveryOutcome::StatusChanged(ChannelStatus::Degraded)
			}
			TransportEvent::Heartbeat { handle } => {
				let state = self.core.state.lock();
				let Some(shared) = state.handles.get(&handle) else {
					return DeliveryOutcome::Stale;
				};
				if *shared.status.borrow() != ChannelStatus::Degraded {
					return DeliveryOutcome::Unchanged;
				}
				self.core.set_status(shared, ChannelStatus::Open);
				DeliveryOutcome::StatusChanged(ChannelStatus::Open)
			}
			TransportEvent::Failed { handle, error } => {
				let mut state = self.core.state.lock();
				let Some(shared) = state.handles.remove(&handle) else {
					return DeliveryOutcome::Stale;
				};
				let mut current = shared.handle.lock();
				if *current == Some(handle) {
					*current = None;
				}
				drop(current);
				tracing::warn!(scope = %shared.key, handle = %handle, error = %error, "realtime.channel.lost");
				shared.failed.notify_one();
				DeliveryOutcome::Failed
			}
		}
	}

	/// Forwards the transport's push events into [`Self::handle_transport_event`]
	/// until [`Self::shutdown`].
	///
	/// # Errors
	///
	/// Returns [`TransportError::EventsTaken`] if the event stream was already taken.
	pub fn spawn_event_pump(&self) -> Result<JoinHandle<()>, TransportError> {
		let mut events = self.core.transport.events()?;
		let manager = self.clone();
		let shutdown = self.core.shutdown.clone();
		Ok(spawn("event-pump", async move {
			loop {
				let event = tokio::select! {
					biased;
					_ = shutdown.cancelled() => break,
					event = events.recv() => match event {
						Some(event) => event,
						None => break,
					},
				};
				manager.handle_transport_event(event);
			}
			tracing::debug!("realtime.pump.exit");
		}))
	}

	/// Receiver for status transitions of every channel.
	pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
		self.core.status_tx.subscribe()
	}

	/// Tracked channel for `key`.
	pub fn channel(&self, key: &ScopeKey) -> Option<Channel> {
		self.core.state.lock().channels.get(key).map(|entry| entry.channel.clone())
	}

	/// Outstanding references to `key`.
	pub fn ref_count(&self, key: &ScopeKey) -> usize {
		self.core.state.lock().channels.get(key).map_or(0, |entry| entry.refs)
	}

	/// Connection quality of the channel for `key`.
	pub fn quality(&self, key: &ScopeKey) -> Option<ConnectionQuality> {
		self.channel(key).map(|channel| channel.quality())
	}

	/// Connection quality of every tracked channel, ordered by key.
	pub fn qualities(&self) -> Vec<(ScopeKey, ConnectionQuality)> {
		let state = self.core.state.lock();
		let mut out: Vec<_> = state.channels.iter().map(|(key, entry)| (key.clone(), entry.channel.quality())).collect();
		out.sort_by(|a, b| a.0.cmp(&b.0));
		out
	}

	/// Restarts reconnect attempts for an offline channel.
	///
	/// Returns false if `key` is not tracked or not offline.
	pub fn retry(&self, key: &ScopeKey) -> bool {
		let mut state = self.core.state.lock();
		let Some(entry) = state.channels.get_mut(key) else {
			return false;
		};
		if entry.channel.status() != ChannelStatus::Offline {
			return false;
		}
		let shared = Arc::clone(&entry.channel.shared);
		let cancel = self.core.revive(entry);
		drop(state);
		tracing::info!(scope = %key, "realtime.channel.retry");
		self.core.start(shared, cancel);
		true
	}

	/// Closes every channel and stops the event pump.
	pub async fn shutdown(&self) {
		let drained: Vec<_> = {
			let mut state = self.core.state.lock();
			self.core.shutdown.cancel();
			state.handles.clear();
			state.channels.drain().map(|(_, entry)| entry).collect()
		};
		for entry in drained {
			let shared = &entry.channel.shared;
			shared.retire();
			self.core.set_status(shared, ChannelStatus::Closed);
			let handle = shared.handle.lock().take();
			if let Some(handle) = handle {
				self.core.transport.close(handle).await;
			}
		}
		tracing::info!("realtime.shutdown");
	}
}

impl ManagerCore {
	fn emit(&self, shared: &ChannelShared, status: ChannelStatus) {
		tracing::trace!(scope = %shared.key, channel = %shared.id, status = ?status, "realtime.channel.status");
		let _ = self.status_tx.send(StatusEvent {
			key: shared.key.clone(),
			channel: shared.id,
			status,
		});
	}

	fn set_status(&self, shared: &ChannelShared, status: ChannelStatus) {
		if shared.status.send_replace(status) != status {
			self.emit(shared, status);
		}
	}

	/// Applies `status` unless the channel was released. Returns false once released.
	fn transition(&self, shared: &ChannelShared, cancel: &CancellationToken, status: ChannelStatus) -> bool {
		let _state = self.state.lock();
		if cancel.is_cancelled() {
			return false;
		}
		self.set_status(shared, status);
		true
	}

	/// Records a completed handshake. Returns false if the channel was
	/// released meanwhile; the caller then owns closing `handle`.
	fn register(&self, shared: &Arc<ChannelShared>, cancel: &CancellationToken, handle: TransportHandle) -> bool {
		let mut state = self.state.lock();
		if cancel.is_cancelled() {
			return false;
		}
		*shared.handle.lock() = Some(handle);
		state.handles.insert(handle, Arc::clone(shared));
		self.set_status(shared, ChannelStatus::Open);
		true
	}

	fn revive(&self, entry: &mut ChannelEntry) -> CancellationToken {
		entry.cancel = self.shutdown.child_token();
		self.set_status(&entry.channel.shared, ChannelStatus::Connecting);
		entry.cancel.clone()
	}

	fn start(self: &Arc<Self>, shared: Arc<ChannelShared>, cancel: CancellationToken) {
		spawn("channel", run_channel(Arc::clone(self), shared, cancel));
	}
}

async fn run_channel(core: Arc<ManagerCore>, shared: Arc<ChannelShared>, cancel: CancellationToken) {
	let mut failures: u32 = 0;
	loop {
		// The handshake is not preempted; a late handle is closed below.
		match core.transport.open(shared.filter.clone()).await {
			Ok(handle) => {
				if !core.register(&shared, &cancel, handle) {
					tracing::debug!(scope = %shared.key, handle = %handle, "realtime.channel.handshake_discarded");
					core.transport.close(handle).await;
					return;
				}
				tracing::debug!(scope = %shared.key, handle = %handle, "realtime.channel.subscribed");
				failures = 0;
				tokio::select! {
					biased;
					_ = cancel.cancelled() => return,
					_ = shared.failed.notified() => {}
				}
			}
			Err(err) => {
				tracing::warn!(scope = %shared.key, error = %err, "realtime.channel.handshake_failed");
			}
		}

		if !core.transition(&shared, &cancel, ChannelStatus::Closed) {
			return;
		}
		failures = failures.saturating_add(1);
		if core.policy.exhausted(failures) {
			if core.transition(&shared, &cancel, ChannelStatus::Offline) {
				tracing::error!(scope = %shared.key, failures, "realtime.channel.offline");
			}
			return;
		}

		let delay = core.policy.delay(failures);
		tracing::debug!(scope = %shared.key, failures, delay_ms = delay.as_millis() as u64, "realtime.channel.reconnect");
		tokio::select! {
			biased;
			_ = cancel.cancelled() => return,
			_ = tokio::time::sleep(delay) => {}
		}
		if !core.transition(&shared, &cancel, ChannelStatus::Connecting) {
			return;
		}
	}
}

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static FALLBACK_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	FALLBACK_RT
		.get_or_init(|| {
			tokio::runtime::Builder::new_multi_thread()
				.worker_threads(1)
				.thread_name("brigade-realtime")
				.enable_all()
				.build()
				.expect("failed to build realtime fallback runtime")
		})
		.handle()
		.clone()
}

/// Spawns channel work on the caller's runtime, falling back to a private
/// one outside a runtime.
fn spawn<F>(task: &'static str, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task, "realtime.spawn");
	runtime_handle().spawn(fut)
}
