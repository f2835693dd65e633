use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use brigade_notify::{Notification, NotificationAggregator, NotificationCategory, NotificationState, RecencyGroups};
use brigade_primitives::{ObserverList, SharedClock, Subscription, SystemClock};
use brigade_realtime::{
	ChannelManager, ConnectionQuality, Escalation, RealtimeTransport, StatusEvent, UpdateDispatcher, UpdateKind, UpdateRecord,
};
use brigade_scope::{NavItem, ScopeCatalog, ScopeChange, ScopeChangeError, ScopeKey, ScopeResolver, ScopeSelection, ScopeTarget};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::identity::IdentityProvider;
use crate::toast::{LogToastSink, Toast, ToastSink};

/// Loading state of the actor's access set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
	Loading,
	Ready,
	/// Loading failed; scope changes are rejected until a later
	/// [`Session::initialize`] succeeds.
	Failed(String),
	Closed,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
	config: SessionConfig,
	transport: Arc<dyn RealtimeTransport>,
	identity: Arc<dyn IdentityProvider>,
	toasts: Arc<dyn ToastSink>,
	clock: SharedClock,
}

impl SessionBuilder {
	pub fn config(mut self, config: SessionConfig) -> Self {
		self.config = config;
		self
	}

	pub fn toast_sink(mut self, toasts: Arc<dyn ToastSink>) -> Self {
		self.toasts = toasts;
		self
	}

	pub fn clock(mut self, clock: SharedClock) -> Self {
		self.clock = clock;
		self
	}

	/// Validates the configuration and wires the session together.
	///
	/// Nothing is loaded or opened until [`Session::initialize`].
	pub fn build(self) -> Result<Session, SessionError> {
		self.config.validate()?;
		let config = self.config;

		let dispatcher = Arc::new(UpdateDispatcher::new(
			config.significance.clone(),
			config.recent_updates,
			Arc::clone(&self.clock),
		));
		let channels = ChannelManager::new(
			self.transport,
			Arc::clone(&dispatcher),
			config.topics.clone(),
			config.reconnect.clone(),
			config.status_buffer,
		);
		let notifications = NotificationAggregator::new(&config.notifications, Arc::clone(&self.clock));
		let (readiness, _) = watch::channel(Readiness::Loading);

		let inner = Arc::new(SessionInner {
			config,
			identity: self.identity,
			toasts: self.toasts,
			clock: self.clock,
			dispatcher,
			channels,
			resolver: Mutex::new(None),
			catalog: ArcSwapOption::empty(),
			readiness,
			init: tokio::sync::Mutex::new(()),
			transitions: tokio::sync::Mutex::new(()),
			held: Mutex::new(None),
			scope_observers: ObserverList::new("session.scope"),
			notifications: Mutex::new(notifications),
			wiring: Mutex::new(Vec::new()),
			pump_started: Mutex::new(false),
			escalations: AtomicU64::new(1),
		});
		SessionInner::wire(&inner);
		Ok(Session { inner })
	}
}

struct SessionInner {
	config: SessionConfig,
	identity: Arc<dyn IdentityProvider>,
	toasts: Arc<dyn ToastSink>,
	clock: SharedClock,
	dispatcher: Arc<UpdateDispatcher>,
	channels: ChannelManager,
	/// `None` until the access set has loaded.
	resolver: Mutex<Option<ScopeResolver>>,
	/// Lock-free view of the resolver's catalog, swapped under the resolver lock.
	catalog: ArcSwapOption<ScopeCatalog>,
	readiness: watch::Sender<Readiness>,
	init: tokio::sync::Mutex<()>,
	/// Serializes scope transitions and refreshes. FIFO, so
	/// requests queued before readiness are replayed in order.
	transitions: tokio::sync::Mutex<()>,
	/// Channel key this session holds a reference to.
	held: Mutex<Option<ScopeKey>>,
	scope_observers: ObserverList<ScopeChange>,
	notifications: Mutex<NotificationAggregator>,
	wiring: Mutex<Vec<Subscription>>,
	pump_started: Mutex<bool>,
	escalations: AtomicU64,
}

/// Scope, realtime and notification state for one signed-in actor.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct Session {
	inner: Arc<SessionInner>,
}

impl Session {
	pub fn builder(transport: Arc<dyn RealtimeTransport>, identity: Arc<dyn IdentityProvider>) -> SessionBuilder {
		SessionBuilder {
			config: SessionConfig::default(),
			transport,
			identity,
			toasts: Arc::new(LogToastSink),
			clock: Arc::new(SystemClock),
		}
	}

	/// Starts the event pump, loads the access set and opens the channel
	/// for the default scope.
	///
	/// A no-op once ready. After a failure it may be called again.
	///
	/// # Errors
	///
	/// Identity and catalog failures move the session to
	/// [`Readiness::Failed`] and are returned.
	pub async fn initialize(&self) -> Result<(), SessionError> {
		let inner = &self.inner;
		let _init = inner.init.lock().await;
		match &*inner.readiness.borrow() {
			Readiness::Ready => return Ok(()),
			Readiness::Closed => return Err(SessionError::Closed),
			Readiness::Loading | Readiness::Failed(_) => {}
		}

		inner.start_pump()?;
		if !inner.advance(Readiness::Loading) {
			return Err(SessionError::Closed);
		}

		let catalog = match inner.load_catalog().await {
			Ok(catalog) => catalog,
			Err(err) => {
				tracing::warn!(error = %err, "session.access.failed");
				inner.advance(Readiness::Failed(err.to_string()));
				return Err(err);
			}
		};
		if *inner.readiness.borrow() == Readiness::Closed {
			tracing::debug!("session.access.discarded");
			return Err(SessionError::Closed);
		}

		let resolver = ScopeResolver::new(Arc::clone(&catalog));
		let key = resolver.key();
		let selection = resolver.selection().clone();
		let role = catalog.role();
		{
			let mut slot = inner.resolver.lock();
			*slot = Some(resolver);
			inner.catalog.store(Some(catalog));
		}
		inner.hold(Some(key));
		// Shutdown may have raced the commit; it must not be overwritten.
		if !inner.advance(Readiness::Ready) {
			inner.hold(None);
			return Err(SessionError::Closed);
		}
		tracing::info!(selection = %selection, role = role.as_str(), "session.ready");
		Ok(())
	}

	pub fn readiness(&self) -> Readiness {
		self.inner.readiness.borrow().clone()
	}

	/// Receiver observing readiness changes.
	pub fn watch_readiness(&self) -> watch::Receiver<Readiness> {
		self.inner.readiness.subscribe()
	}

	/// Current selection, once ready.
	pub fn resolved_scope(&self) -> Option<ScopeSelection> {
		self.inner.resolver.lock().as_ref().map(|resolver| resolver.selection().clone())
	}

	/// Current catalog, once ready.
	pub fn catalog(&self) -> Option<Arc<ScopeCatalog>> {
		self.inner.catalog.load_full()
	}

	/// Moves the resolved scope to `target`.
	///
	/// Waits for earlier requests to settle and for the access set to load.
	/// On success the channel for the new scope has been ensured, the old
	/// one released, and scope observers notified.
	///
	/// # Errors
	///
	/// [`ScopeChangeError::Violation`] leaves the selection unchanged.
	/// [`ScopeChangeError::NotReady`] is returned when loading failed or the
	/// session was shut down.
	pub async fn request_scope_change(&self, target: ScopeTarget) -> Result<(), ScopeChangeError> {
		let inner = &self.inner;
		let _turn = inner.transitions.lock().await;
		inner.wait_ready().await?;

		let change = {
			let mut resolver = inner.resolver.lock();
			let Some(resolver) = resolver.as_mut() else {
				return Err(ScopeChangeError::NotReady);
			};
			resolver.apply(&target)?
		};
		if let Some(change) = change {
			inner.settle(&change);
		}
		Ok(())
	}

	/// Registers an observer for committed scope changes.
	#[must_use = "dropping the subscription unsubscribes the observer"]
	pub fn subscribe_to_scope_changes(&self, observer: impl Fn(&ScopeChange) + Send + Sync + 'static) -> Subscription {
		self.inner.scope_observers.subscribe(observer)
	}

	/// Registers an observer on the raw update bus.
	#[must_use = "dropping the subscription unsubscribes the observer"]
	pub fn subscribe_to_updates(&self, observer: impl Fn(&UpdateRecord) + Send + Sync + 'static) -> Subscription {
		self.inner.dispatcher.subscribe(observer)
	}

	/// Non-blocking stream of every accepted update.
	pub fn update_stream(&self) -> broadcast::Receiver<UpdateRecord> {
		self.inner.dispatcher.stream()
	}

	/// Most recent updates, oldest first.
	pub fn recent_updates(&self) -> Vec<UpdateRecord> {
		self.inner.dispatcher.recent()
	}

	/// Receipt time of the last update for the resolved scope.
	pub fn last_synced(&self) -> Option<DateTime<Utc>> {
		let key = self.inner.held.lock().clone()?;
		self.inner.dispatcher.last_synced(&key)
	}

	pub fn notification_state(&self) -> NotificationState {
		self.inner.notifications.lock().state()
	}

	pub fn unread_count(&self) -> usize {
		self.inner.notifications.lock().unread_count()
	}

	pub fn grouped_notifications(&self) -> RecencyGroups {
		self.inner.notifications.lock().grouped_by_recency()
	}

	pub fn add_notification(&self, notification: Notification) -> bool {
		self.inner.notifications.lock().add(notification)
	}

	pub fn mark_notification_read(&self, id: &str) -> bool {
		self.inner.notifications.lock().mark_read(id)
	}

	pub fn mark_all_notifications_read(&self) -> usize {
		self.inner.notifications.lock().mark_all_read()
	}

	pub fn remove_notification(&self, id: &str) -> Option<Notification> {
		self.inner.notifications.lock().remove(id)
	}

	pub fn clear_notifications(&self) {
		self.inner.notifications.lock().clear_all();
	}

	/// Quality of the resolved scope's channel.
	pub fn connection_quality(&self) -> Option<ConnectionQuality> {
		let key = self.inner.held.lock().clone()?;
		self.inner.channels.quality(&key)
	}

	/// Quality of every active channel, including ones held by other consumers.
	pub fn connection_qualities(&self) -> Vec<(ScopeKey, ConnectionQuality)> {
		self.inner.channels.qualities()
	}

	/// Receiver for channel status transitions, including `Offline`.
	pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
		self.inner.channels.subscribe_status()
	}

	/// Restarts reconnect attempts for the resolved scope's channel after it went offline.
	pub fn retry_connection(&self) -> bool {
		let Some(key) = self.inner.held.lock().clone() else {
			return false;
		};
		self.inner.channels.retry(&key)
	}

	/// Shared channel manager, for consumers holding channels of their own.
	pub fn channels(&self) -> &ChannelManager {
		&self.inner.channels
	}

	/// Navigation entries visible at the current role and scope level.
	pub fn visible_nav<'a>(&self, items: &'a [NavItem]) -> Vec<&'a NavItem> {
		let resolver = self.inner.resolver.lock();
		let Some(resolver) = resolver.as_ref() else {
			return Vec::new();
		};
		brigade_scope::visible_items(items, resolver.catalog().role(), resolver.selection().level())
	}

	/// Reloads the access set and swaps the catalog.
	///
	/// The selection survives when still permitted; otherwise it falls back
	/// to the new default and scope observers see one change.
	///
	/// # Errors
	///
	/// Fails with [`SessionError::NotReady`] before the first successful
	/// load. Identity and catalog failures keep the previous catalog.
	pub async fn refresh_access(&self) -> Result<(), SessionError> {
		let inner = &self.inner;
		let _turn = inner.transitions.lock().await;
		if *inner.readiness.borrow() != Readiness::Ready {
			return Err(SessionError::NotReady);
		}

		let catalog = inner.load_catalog().await.inspect_err(|err| {
			tracing::warn!(error = %err, "session.refresh.failed");
		})?;

		let change = {
			let mut resolver = inner.resolver.lock();
			let Some(resolver) = resolver.as_mut() else {
				return Err(SessionError::NotReady);
			};
			if *inner.readiness.borrow() != Readiness::Ready {
				return Err(SessionError::Closed);
			}
			let change = resolver.replace_catalog(Arc::clone(&catalog));
			inner.catalog.store(Some(catalog));
			change
		};
		tracing::debug!(changed = change.is_some(), "session.refresh");
		if let Some(change) = change {
			inner.settle(&change);
		}
		Ok(())
	}

	/// Releases the session's channel, closes every channel and rejects
	/// further scope changes.
	///
	/// Does not wait for queued scope changes or an in-flight access load;
	/// queued requests fail with [`ScopeChangeError::NotReady`].
	pub async fn shutdown(&self) {
		let inner = &self.inner;
		inner.readiness.send_replace(Readiness::Closed);
		inner.hold(None);
		inner.wiring.lock().clear();
		inner.channels.shutdown().await;
		tracing::info!("session.shutdown");
	}
}

impl SessionInner {
	fn wire(this: &Arc<Self>) {
		let weak = Arc::downgrade(this);
		let escalations = this
			.dispatcher
			.subscribe_escalations(with_inner(&weak, |inner: &SessionInner, escalation: &Escalation| inner.on_escalation(escalation)));
		let updates = this
			.dispatcher
			.subscribe(with_inner(&weak, |inner: &SessionInner, record: &UpdateRecord| inner.on_update(record)));
		this.wiring.lock().extend([escalations, updates]);
	}

	fn start_pump(&self) -> Result<(), SessionError> {
		let mut started = self.pump_started.lock();
		if !*started {
			self.channels.spawn_event_pump()?;
			*started = true;
		}
		Ok(())
	}

	/// Publishes `next` unless the session was shut down.
	fn advance(&self, next: Readiness) -> bool {
		self.readiness.send_if_modified(|state| {
			if *state == Readiness::Closed {
				return false;
			}
			*state = next;
			true
		})
	}

	async fn load_catalog(&self) -> Result<Arc<ScopeCatalog>, SessionError> {
		let snapshot = self.identity.load_access().await?;
		Ok(Arc::new(snapshot.into_catalog()?))
	}

	async fn wait_ready(&self) -> Result<(), ScopeChangeError> {
		let mut rx = self.readiness.subscribe();
		let ready = {
			let state = rx
				.wait_for(|state| *state != Readiness::Loading)
				.await
				.map_err(|_| ScopeChangeError::NotReady)?;
			*state == Readiness::Ready
		};
		if ready { Ok(()) } else { Err(ScopeChangeError::NotReady) }
	}

	/// Moves the held channel reference to `key`.
	fn hold(&self, key: Option<ScopeKey>) {
		let previous = {
			let mut held = self.held.lock();
			std::mem::replace(&mut *held, key.clone())
		};
		if previous == key {
			return;
		}
		if let Some(previous) = &previous {
			self.channels.release(previous);
		}
		if let Some(key) = &key {
			match self.channels.ensure(key) {
				Some(channel) => tracing::debug!(scope = %key, channel = %channel.id(), "session.channel.held"),
				None => tracing::debug!(scope = %key, "session.channel.closed"),
			}
		}
	}

	fn settle(&self, change: &ScopeChange) {
		if change.key_changed() {
			self.hold(Some(change.current.key()));
		}
		self.scope_observers.notify(change);
	}

	fn on_escalation(&self, escalation: &Escalation) {
		let record = &escalation.record;
		let seq = self.escalations.fetch_add(1, Ordering::Relaxed);
		let title = format!("{} {} changed by {:+}", record.topic, record.entity_id, escalation.delta);
		let body = match escalation.coalesced {
			0 => format!("{} on {}", escalation.field, record.scope),
			n => format!("{} on {} ({n} more changes)", escalation.field, record.scope),
		};

		let notification = Notification::new(
			format!("escalation-{seq}"),
			NotificationCategory::parse(&record.topic),
			self.clock.now(),
		)
		.with_title(title.clone())
		.with_body(body.clone());
		self.notifications.lock().add(notification);

		self.toasts.show(Toast {
			scope: record.scope.clone(),
			category: NotificationCategory::parse(&record.topic),
			title,
			body,
			coalesced: escalation.coalesced,
		});
	}

	fn on_update(&self, record: &UpdateRecord) {
		if record.topic != self.config.notification_topic {
			return;
		}
		match record.kind {
			UpdateKind::Insert => {
				let notification = pushed_notification(record);
				tracing::trace!(id = %notification.id, "session.notification.pushed");
				self.notifications.lock().add(notification);
			}
			UpdateKind::Delete => {
				self.notifications.lock().remove(&record.entity_id);
			}
			UpdateKind::Update => {
				if record.row.get("read_at").is_some_and(|v| !v.is_null()) {
					self.notifications.lock().mark_read(&record.entity_id);
				}
			}
		}
	}
}

fn with_inner<T: ?Sized>(
	weak: &Weak<SessionInner>,
	f: impl Fn(&SessionInner, &T) + Send + Sync + 'static,
) -> impl Fn(&T) + Send + Sync + 'static {
	let weak = weak.clone();
	move |value: &T| {
		if let Some(inner) = weak.upgrade() {
			f(&inner, value);
		}
	}
}

/// Decodes a notification row pushed on the notification topic.
fn pushed_notification(record: &UpdateRecord) -> Notification {
	let text = |field: &str| record.row.get(field).and_then(Value::as_str).unwrap_or_default().to_string();
	let timestamp = |field: &str| {
		record
			.row
			.get(field)
			.and_then(Value::as_str)
			.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
			.map(|t| t.with_timezone(&Utc))
	};

	let mut body = text("body");
	if body.is_empty() {
		body = text("message");
	}
	Notification {
		id: record.entity_id.clone(),
		category: NotificationCategory::parse(&text("category")),
		title: text("title"),
		body,
		created_at: timestamp("created_at").unwrap_or(record.occurred_at),
		read_at: timestamp("read_at"),
	}
}
