use std::collections::VecDeque;

use brigade_primitives::{ObserverList, SharedClock, Subscription};
use brigade_scope::ScopeKey;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::update::{FieldChange, RawPayload, UpdateRecord};

/// Threshold on the absolute numeric change of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceRule {
	/// Topic the rule applies to; `None` matches every topic.
	#[serde(default)]
	pub topic: Option<String>,
	pub field: String,
	pub min_abs_delta: f64,
}

/// Decides which updates are escalated to the user.
///
/// Every update reaches the raw update bus. An update is escalated when
/// any rule matches; escalations for the same scope and entity inside
/// `escalation_cooldown_ms` are coalesced into the first one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignificancePolicy {
	pub rules: Vec<SignificanceRule>,
	pub escalation_cooldown_ms: u64,
}

impl Default for SignificancePolicy {
	fn default() -> Self {
		Self {
			rules: vec![SignificanceRule {
				topic: None,
				field: "quantity".to_string(),
				min_abs_delta: 10.0,
			}],
			escalation_cooldown_ms: 5_000,
		}
	}
}

impl SignificancePolicy {
	/// First rule matched by `record`, with the change that matched it.
	pub fn evaluate<'a>(&'a self, record: &UpdateRecord) -> Option<(&'a SignificanceRule, f64)> {
		self.rules.iter().find_map(|rule| {
			if rule.topic.as_deref().is_some_and(|topic| topic != record.topic) {
				return None;
			}
			let delta = record.delta.get(&rule.field).and_then(FieldChange::numeric_delta)?;
			(delta.abs() >= rule.min_abs_delta).then_some((rule, delta))
		})
	}

	fn cooldown(&self) -> Duration {
		Duration::milliseconds(i64::try_from(self.escalation_cooldown_ms).unwrap_or(i64::MAX))
	}
}

/// Update that passed the significance filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Escalation {
	pub record: UpdateRecord,
	pub field: String,
	pub delta: f64,
	/// Escalations folded into this one during the previous cooldown window.
	pub coalesced: u32,
}

/// What happened to one raw event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// The event could not be normalized and was dropped.
	Rejected,
	/// Delivered to the raw update bus only.
	Recorded,
	/// Delivered and escalated.
	Escalated,
	/// Delivered; its escalation was folded into a recent one.
	Coalesced,
}

struct EscalationWindow {
	started: DateTime<Utc>,
	suppressed: u32,
}

struct DispatchState {
	recent: VecDeque<UpdateRecord>,
	last_synced: FxHashMap<ScopeKey, DateTime<Utc>>,
	windows: FxHashMap<(ScopeKey, String), EscalationWindow>,
}

/// Normalizes raw channel events and fans them out.
///
/// Delivery is synchronous and in call order, so events from one channel
/// reach observers in arrival order. No lock is held while observers run.
/// Panicking observers are isolated by [`ObserverList`]. Async consumers
/// that must not slow delivery down use [`Self::stream`], whose receivers
/// lag instead of blocking.
pub struct UpdateDispatcher {
	policy: SignificancePolicy,
	clock: SharedClock,
	capacity: usize,
	state: Mutex<DispatchState>,
	updates: ObserverList<UpdateRecord>,
	escalations: ObserverList<Escalation>,
	stream: broadcast::Sender<UpdateRecord>,
}

impl UpdateDispatcher {
	/// Creates a dispatcher keeping the last `recent_capacity` updates.
	pub fn new(policy: SignificancePolicy, recent_capacity: usize, clock: SharedClock) -> Self {
		let capacity = recent_capacity.max(1);
		let (stream, _) = broadcast::channel(capacity.max(16));
		Self {
			policy,
			clock,
			capacity,
			state: Mutex::new(DispatchState {
				recent: VecDeque::with_capacity(capacity),
				last_synced: FxHashMap::default(),
				windows: FxHashMap::default(),
			}),
			updates: ObserverList::new("realtime.updates"),
			escalations: ObserverList::new("realtime.escalations"),
			stream,
		}
	}

	pub fn policy(&self) -> &SignificancePolicy {
		&self.policy
	}

	/// Registers an observer on the raw update bus.
	#[must_use = "dropping the subscription unsubscribes the observer"]
	pub fn subscribe(&self, observer: impl Fn(&UpdateRecord) + Send + Sync + 'static) -> Subscription {
		self.updates.subscribe(observer)
	}

	/// Registers an observer for escalated updates.
	#[must_use = "dropping the subscription unsubscribes the observer"]
	pub fn subscribe_escalations(&self, observer: impl Fn(&Escalation) + Send + Sync + 'static) -> Subscription {
		self.escalations.subscribe(observer)
	}

	/// Non-blocking stream of every accepted update.
	pub fn stream(&self) -> broadcast::Receiver<UpdateRecord> {
		self.stream.subscribe()
	}

	/// Most recent updates, oldest first.
	pub fn recent(&self) -> Vec<UpdateRecord> {
		self.state.lock().recent.iter().cloned().collect()
	}

	/// Receipt time of the last update on `key`.
	pub fn last_synced(&self, key: &ScopeKey) -> Option<DateTime<Utc>> {
		self.state.lock().last_synced.get(key).copied()
	}

	/// Normalizes and delivers one raw event received on channel `key`.
	pub fn on_raw_event(&self, key: &ScopeKey, raw: RawPayload) -> DispatchOutcome {
		let now = self.clock.now();
		let record = match UpdateRecord::normalize(key, raw, now) {
			Ok(record) => record,
			Err(err) => {
				tracing::warn!(scope = %key, error = %err, "realtime.update.rejected");
				return DispatchOutcome::Rejected;
			}
		};

		let significance = self.policy.evaluate(&record).map(|(rule, delta)| (rule.field.clone(), delta));

		let coalesced = {
			let mut state = self.state.lock();
			if state.recent.len() == self.capacity {
				state.recent.pop_front();
			}
			state.recent.push_back(record.clone());
			state.last_synced.insert(key.clone(), now);

			significance.as_ref().map(|_| self.enter_window(&mut state, &record, now))
		};

		tracing::trace!(scope = %key, entity = %record.entity_id, kind = ?record.kind, "realtime.update");
		self.updates.notify(&record);
		let _ = self.stream.send(record.clone());

		match (significance, coalesced) {
			(Some((field, delta)), Some(Window::Opened { suppressed })) => {
				tracing::debug!(scope = %key, entity = %record.entity_id, field = %field, delta, "realtime.update.escalated");
				self.escalations.notify(&Escalation {
					record,
					field,
					delta,
					coalesced: suppressed,
				});
				DispatchOutcome::Escalated
			}
			(Some(_), Some(Window::Joined)) => DispatchOutcome::Coalesced,
			_ => DispatchOutcome::Recorded,
		}
	}

	fn enter_window(&self, state: &mut DispatchState, record: &UpdateRecord, now: DateTime<Utc>) -> Window {
		let cooldown = self.policy.cooldown();
		let window_key = (record.scope.clone(), record.entity_id.clone());
		match state.windows.get_mut(&window_key) {
			Some(window) if now - window.started < cooldown => {
				window.suppressed = window.suppressed.saturating_add(1);
				Window::Joined
			}
			Some(window) => {
				let suppressed = std::mem::take(&mut window.suppressed);
				window.started = now;
				Window::Opened { suppressed }
			}
			None => {
				// Expired windows with nothing to carry are dropped before a new one opens.
				state.windows.retain(|_, window| window.suppressed > 0 || now - window.started < cooldown);
				state.windows.insert(window_key, EscalationWindow { started: now, suppressed: 0 });
				Window::Opened { suppressed: 0 }
			}
		}
	}
}

enum Window {
	Opened { suppressed: u32 },
	Joined,
}

#[cfg(test)]
mod tests;
