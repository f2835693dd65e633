use brigade_primitives::SharedClock;
use chrono::{DateTime, Days, FixedOffset, Offset, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::notification::Notification;

/// Aggregator limits and day-boundary settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
	/// Oldest notifications are evicted past this count.
	pub max_items: usize,
	/// Offset from UTC of the local day used for recency buckets.
	pub utc_offset_minutes: i32,
}

impl Default for NotificationConfig {
	fn default() -> Self {
		Self {
			max_items: 200,
			utc_offset_minutes: 0,
		}
	}
}

impl NotificationConfig {
	/// The configured offset, or UTC if it is out of range.
	pub fn offset(&self) -> FixedOffset {
		self.utc_offset_minutes
			.checked_mul(60)
			.and_then(FixedOffset::east_opt)
			.unwrap_or_else(|| Utc.fix())
	}
}

/// Recency bucket of a notification relative to the local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
	Today,
	Yesterday,
	Older,
}

impl Recency {
	/// Buckets `created_at` against `now` in the local day given by `offset`.
	///
	/// Timestamps ahead of `now` count as today.
	pub fn classify(created_at: DateTime<Utc>, now: DateTime<Utc>, offset: FixedOffset) -> Self {
		let today = now.with_timezone(&offset).date_naive();
		let day = created_at.with_timezone(&offset).date_naive();
		if day >= today {
			Self::Today
		} else if today.checked_sub_days(Days::new(1)) == Some(day) {
			Self::Yesterday
		} else {
			Self::Older
		}
	}
}

/// Notifications bucketed by recency, newest first within each bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecencyGroups {
	pub today: Vec<Notification>,
	pub yesterday: Vec<Notification>,
	pub older: Vec<Notification>,
}

impl RecencyGroups {
	/// Non-empty groups in display order.
	pub fn iter(&self) -> impl Iterator<Item = (Recency, &[Notification])> {
		[
			(Recency::Today, self.today.as_slice()),
			(Recency::Yesterday, self.yesterday.as_slice()),
			(Recency::Older, self.older.as_slice()),
		]
		.into_iter()
		.filter(|(_, items)| !items.is_empty())
	}
}

/// Snapshot handed to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationState {
	/// Newest first.
	pub items: Vec<Notification>,
	pub unread_count: usize,
}

/// Notification center state.
///
/// `unread_count` is adjusted by each mutation rather than recomputed, so
/// reading the badge is O(1). Recency groups are computed against the clock
/// on every call and are never stored.
pub struct NotificationAggregator {
	/// Arrival order; the front is evicted first.
	items: IndexMap<String, Notification>,
	unread: usize,
	max_items: usize,
	offset: FixedOffset,
	clock: SharedClock,
}

impl NotificationAggregator {
	pub fn new(config: &NotificationConfig, clock: SharedClock) -> Self {
		Self {
			items: IndexMap::new(),
			unread: 0,
			max_items: config.max_items.max(1),
			offset: config.offset(),
			clock,
		}
	}

	pub fn unread_count(&self) -> usize {
		self.unread
	}

	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn get(&self, id: &str) -> Option<&Notification> {
		self.items.get(id)
	}

	/// Adds `notification`. Returns false if its id is already present.
	///
	/// At capacity the oldest arrival is evicted first.
	pub fn add(&mut self, notification: Notification) -> bool {
		if self.items.contains_key(&notification.id) {
			tracing::debug!(id = %notification.id, "notify.duplicate");
			return false;
		}
		while self.items.len() >= self.max_items {
			let Some((id, evicted)) = self.items.shift_remove_index(0) else {
				break;
			};
			if !evicted.is_read() {
				self.unread -= 1;
			}
			tracing::trace!(id = %id, "notify.evicted");
		}
		if !notification.is_read() {
			self.unread += 1;
		}
		tracing::trace!(id = %notification.id, category = notification.category.as_str(), "notify.added");
		self.items.insert(notification.id.clone(), notification);
		true
	}

	/// Marks one notification read. Returns false if it is unknown or already read.
	pub fn mark_read(&mut self, id: &str) -> bool {
		let now = self.clock.now();
		match self.items.get_mut(id) {
			Some(item) if item.read_at.is_none() => {
				item.read_at = Some(now);
				self.unread -= 1;
				true
			}
			_ => false,
		}
	}

	/// Marks every notification read and returns how many changed.
	pub fn mark_all_read(&mut self) -> usize {
		if self.unread == 0 {
			return 0;
		}
		let now = self.clock.now();
		let mut marked = 0;
		for item in self.items.values_mut().filter(|item| item.read_at.is_none()) {
			item.read_at = Some(now);
			marked += 1;
		}
		self.unread = 0;
		marked
	}

	/// Deletes one notification.
	pub fn remove(&mut self, id: &str) -> Option<Notification> {
		let removed = self.items.shift_remove(id)?;
		if !removed.is_read() {
			self.unread -= 1;
		}
		Some(removed)
	}

	/// Deletes every notification.
	pub fn clear_all(&mut self) {
		tracing::debug!(count = self.items.len(), "notify.cleared");
		self.items.clear();
		self.unread = 0;
	}

	/// All notifications, newest first.
	pub fn items(&self) -> Vec<Notification> {
		let mut items: Vec<_> = self.items.values().cloned().collect();
		items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		items
	}

	pub fn state(&self) -> NotificationState {
		NotificationState {
			items: self.items(),
			unread_count: self.unread,
		}
	}

	/// Buckets notifications against the current clock reading.
	pub fn grouped_by_recency(&self) -> RecencyGroups {
		let now = self.clock.now();
		let mut groups = RecencyGroups::default();
		for item in self.items() {
			match Recency::classify(item.created_at, now, self.offset) {
				Recency::Today => groups.today.push(item),
				Recency::Yesterday => groups.yesterday.push(item),
				Recency::Older => groups.older.push(item),
			}
		}
		groups
	}
}

#[cfg(test)]
mod tests;
