use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
	Inventory,
	Order,
	Staff,
	System,
	#[default]
	Other,
}

impl NotificationCategory {
	/// Parses a category name, case-insensitively. Unknown names map to [`Self::Other`].
	pub fn parse(name: &str) -> Self {
		match name.trim().to_ascii_lowercase().as_str() {
			"inventory" | "stock" => Self::Inventory,
			"order" | "orders" => Self::Order,
			"staff" | "schedule" => Self::Staff,
			"system" => Self::System,
			_ => Self::Other,
		}
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Inventory => "inventory",
			Self::Order => "order",
			Self::Staff => "staff",
			Self::System => "system",
			Self::Other => "other",
		}
	}
}

/// One entry in the notification center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
	pub id: String,
	#[serde(default)]
	pub category: NotificationCategory,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub body: String,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
	/// Unread notification created at `created_at`.
	pub fn new(id: impl Into<String>, category: NotificationCategory, created_at: DateTime<Utc>) -> Self {
		Self {
			id: id.into(),
			category,
			title: String::new(),
			body: String::new(),
			created_at,
			read_at: None,
		}
	}

	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = title.into();
		self
	}

	pub fn with_body(mut self, body: impl Into<String>) -> Self {
		self.body = body.into();
		self
	}

	pub fn is_read(&self) -> bool {
		self.read_at.is_some()
	}
}
