use std::path::Path;

use brigade_notify::NotificationConfig;
use brigade_realtime::{ReconnectPolicy, SignificancePolicy};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest UTC offset accepted for day bucketing, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Session configuration, usually read from TOML.
///
/// ```toml
/// topics = ["inventory", "notifications"]
/// recent_updates = 50
///
/// [reconnect]
/// base_delay_ms = 500
/// max_delay_ms = 30000
///
/// [[significance.rules]]
/// field = "quantity"
/// min_abs_delta = 10.0
///
/// [notifications]
/// utc_offset_minutes = -300
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Topics every channel subscribes to.
	pub topics: Vec<String>,
	/// Topic whose inserts are server-pushed notifications.
	pub notification_topic: String,
	pub reconnect: ReconnectPolicy,
	pub significance: SignificancePolicy,
	/// Capacity of the recent-update ring buffer.
	pub recent_updates: usize,
	pub notifications: NotificationConfig,
	/// Capacity of the channel status broadcast.
	pub status_buffer: usize,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			topics: vec!["inventory".to_string(), "notifications".to_string()],
			notification_topic: "notifications".to_string(),
			reconnect: ReconnectPolicy::default(),
			significance: SignificancePolicy::default(),
			recent_updates: 50,
			notifications: NotificationConfig::default(),
			status_buffer: 64,
		}
	}
}

impl SessionConfig {
	/// Parses and validates a TOML document.
	pub fn parse(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::parse(&content)
	}

	/// Checks value ranges.
	///
	/// # Errors
	///
	/// Returns [`ConfigError::Invalid`] naming the first offending field.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |msg: String| Err(ConfigError::Invalid(msg));

		if self.topics.is_empty() || self.topics.iter().any(|t| t.trim().is_empty()) {
			return invalid("topics must be a non-empty list of non-empty names".into());
		}
		if !self.topics.contains(&self.notification_topic) {
			return invalid(format!("notification_topic {:?} is not in topics", self.notification_topic));
		}

		let r = &self.reconnect;
		if r.base_delay_ms == 0 {
			return invalid("reconnect.base_delay_ms must be positive".into());
		}
		if r.base_delay_ms > r.max_delay_ms {
			return invalid(format!(
				"reconnect.base_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
				r.base_delay_ms, r.max_delay_ms
			));
		}
		if !(0.0..=1.0).contains(&r.jitter) {
			return invalid(format!("reconnect.jitter must be within [0, 1], got {}", r.jitter));
		}
		if r.max_consecutive_failures == 0 {
			return invalid("reconnect.max_consecutive_failures must be positive".into());
		}

		for rule in &self.significance.rules {
			if rule.field.trim().is_empty() {
				return invalid("significance rule has an empty field name".into());
			}
			if !rule.min_abs_delta.is_finite() || rule.min_abs_delta < 0.0 {
				return invalid(format!("significance rule for {:?} has invalid min_abs_delta", rule.field));
			}
		}

		if self.recent_updates == 0 {
			return invalid("recent_updates must be positive".into());
		}
		if self.notifications.max_items == 0 {
			return invalid("notifications.max_items must be positive".into());
		}
		if self.notifications.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
			return invalid(format!(
				"notifications.utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {}",
				self.notifications.utc_offset_minutes
			));
		}
		if self.status_buffer == 0 {
			return invalid("status_buffer must be positive".into());
		}
		Ok(())
	}
}
