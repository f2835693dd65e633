//! Notification aggregation.
//!
//! [`NotificationAggregator`] holds the notifications shown in the
//! notification center, keeps the unread badge count current on every
//! mutation, and buckets items into today / yesterday / older when asked.

/// Aggregator state and recency grouping.
pub mod aggregator;
/// Notification records.
pub mod notification;

pub use aggregator::{NotificationAggregator, NotificationConfig, NotificationState, Recency, RecencyGroups};
pub use notification::{Notification, NotificationCategory};
