use std::sync::Arc;

use brigade_primitives::ManualClock;
use chrono::{Duration, TimeZone};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::*;
use crate::notification::NotificationCategory;

fn at(h: u32, m: u32) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 5, 4, h, m, 0).unwrap()
}

fn aggregator(clock: &ManualClock, max_items: usize) -> NotificationAggregator {
	let config = NotificationConfig {
		max_items,
		utc_offset_minutes: 0,
	};
	NotificationAggregator::new(&config, Arc::new(clock.clone()))
}

fn note(id: &str, created_at: DateTime<Utc>) -> Notification {
	Notification::new(id, NotificationCategory::Inventory, created_at)
}

fn ids(items: &[Notification]) -> Vec<&str> {
	items.iter().map(|n| n.id.as_str()).collect()
}

#[test]
fn unread_count_tracks_each_mutation() {
	let clock = ManualClock::new(at(12, 0));
	let mut agg = aggregator(&clock, 10);

	assert!(agg.add(note("a", at(9, 0))));
	assert!(agg.add(note("b", at(10, 0))));
	assert_eq!(agg.unread_count(), 2);

	let before = agg.unread_count();
	assert!(agg.add(note("c", at(11, 0))));
	assert!(agg.mark_read("c"));
	assert_eq!(agg.unread_count(), before);
	assert_eq!(agg.get("c").and_then(|n| n.read_at), Some(at(12, 0)));

	assert!(!agg.mark_read("c"));
	assert!(!agg.mark_read("missing"));
	assert_eq!(agg.unread_count(), 2);

	assert_eq!(agg.remove("a").map(|n| n.id), Some("a".to_string()));
	assert_eq!(agg.unread_count(), 1);
	assert_eq!(agg.remove("c").map(|n| n.id), Some("c".to_string()));
	assert_eq!(agg.unread_count(), 1);

	assert_eq!(agg.mark_all_read(), 1);
	assert_eq!(agg.unread_count(), 0);
	assert_eq!(agg.mark_all_read(), 0);

	agg.clear_all();
	assert!(agg.is_empty());
	assert_eq!(agg.unread_count(), 0);
}

#[test]
fn duplicate_ids_are_ignored() {
	let clock = ManualClock::new(at(12, 0));
	let mut agg = aggregator(&clock, 10);
	assert!(agg.add(note("a", at(9, 0))));
	assert!(!agg.add(note("a", at(10, 0)).with_title("again")));
	assert_eq!(agg.len(), 1);
	assert_eq!(agg.unread_count(), 1);
	assert_eq!(agg.get("a").map(|n| n.created_at), Some(at(9, 0)));
}

#[test]
fn capacity_evicts_oldest_arrival_and_adjusts_unread() {
	let clock = ManualClock::new(at(12, 0));
	let mut agg = aggregator(&clock, 2);
	agg.add(note("a", at(9, 0)));
	agg.add(note("b", at(9, 30)));
	agg.mark_read("b");

	agg.add(note("c", at(10, 0)));
	assert_eq!(ids(&agg.items()), ["c", "b"]);
	assert_eq!(agg.unread_count(), 1);

	agg.add(note("d", at(10, 30)));
	assert_eq!(ids(&agg.items()), ["d", "c"]);
	assert_eq!(agg.unread_count(), 2);
}

#[test]
fn state_lists_newest_first() {
	let clock = ManualClock::new(at(12, 0));
	let mut agg = aggregator(&clock, 10);
	agg.add(note("late", at(11, 0)));
	agg.add(note("early", at(8, 0)));
	let state = agg.state();
	assert_eq!(ids(&state.items), ["late", "early"]);
	assert_eq!(state.unread_count, 2);
}

#[test]
fn groups_by_local_calendar_day() {
	let clock = ManualClock::new(at(12, 0));
	let mut agg = aggregator(&clock, 10);
	agg.add(note("today", at(0, 5)));
	agg.add(note("yesterday", at(0, 5) - Duration::hours(1)));
	agg.add(note("older", at(0, 5) - Duration::days(2)));

	let groups = agg.grouped_by_recency();
	assert_eq!(ids(&groups.today), ["today"]);
	assert_eq!(ids(&groups.yesterday), ["yesterday"]);
	assert_eq!(ids(&groups.older), ["older"]);
	assert_eq!(
		groups.iter().map(|(bucket, _)| bucket).collect::<Vec<_>>(),
		[Recency::Today, Recency::Yesterday, Recency::Older]
	);
}

#[test]
fn crossing_midnight_moves_items_without_touching_them() {
	let clock = ManualClock::new(at(23, 50));
	let mut agg = aggregator(&clock, 10);
	agg.add(note("n", at(23, 0)));

	assert_eq!(ids(&agg.grouped_by_recency().today), ["n"]);

	clock.advance(Duration::minutes(20));
	let groups = agg.grouped_by_recency();
	assert!(groups.today.is_empty());
	assert_eq!(ids(&groups.yesterday), ["n"]);
	assert_eq!(agg.get("n").map(|n| n.created_at), Some(at(23, 0)));

	clock.advance(Duration::days(1));
	assert_eq!(ids(&agg.grouped_by_recency().older), ["n"]);
}

#[test]
fn utc_offset_shifts_the_day_boundary() {
	let now = at(2, 0);
	let created = at(1, 0) - Duration::hours(2);
	assert_eq!(Recency::classify(created, now, Utc.fix()), Recency::Yesterday);

	let minus_five = NotificationConfig {
		max_items: 10,
		utc_offset_minutes: -300,
	}
	.offset();
	assert_eq!(Recency::classify(created, now, minus_five), Recency::Today);
	assert_eq!(Recency::classify(now + Duration::hours(1), now, minus_five), Recency::Today);
}

#[test]
fn out_of_range_offset_falls_back_to_utc() {
	let config = NotificationConfig {
		max_items: 10,
		utc_offset_minutes: 24 * 60,
	};
	assert_eq!(config.offset(), Utc.fix());
}

#[derive(Debug, Clone)]
enum Op {
	Add(u8, bool),
	MarkRead(u8),
	MarkAllRead,
	Remove(u8),
	Clear,
}

fn op() -> impl Strategy<Value = Op> {
	prop_oneof![
		6 => (0u8..12, any::<bool>()).prop_map(|(id, read)| Op::Add(id, read)),
		4 => (0u8..12).prop_map(Op::MarkRead),
		1 => Just(Op::MarkAllRead),
		2 => (0u8..12).prop_map(Op::Remove),
		1 => Just(Op::Clear),
	]
}

proptest! {
	#[test]
	fn unread_count_matches_a_full_scan(ops in prop::collection::vec(op(), 0..64)) {
		let clock = ManualClock::new(at(12, 0));
		let mut agg = aggregator(&clock, 5);
		for op in ops {
			match op {
				Op::Add(id, read) => {
					let mut n = note(&id.to_string(), at(9, 0));
					if read {
						n.read_at = Some(at(9, 1));
					}
					agg.add(n);
				}
				Op::MarkRead(id) => {
					agg.mark_read(&id.to_string());
				}
				Op::MarkAllRead => {
					agg.mark_all_read();
				}
				Op::Remove(id) => {
					agg.remove(&id.to_string());
				}
				Op::Clear => agg.clear_all(),
			}
			let scanned = agg.items().iter().filter(|n| !n.is_read()).count();
			prop_assert_eq!(agg.unread_count(), scanned);
			prop_assert!(agg.len() <= 5);
		}
	}
}
