use std::sync::Arc;

use brigade_primitives::ManualClock;
use brigade_scope::ScopeLevel;
use chrono::TimeZone;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

fn start() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
}

fn store(id: &str) -> ScopeKey {
	ScopeKey::new(ScopeLevel::Store, id)
}

fn quantity_change(entity: &str, before: i64, after: i64) -> RawPayload {
	RawPayload {
		topic: "inventory".into(),
		operation: "UPDATE".into(),
		entity_id: Some(entity.into()),
		occurred_at: None,
		new: Some(json!({"quantity": after})),
		old: Some(json!({"quantity": before})),
	}
}

fn dispatcher(clock: &ManualClock, capacity: usize) -> UpdateDispatcher {
	UpdateDispatcher::new(SignificancePolicy::default(), capacity, Arc::new(clock.clone()))
}

#[test]
fn every_update_is_delivered_but_only_significant_ones_escalate() {
	let clock = ManualClock::new(start());
	let d = dispatcher(&clock, 8);
	let updates = Arc::new(Mutex::new(Vec::new()));
	let escalations = Arc::new(Mutex::new(Vec::new()));

	let u = Arc::clone(&updates);
	let _sub = d.subscribe(move |r| u.lock().push(r.entity_id.clone()));
	let e = Arc::clone(&escalations);
	let _esc = d.subscribe_escalations(move |x| e.lock().push((x.record.entity_id.clone(), x.delta)));

	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("flour", 30, 25)), DispatchOutcome::Recorded);
	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("sugar", 30, 12)), DispatchOutcome::Escalated);
	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("salt", 0, 10)), DispatchOutcome::Escalated);

	assert_eq!(*updates.lock(), ["flour", "sugar", "salt"]);
	assert_eq!(*escalations.lock(), [("sugar".to_string(), -18.0), ("salt".to_string(), 10.0)]);
}

#[test]
fn malformed_events_are_rejected_without_delivery() {
	let clock = ManualClock::new(start());
	let d = dispatcher(&clock, 8);
	let hits = Arc::new(Mutex::new(0));
	let h = Arc::clone(&hits);
	let _sub = d.subscribe(move |_| *h.lock() += 1);

	let mut raw = quantity_change("flour", 1, 2);
	raw.operation = "truncate".into();
	assert_eq!(d.on_raw_event(&store("s1"), raw), DispatchOutcome::Rejected);
	assert_eq!(*hits.lock(), 0);
	assert!(d.recent().is_empty());
	assert_eq!(d.last_synced(&store("s1")), None);
}

#[test]
fn panicking_observer_does_not_block_others() {
	let clock = ManualClock::new(start());
	let d = dispatcher(&clock, 8);
	let seen = Arc::new(Mutex::new(Vec::new()));

	let _bad = d.subscribe(|_| panic!("observer failure"));
	let s = Arc::clone(&seen);
	let _good = d.subscribe(move |r| s.lock().push(r.entity_id.clone()));

	d.on_raw_event(&store("s1"), quantity_change("a", 0, 1));
	d.on_raw_event(&store("s1"), quantity_change("b", 0, 1));
	assert_eq!(*seen.lock(), ["a", "b"]);
}

#[test]
fn recent_history_is_bounded_and_tracks_last_sync() {
	let clock = ManualClock::new(start());
	let d = dispatcher(&clock, 3);

	for (i, entity) in ["a", "b", "c", "d"].into_iter().enumerate() {
		clock.advance(Duration::seconds(1));
		let key = if i % 2 == 0 { store("s1") } else { store("s2") };
		d.on_raw_event(&key, quantity_change(entity, 0, 1));
	}

	let recent: Vec<_> = d.recent().into_iter().map(|r| r.entity_id).collect();
	assert_eq!(recent, ["b", "c", "d"]);
	assert_eq!(d.last_synced(&store("s1")), Some(start() + Duration::seconds(3)));
	assert_eq!(d.last_synced(&store("s2")), Some(start() + Duration::seconds(4)));
}

#[test]
fn repeated_escalations_for_one_entity_are_coalesced() {
	let clock = ManualClock::new(start());
	let d = dispatcher(&clock, 8);
	let escalations = Arc::new(Mutex::new(Vec::new()));
	let e = Arc::clone(&escalations);
	let _esc = d.subscribe_escalations(move |x| e.lock().push(x.coalesced));

	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("flour", 50, 30)), DispatchOutcome::Escalated);
	clock.advance(Duration::seconds(1));
	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("flour", 30, 10)), DispatchOutcome::Coalesced);
	assert_eq!(d.on_raw_event(&store("s2"), quantity_change("flour", 30, 10)), DispatchOutcome::Escalated);
	clock.advance(Duration::seconds(2));
	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("flour", 10, 0)), DispatchOutcome::Coalesced);

	clock.advance(Duration::seconds(5));
	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("flour", 100, 0)), DispatchOutcome::Escalated);
	assert_eq!(*escalations.lock(), [0, 0, 2]);
}

#[test]
fn expired_windows_are_pruned_unless_they_carry_a_count() {
	let clock = ManualClock::new(start());
	let d = dispatcher(&clock, 8);
	let escalations = Arc::new(Mutex::new(Vec::new()));
	let e = Arc::clone(&escalations);
	let _esc = d.subscribe_escalations(move |x| e.lock().push((x.record.entity_id.clone(), x.coalesced)));

	d.on_raw_event(&store("s1"), quantity_change("flour", 50, 30));
	d.on_raw_event(&store("s1"), quantity_change("sugar", 50, 30));
	clock.advance(Duration::seconds(1));
	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("sugar", 30, 10)), DispatchOutcome::Coalesced);
	assert_eq!(d.state.lock().windows.len(), 2);

	clock.advance(Duration::seconds(6));
	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("eggs", 40, 0)), DispatchOutcome::Escalated);
	let mut open: Vec<_> = d.state.lock().windows.keys().map(|(_, entity)| entity.clone()).collect();
	open.sort();
	assert_eq!(open, ["eggs", "sugar"]);

	assert_eq!(d.on_raw_event(&store("s1"), quantity_change("sugar", 10, 40)), DispatchOutcome::Escalated);
	assert_eq!(escalations.lock().last(), Some(&("sugar".to_string(), 1)));
}

#[test]
fn topic_scoped_rules_only_match_their_topic() {
	let clock = ManualClock::new(start());
	let policy = SignificancePolicy {
		rules: vec![SignificanceRule {
			topic: Some("orders".into()),
			field: "total".into(),
			min_abs_delta: 100.0,
		}],
		escalation_cooldown_ms: 0,
	};
	let d = UpdateDispatcher::new(policy, 8, Arc::new(clock));

	let mut order = quantity_change("o1", 0, 0);
	order.topic = "orders".into();
	order.new = Some(json!({"total": 250}));
	order.old = Some(json!({"total": 20}));
	assert_eq!(d.on_raw_event(&store("s1"), order.clone()), DispatchOutcome::Escalated);
	assert_eq!(d.on_raw_event(&store("s1"), order.clone()), DispatchOutcome::Escalated);

	order.topic = "inventory".into();
	assert_eq!(d.on_raw_event(&store("s1"), order), DispatchOutcome::Recorded);
}

#[tokio::test]
async fn stream_receives_accepted_updates() {
	let clock = ManualClock::new(start());
	let d = dispatcher(&clock, 8);
	let mut rx = d.stream();
	d.on_raw_event(&store("s1"), quantity_change("flour", 1, 2));
	let record = rx.recv().await.unwrap();
	assert_eq!(record.entity_id, "flour");
	assert_eq!(record.scope, store("s1"));
}
