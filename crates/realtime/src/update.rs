use std::collections::BTreeMap;

use brigade_scope::ScopeKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NormalizeError;

/// Change event as delivered by the backend change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
	pub topic: String,
	#[serde(alias = "eventType", alias = "type")]
	pub operation: String,
	#[serde(default)]
	pub entity_id: Option<String>,
	#[serde(default, alias = "commit_timestamp")]
	pub occurred_at: Option<String>,
	#[serde(default, alias = "record")]
	pub new: Option<Value>,
	#[serde(default, alias = "old_record")]
	pub old: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
	Insert,
	Update,
	Delete,
}

impl UpdateKind {
	pub fn parse(operation: &str) -> Option<Self> {
		match operation.trim().to_ascii_lowercase().as_str() {
			"insert" => Some(Self::Insert),
			"update" => Some(Self::Update),
			"delete" => Some(Self::Delete),
			_ => None,
		}
	}
}

/// Before/after value of one changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
	pub before: Option<Value>,
	pub after: Option<Value>,
}

impl FieldChange {
	/// Signed numeric change, treating an absent side as zero.
	pub fn numeric_delta(&self) -> Option<f64> {
		let side = |v: &Option<Value>| match v {
			None | Some(Value::Null) => Some(0.0),
			Some(v) => v.as_f64(),
		};
		Some(side(&self.after)? - side(&self.before)?)
	}
}

/// Field-level difference between the old and new row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadDelta {
	pub fields: BTreeMap<String, FieldChange>,
}

impl PayloadDelta {
	/// Diffs two rows. Non-object rows contribute no fields.
	pub fn between(old: Option<&Value>, new: Option<&Value>) -> Self {
		let empty = serde_json::Map::new();
		let old = old.and_then(Value::as_object).unwrap_or(&empty);
		let new = new.and_then(Value::as_object).unwrap_or(&empty);

		let mut fields = BTreeMap::new();
		for name in old.keys().chain(new.keys()) {
			if fields.contains_key(name) {
				continue;
			}
			let before = old.get(name);
			let after = new.get(name);
			if before != after {
				fields.insert(
					name.clone(),
					FieldChange {
						before: before.cloned(),
						after: after.cloned(),
					},
				);
			}
		}
		Self { fields }
	}

	pub fn get(&self, field: &str) -> Option<&FieldChange> {
		self.fields.get(field)
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

/// Normalized change event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRecord {
	pub scope: ScopeKey,
	pub topic: String,
	pub entity_id: String,
	pub kind: UpdateKind,
	pub occurred_at: DateTime<Utc>,
	pub delta: PayloadDelta,
	/// Current row: the new row for inserts and updates, the old row for deletes.
	pub row: Value,
}

impl UpdateRecord {
	/// Normalizes `raw` received on the channel for `scope`.
	///
	/// The entity id falls back to the row's `id` field and the timestamp to
	/// `received_at`.
	///
	/// # Errors
	///
	/// Fails on unknown operations, missing entity ids and unparseable timestamps.
	pub fn normalize(scope: &ScopeKey, raw: RawPayload, received_at: DateTime<Utc>) -> Result<Self, NormalizeError> {
		let kind = UpdateKind::parse(&raw.operation).ok_or_else(|| NormalizeError::UnknownOperation(raw.operation.clone()))?;

		let entity_id = raw
			.entity_id
			.clone()
			.or_else(|| row_id(raw.new.as_ref()))
			.or_else(|| row_id(raw.old.as_ref()))
			.ok_or(NormalizeError::MissingEntityId)?;

		let occurred_at = match &raw.occurred_at {
			None => received_at,
			Some(value) => DateTime::parse_from_rfc3339(value)
				.map_err(|e| NormalizeError::InvalidTimestamp {
					value: value.clone(),
					reason: e.to_string(),
				})?
				.with_timezone(&Utc),
		};

		let delta = match kind {
			UpdateKind::Insert => PayloadDelta::between(None, raw.new.as_ref()),
			UpdateKind::Update => PayloadDelta::between(raw.old.as_ref(), raw.new.as_ref()),
			UpdateKind::Delete => PayloadDelta::between(raw.old.as_ref(), None),
		};

		let row = match kind {
			UpdateKind::Delete => raw.old.or(raw.new),
			_ => raw.new.or(raw.old),
		}
		.unwrap_or(Value::Null);

		Ok(Self {
			scope: scope.clone(),
			topic: raw.topic,
			entity_id,
			kind,
			occurred_at,
			delta,
			row,
		})
	}
}

fn row_id(row: Option<&Value>) -> Option<String> {
	match row?.get("id")? {
		Value::String(s) => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use brigade_scope::ScopeLevel;
	use chrono::TimeZone;
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	fn key() -> ScopeKey {
		ScopeKey::new(ScopeLevel::Store, "s1")
	}

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap()
	}

	#[test]
	fn normalizes_update_with_field_delta() {
		let raw: RawPayload = serde_json::from_value(json!({
			"topic": "inventory",
			"eventType": "UPDATE",
			"commit_timestamp": "2026-05-04T09:29:58Z",
			"new": {"id": 42, "sku": "flour", "quantity": 12},
			"old": {"id": 42, "sku": "flour", "quantity": 30}
		}))
		.unwrap();

		let record = UpdateRecord::normalize(&key(), raw, now()).unwrap();
		assert_eq!(record.entity_id, "42");
		assert_eq!(record.kind, UpdateKind::Update);
		assert_eq!(record.occurred_at, Utc.with_ymd_and_hms(2026, 5, 4, 9, 29, 58).unwrap());
		assert_eq!(record.delta.fields.keys().collect::<Vec<_>>(), ["quantity"]);
		assert_eq!(record.delta.get("quantity").and_then(FieldChange::numeric_delta), Some(-18.0));
		assert_eq!(record.row["sku"], "flour");
	}

	#[test]
	fn insert_and_delete_diff_against_nothing() {
		let insert = RawPayload {
			topic: "inventory".into(),
			operation: "insert".into(),
			entity_id: Some("row-1".into()),
			occurred_at: None,
			new: Some(json!({"quantity": 5})),
			old: None,
		};
		let record = UpdateRecord::normalize(&key(), insert, now()).unwrap();
		assert_eq!(record.occurred_at, now());
		assert_eq!(record.delta.get("quantity").and_then(FieldChange::numeric_delta), Some(5.0));

		let delete = RawPayload {
			topic: "inventory".into(),
			operation: "DELETE".into(),
			entity_id: None,
			occurred_at: None,
			new: None,
			old: Some(json!({"id": "row-2", "quantity": 7})),
		};
		let record = UpdateRecord::normalize(&key(), delete, now()).unwrap();
		assert_eq!(record.entity_id, "row-2");
		assert_eq!(record.delta.get("quantity").and_then(FieldChange::numeric_delta), Some(-7.0));
		assert_eq!(record.row["id"], "row-2");
	}

	#[test]
	fn rejects_malformed_events() {
		let base = RawPayload {
			topic: "inventory".into(),
			operation: "update".into(),
			entity_id: None,
			occurred_at: None,
			new: Some(json!({"quantity": 1})),
			old: None,
		};
		assert_eq!(UpdateRecord::normalize(&key(), base.clone(), now()), Err(NormalizeError::MissingEntityId));

		let truncate = RawPayload {
			operation: "truncate".into(),
			..base.clone()
		};
		assert!(matches!(UpdateRecord::normalize(&key(), truncate, now()), Err(NormalizeError::UnknownOperation(_))));

		let bad_time = RawPayload {
			entity_id: Some("x".into()),
			occurred_at: Some("yesterday".into()),
			..base
		};
		assert!(matches!(UpdateRecord::normalize(&key(), bad_time, now()), Err(NormalizeError::InvalidTimestamp { .. })));
	}

	#[test]
	fn non_numeric_change_has_no_numeric_delta() {
		let change = FieldChange {
			before: Some(json!("a")),
			after: Some(json!("b")),
		};
		assert_eq!(change.numeric_delta(), None);
	}
}
