//! Schema-directed bulk list decoding (spec §4.D).
//!
//! Bulk list payloads (roommates, cams, friends, ignores, tags) arrive as a
//! JSON array whose first element is a *schema* describing how to read the
//! records that follow: either a bare property name (a single top-level
//! slot) or `{"bag": [...]}` (a nested sub-bag spanning several slots).
//! Each record is itself an array of values, positionally aligned against
//! the schema flattened into slots — or, already a structured object, in
//! which case it's passed through unchanged.

use crate::value::{ModelSessionState, SessionValue};
use serde_json::Value;
use tracing::debug;

/// One decoded record: a flat or nested session-state fragment, keyed by
/// `uid`/`sid` the same way `Packet::about_model` expects.
pub type ListRecord = ModelSessionState;

#[derive(Debug, Clone)]
enum Slot {
    Prop(String),
    Bag(String, Vec<String>),
}

/// Flatten a schema descriptor array into slots, in order.
fn parse_schema(schema: &[Value]) -> Vec<Slot> {
    schema
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(Slot::Prop(name.clone())),
            Value::Object(map) => {
                let bag_name = map.keys().next()?.clone();
                let props = map
                    .get(&bag_name)?
                    .as_array()?
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                Some(Slot::Bag(bag_name, props))
            }
            _ => None,
        })
        .collect()
}

fn slot_count(slots: &[Slot]) -> usize {
    slots
        .iter()
        .map(|s| match s {
            Slot::Prop(_) => 1,
            Slot::Bag(_, props) => props.len(),
        })
        .sum()
}

/// Build one record from a flat value array aligned to the flattened slots.
///
/// Extra trailing values are ignored (debug-logged); a short record simply
/// leaves the remaining slots unset, matching the wire's "fewer than
/// advertised" tolerance (spec §4.D, edge cases).
fn record_from_values(slots: &[Slot], values: &[Value]) -> ListRecord {
    let mut record = ModelSessionState::new();
    let mut cursor = 0usize;

    for slot in slots {
        match slot {
            Slot::Prop(name) => {
                if let Some(v) = values.get(cursor) {
                    record.set(name.clone(), SessionValue::from(v.clone()));
                }
                cursor += 1;
            }
            Slot::Bag(name, props) => {
                let mut bag = ModelSessionState::new();
                for prop in props {
                    if let Some(v) = values.get(cursor) {
                        bag.set(prop.clone(), SessionValue::from(v.clone()));
                    }
                    cursor += 1;
                }
                record.set(name.clone(), SessionValue::Bag(bag));
            }
        }
    }

    if values.len() > cursor {
        debug!(
            extra = values.len() - cursor,
            "list record carried more values than the schema has slots"
        );
    }

    record
}

/// Decode a bulk list payload: `[schema, record, record, ...]`.
///
/// A record that is already a JSON object is passed through as a
/// structured bag unchanged, rather than positionally decoded — servers
/// occasionally mix pre-structured and schema-encoded records in the same
/// list.
pub fn decode_list(payload: &Value) -> Vec<ListRecord> {
    let Some(items) = payload.as_array() else {
        return Vec::new();
    };
    let Some((schema_value, records)) = items.split_first() else {
        return Vec::new();
    };
    let Some(schema_array) = schema_value.as_array() else {
        return Vec::new();
    };

    let slots = parse_schema(schema_array);
    let expected = slot_count(&slots);

    records
        .iter()
        .map(|record| match record {
            Value::Object(_) => match SessionValue::from(record.clone()) {
                SessionValue::Bag(bag) => bag,
                _ => ModelSessionState::new(),
            },
            Value::Array(values) => {
                if values.len() < expected {
                    debug!(
                        got = values.len(),
                        expected, "list record shorter than schema slots"
                    );
                }
                record_from_values(&slots, values)
            }
            _ => ModelSessionState::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_flat_schema() {
        let payload = json!([
            ["uid", "nm"],
            [1, "alice"],
            [2, "bob"],
        ]);
        let records = decode_list(&payload);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("uid").and_then(SessionValue::as_i64), Some(1));
        assert_eq!(records[1].get("nm").and_then(SessionValue::as_str), Some("bob"));
    }

    #[test]
    fn decodes_nested_bag_schema() {
        let payload = json!([
            ["uid", {"m": ["lv", "vs"]}],
            [1, 4, 90],
        ]);
        let records = decode_list(&payload);
        assert_eq!(records.len(), 1);
        let bag = records[0].bag("m").expect("m bag present");
        assert_eq!(bag.get("lv").and_then(SessionValue::as_i64), Some(4));
        assert_eq!(bag.get("vs").and_then(SessionValue::as_i64), Some(90));
    }

    #[test]
    fn short_record_leaves_trailing_slots_unset() {
        let payload = json!([
            ["uid", "nm", "lv"],
            [1, "alice"],
        ]);
        let records = decode_list(&payload);
        assert_eq!(records[0].get("uid").and_then(SessionValue::as_i64), Some(1));
        assert!(records[0].get("lv").is_none());
    }

    #[test]
    fn long_record_ignores_extra_values() {
        let payload = json!([
            ["uid"],
            [1, "extra", "more"],
        ]);
        let records = decode_list(&payload);
        assert_eq!(records[0].get("uid").and_then(SessionValue::as_i64), Some(1));
    }

    #[test]
    fn pre_structured_record_passes_through() {
        let payload = json!([
            ["uid", "nm"],
            {"uid": 9, "nm": "carol"},
        ]);
        let records = decode_list(&payload);
        assert_eq!(records[0].get("uid").and_then(SessionValue::as_i64), Some(9));
        assert_eq!(records[0].get("nm").and_then(SessionValue::as_str), Some("carol"));
    }
}
