//! Session state value universe and the `ModelSessionState` bag (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One value in a `ModelSessionState` bag: integer, float, bool, string, or a
/// nested mapping (spec §3, "value universe").
///
/// Represented as an explicit tagged union rather than `serde_json::Value` so
/// that known fields get typed accessors while unknown keys still pass
/// through losslessly (spec §9, "dynamic payload typing").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bag(ModelSessionState),
}

impl SessionValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SessionValue::Int(v) => Some(*v),
            SessionValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SessionValue::Int(v) => Some(*v as f64),
            SessionValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_bag(&self) -> Option<&ModelSessionState> {
        match self {
            SessionValue::Bag(b) => Some(b),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for SessionValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Bool(b) => SessionValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SessionValue::Int(i)
                } else {
                    SessionValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => SessionValue::Str(s),
            serde_json::Value::Object(map) => {
                let mut bag = ModelSessionState::new();
                for (k, v) in map {
                    bag.set(k, SessionValue::from(v));
                }
                SessionValue::Bag(bag)
            }
            // Arrays and null have no slot in the value universe; stringify
            // rather than drop the information on the floor.
            other => SessionValue::Str(other.to_string()),
        }
    }
}

/// A mapping from property name to [`SessionValue`] — one snapshot of a
/// session (spec §3, `ModelSessionState`).
///
/// Keys are kept in a `BTreeMap` purely for deterministic iteration in tests
/// (spec §8 invariant 1 requires merge order-independence, not a specific
/// iteration order, but deterministic snapshots make that easy to assert).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSessionState(BTreeMap<String, SessionValue>);

impl ModelSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&SessionValue> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: SessionValue) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SessionValue)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // -- typed accessors for the well-known top-level fields (spec §3) --

    pub fn sid(&self) -> i64 {
        self.get("sid").and_then(SessionValue::as_i64).unwrap_or(0)
    }

    pub fn uid(&self) -> i64 {
        self.get("uid").and_then(SessionValue::as_i64).unwrap_or(0)
    }

    pub fn lv(&self) -> Option<i64> {
        self.get("lv").and_then(SessionValue::as_i64)
    }

    pub fn nm(&self) -> Option<&str> {
        self.get("nm").and_then(SessionValue::as_str)
    }

    /// `vs` (video state). Absent is "unknown", never "offline" (spec §3
    /// invariant). Returns `None` when absent, distinct from
    /// `Some(VideoState::Offline)`.
    pub fn vs(&self) -> Option<i64> {
        self.get("vs").and_then(SessionValue::as_i64)
    }

    pub fn camscore(&self) -> i64 {
        self.get("camscore")
            .and_then(SessionValue::as_i64)
            .unwrap_or(0)
    }

    pub fn bag(&self, name: &str) -> Option<&ModelSessionState> {
        self.get(name).and_then(SessionValue::as_bag)
    }

    /// Field-by-field overlay of `incoming` onto `self` (spec §4.C step 3).
    ///
    /// Nested bags (`m`, `u`, `s`, `x`) are overlaid key-by-key rather than
    /// replaced wholesale; scalar writes overwrite. There is no wire
    /// representation of "delete this field" — every key present in
    /// `incoming` overwrites, keys absent from `incoming` are left alone.
    ///
    /// Returns the set of top-level property names whose effective value
    /// changed, for change-event emission by the caller.
    pub fn overlay(&mut self, incoming: &ModelSessionState) -> Vec<String> {
        const NESTED_BAGS: &[&str] = &["m", "u", "s", "x"];
        let mut changed = Vec::new();

        for (key, value) in incoming.iter() {
            if NESTED_BAGS.contains(&key.as_str()) {
                if let SessionValue::Bag(incoming_bag) = value {
                    let mut existing = self
                        .get(key)
                        .and_then(SessionValue::as_bag)
                        .cloned()
                        .unwrap_or_default();
                    let nested_changed = existing.overlay(incoming_bag);
                    if !nested_changed.is_empty() {
                        self.set(key.clone(), SessionValue::Bag(existing));
                        changed.push(key.clone());
                    }
                    continue;
                }
            }
            let prev = self.get(key);
            if prev != Some(value) {
                self.set(key.clone(), value.clone());
                changed.push(key.clone());
            }
        }

        changed
    }
}

impl FromIterator<(String, SessionValue)> for ModelSessionState {
    fn from_iter<T: IntoIterator<Item = (String, SessionValue)>>(iter: T) -> Self {
        let mut bag = ModelSessionState::new();
        for (k, v) in iter {
            bag.set(k, v);
        }
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_overwrites_scalars_and_reports_changes() {
        let mut base = ModelSessionState::new();
        base.set("vs", SessionValue::Int(0));
        base.set("camscore", SessionValue::Int(50));

        let mut incoming = ModelSessionState::new();
        incoming.set("camscore", SessionValue::Int(60));

        let changed = base.overlay(&incoming);
        assert_eq!(changed, vec!["camscore".to_string()]);
        assert_eq!(base.camscore(), 60);
        assert_eq!(base.vs(), Some(0));
    }

    #[test]
    fn overlay_merges_nested_bags_key_by_key() {
        let mut base = ModelSessionState::new();
        let mut m = ModelSessionState::new();
        m.set("rc", SessionValue::Int(3));
        m.set("topic", SessionValue::Str("hello".into()));
        base.set("m", SessionValue::Bag(m));

        let mut incoming = ModelSessionState::new();
        let mut m2 = ModelSessionState::new();
        m2.set("rc", SessionValue::Int(7));
        incoming.set("m", SessionValue::Bag(m2));

        let changed = base.overlay(&incoming);
        assert_eq!(changed, vec!["m".to_string()]);
        let m = base.bag("m").unwrap();
        assert_eq!(m.get("rc").unwrap().as_i64(), Some(7));
        assert_eq!(m.get("topic").unwrap().as_str(), Some("hello"));
    }

    #[test]
    fn overlay_with_no_changes_reports_nothing() {
        let mut base = ModelSessionState::new();
        base.set("nm", SessionValue::Str("alice".into()));
        let mut incoming = ModelSessionState::new();
        incoming.set("nm", SessionValue::Str("alice".into()));
        assert!(base.overlay(&incoming).is_empty());
    }

    #[test]
    fn unknown_keys_round_trip() {
        let mut base = ModelSessionState::new();
        let mut incoming = ModelSessionState::new();
        incoming.set("some_future_field", SessionValue::Str("x".into()));
        base.overlay(&incoming);
        assert_eq!(base.get("some_future_field").unwrap().as_str(), Some("x"));
    }
}
