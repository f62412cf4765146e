//! Field-level last-write-wins progress data.
//!
//! Every field of a progress record carries the timestamp of the write that
//! produced it. Two devices editing disjoint fields never clobber each other,
//! and concurrent edits of the same field converge on the greatest timestamp.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field holding elapsed solve time in seconds.
pub const TIME_FIELD: &str = "time";

/// Field holding the player character's position.
pub const CHARACTER_POSITION_FIELD: &str = "characterPosition";

/// Prefix for per-cell answer fields.
pub const ANSWER_FIELD_PREFIX: &str = "answer:";

/// Returns the field name for a puzzle cell's answer.
#[must_use]
pub fn answer_field(cell: &str) -> String {
    format!("{ANSWER_FIELD_PREFIX}{cell}")
}

/// A single field value stamped with the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    /// The field's value.
    pub value: Value,
    /// Client timestamp (milliseconds) of the winning write.
    pub timestamp: u64,
}

impl FieldValue {
    /// Creates a stamped field value.
    pub fn new(value: Value, timestamp: u64) -> Self {
        Self { value, timestamp }
    }
}

/// Mapping of named fields to timestamped values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressData(BTreeMap<String, FieldValue>);

impl ProgressData {
    /// Creates empty progress data.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Returns true if the field exists.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Writes a field if `timestamp` is not older than the stored one.
    ///
    /// Returns true if the stored field changed.
    pub fn set(&mut self, field: impl Into<String>, value: Value, timestamp: u64) -> bool {
        let field = field.into();
        let incoming = FieldValue::new(value, timestamp);
        match self.0.get_mut(&field) {
            Some(current) if current.timestamp > timestamp => false,
            Some(current) if *current == incoming => false,
            Some(current) => {
                *current = incoming;
                true
            }
            None => {
                self.0.insert(field, incoming);
                true
            }
        }
    }

    /// Removes a field if `timestamp` is not older than the stored one.
    ///
    /// Returns true if the field was removed.
    pub fn remove(&mut self, field: &str, timestamp: u64) -> bool {
        match self.0.get(field) {
            Some(current) if current.timestamp <= timestamp => {
                self.0.remove(field);
                true
            }
            _ => false,
        }
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FieldValue)> for ProgressData {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn newer_write_wins() {
        let mut data = ProgressData::new();
        assert!(data.set(TIME_FIELD, json!(10), 100));
        assert!(data.set(TIME_FIELD, json!(20), 200));
        assert_eq!(data.get(TIME_FIELD).unwrap().value, json!(20));
    }

    #[test]
    fn older_write_is_ignored() {
        let mut data = ProgressData::new();
        data.set(TIME_FIELD, json!(20), 200);
        assert!(!data.set(TIME_FIELD, json!(10), 100));
        assert_eq!(data.get(TIME_FIELD).unwrap().value, json!(20));
    }

    #[test]
    fn identical_write_reports_no_change() {
        let mut data = ProgressData::new();
        data.set(TIME_FIELD, json!(20), 200);
        assert!(!data.set(TIME_FIELD, json!(20), 200));
    }

    #[test]
    fn disjoint_fields_do_not_interfere() {
        let mut data = ProgressData::new();
        data.set(TIME_FIELD, json!(5), 300);
        data.set(answer_field("A1"), json!("Q"), 100);
        assert_eq!(data.len(), 2);
        assert_eq!(data.get("answer:A1").unwrap().timestamp, 100);
    }

    #[test]
    fn remove_respects_timestamps() {
        let mut data = ProgressData::new();
        data.set(CHARACTER_POSITION_FIELD, json!({"x": 1.0}), 200);
        assert!(!data.remove(CHARACTER_POSITION_FIELD, 100));
        assert!(data.remove(CHARACTER_POSITION_FIELD, 200));
        assert!(!data.remove(CHARACTER_POSITION_FIELD, 300));
        assert!(data.is_empty());
    }

    #[test]
    fn serializes_as_field_map() {
        let mut data = ProgressData::new();
        data.set(TIME_FIELD, json!(120), 7);
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"time": {"value": 120, "timestamp": 7}})
        );
    }
}
