//! Client View Record engine.
//!
//! A [`Cvr`] records, per collection, the version of every entity a client
//! group has been sent. It never holds payloads, only `id -> version`, so
//! diffing two records stays cheap regardless of entity size.
//!
//! CVRs are immutable once built: a pull builds a fresh record from
//! authoritative state and diffs it against the one named by the client's
//! cookie, then stores the new record under a new ID.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Collection of progress rows.
pub const PROGRESS_COLLECTION: &str = "progress";

/// Collection of clients, versioned by `lastMutationID`.
pub const CLIENTS_COLLECTION: &str = "clients";

/// An entity that can be recorded in a CVR.
pub trait Fingerprint {
    /// Collection the entity belongs to.
    fn collection(&self) -> &'static str;
    /// Key of the entity within its collection.
    fn cvr_key(&self) -> String;
    /// Monotonic version of the entity.
    fn cvr_version(&self) -> u64;
}

/// Snapshot of what a client group has seen: `collection -> {id -> version}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cvr(BTreeMap<String, BTreeMap<String, u64>>);

impl Cvr {
    /// Returns an empty record, the baseline for a first pull.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Starts building a record.
    #[must_use]
    pub fn builder() -> CvrBuilder {
        CvrBuilder::default()
    }

    /// Returns the recorded version of an entity.
    #[must_use]
    pub fn version(&self, collection: &str, key: &str) -> Option<u64> {
        self.0.get(collection).and_then(|c| c.get(key)).copied()
    }

    /// Returns the entries of one collection.
    #[must_use]
    pub fn collection(&self, collection: &str) -> Option<&BTreeMap<String, u64>> {
        self.0.get(collection)
    }

    /// Returns the total number of recorded entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    /// Computes what must change to turn `self` into `next`.
    #[must_use]
    pub fn diff(&self, next: &Cvr) -> CvrDiff {
        diff(self, next)
    }
}

/// Accumulates entities into a [`Cvr`].
#[derive(Debug, Default)]
pub struct CvrBuilder {
    entries: BTreeMap<String, BTreeMap<String, u64>>,
}

impl CvrBuilder {
    /// Records one entity.
    #[must_use]
    pub fn add<T: Fingerprint + ?Sized>(mut self, entity: &T) -> Self {
        self.entries
            .entry(entity.collection().to_owned())
            .or_default()
            .insert(entity.cvr_key(), entity.cvr_version());
        self
    }

    /// Records every entity of an iterator.
    #[must_use]
    pub fn add_all<'a, T, I>(self, entities: I) -> Self
    where
        T: Fingerprint + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        entities.into_iter().fold(self, |b, e| b.add(e))
    }

    /// Freezes the record.
    #[must_use]
    pub fn build(self) -> Cvr {
        Cvr(self.entries)
    }
}

/// Builds a CVR from authoritative entities.
pub fn fingerprint<'a, T, I>(entities: I) -> Cvr
where
    T: Fingerprint + 'a,
    I: IntoIterator<Item = &'a T>,
{
    Cvr::builder().add_all(entities).build()
}

/// Changes to one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDiff {
    /// Keys added or whose version changed, in key order.
    pub puts: Vec<String>,
    /// Keys present in the base but absent from the next record, in key order.
    pub dels: Vec<String>,
}

impl CollectionDiff {
    /// Returns true if there are no puts and no dels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.dels.is_empty()
    }
}

/// Per-collection difference between two CVRs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CvrDiff(BTreeMap<String, CollectionDiff>);

impl CvrDiff {
    /// Returns the changes for one collection.
    #[must_use]
    pub fn collection(&self, collection: &str) -> Option<&CollectionDiff> {
        self.0.get(collection)
    }

    /// Returns the keys put in one collection.
    #[must_use]
    pub fn puts(&self, collection: &str) -> &[String] {
        self.0.get(collection).map_or(&[], |c| c.puts.as_slice())
    }

    /// Returns the keys deleted from one collection.
    #[must_use]
    pub fn dels(&self, collection: &str) -> &[String] {
        self.0.get(collection).map_or(&[], |c| c.dels.as_slice())
    }

    /// Returns true when every collection's puts and dels are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(CollectionDiff::is_empty)
    }

    /// Iterates collections with changes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CollectionDiff)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Diffs two CVRs. The result depends only on their contents, never on
/// insertion order.
pub fn diff(base: &Cvr, next: &Cvr) -> CvrDiff {
    let empty = BTreeMap::new();
    let collections: BTreeSet<&String> = base.0.keys().chain(next.0.keys()).collect();

    let mut out = BTreeMap::new();
    for name in collections {
        let before = base.0.get(name).unwrap_or(&empty);
        let after = next.0.get(name).unwrap_or(&empty);

        let puts: Vec<String> = after
            .iter()
            .filter(|(key, version)| before.get(*key) != Some(*version))
            .map(|(key, _)| key.clone())
            .collect();
        let dels: Vec<String> = before
            .keys()
            .filter(|key| !after.contains_key(*key))
            .cloned()
            .collect();

        let change = CollectionDiff { puts, dels };
        if !change.is_empty() {
            out.insert(name.clone(), change);
        }
    }
    CvrDiff(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Row {
        collection: &'static str,
        key: String,
        version: u64,
    }

    impl Fingerprint for Row {
        fn collection(&self) -> &'static str {
            self.collection
        }
        fn cvr_key(&self) -> String {
            self.key.clone()
        }
        fn cvr_version(&self) -> u64 {
            self.version
        }
    }

    fn row(collection: &'static str, key: &str, version: u64) -> Row {
        Row {
            collection,
            key: key.into(),
            version,
        }
    }

    #[test]
    fn fingerprint_records_versions() {
        let cvr = fingerprint(&[
            row(PROGRESS_COLLECTION, "p1", 3),
            row(CLIENTS_COLLECTION, "c1", 7),
        ]);
        assert_eq!(cvr.version(PROGRESS_COLLECTION, "p1"), Some(3));
        assert_eq!(cvr.version(CLIENTS_COLLECTION, "c1"), Some(7));
        assert_eq!(cvr.entity_count(), 2);
    }

    #[test]
    fn version_change_is_a_put() {
        let base = fingerprint(&[row(PROGRESS_COLLECTION, "p1", 1)]);
        let next = fingerprint(&[row(PROGRESS_COLLECTION, "p1", 2)]);
        let d = diff(&base, &next);
        assert_eq!(d.puts(PROGRESS_COLLECTION), ["p1".to_string()]);
        assert!(d.dels(PROGRESS_COLLECTION).is_empty());
    }

    #[test]
    fn missing_entity_is_a_del() {
        let base = fingerprint(&[
            row(PROGRESS_COLLECTION, "p1", 1),
            row(PROGRESS_COLLECTION, "p2", 1),
        ]);
        let next = fingerprint(&[row(PROGRESS_COLLECTION, "p2", 1)]);
        let d = base.diff(&next);
        assert!(d.puts(PROGRESS_COLLECTION).is_empty());
        assert_eq!(d.dels(PROGRESS_COLLECTION), ["p1".to_string()]);
    }

    #[test]
    fn dropped_collection_deletes_everything() {
        let base = fingerprint(&[row(CLIENTS_COLLECTION, "c1", 4)]);
        let d = diff(&base, &Cvr::empty());
        assert_eq!(d.dels(CLIENTS_COLLECTION), ["c1".to_string()]);
        assert!(!d.is_empty());
    }

    #[test]
    fn cvr_round_trips_through_json() {
        let cvr = fingerprint(&[row(PROGRESS_COLLECTION, "p1", 9)]);
        let text = serde_json::to_string(&cvr).unwrap();
        assert_eq!(text, r#"{"progress":{"p1":9}}"#);
        let back: Cvr = serde_json::from_str(&text).unwrap();
        assert_eq!(back, cvr);
    }

    fn arb_cvr() -> impl Strategy<Value = Cvr> {
        prop::collection::btree_map(
            prop::sample::select(vec![PROGRESS_COLLECTION, CLIENTS_COLLECTION]),
            prop::collection::btree_map("[a-f]{1,3}", 0u64..5, 0..8),
            0..3,
        )
        .prop_map(|m| Cvr(m.into_iter().map(|(k, v)| (k.to_string(), v)).collect()))
    }

    proptest! {
        #[test]
        fn diff_with_self_is_empty(a in arb_cvr()) {
            prop_assert!(diff(&a, &a).is_empty());
        }

        #[test]
        fn diff_from_empty_puts_everything(a in arb_cvr()) {
            let d = diff(&Cvr::empty(), &a);
            for (name, entries) in &a.0 {
                let expected: Vec<String> = entries.keys().cloned().collect();
                prop_assert_eq!(d.puts(name), expected.as_slice());
                prop_assert!(d.dels(name).is_empty());
            }
            prop_assert_eq!(d.is_empty(), a.is_empty());
        }

        #[test]
        fn applying_diff_reaches_next(a in arb_cvr(), b in arb_cvr()) {
            let d = diff(&a, &b);
            let mut applied = a.0.clone();
            for (name, change) in d.iter() {
                let entries = applied.entry(name.to_string()).or_default();
                for key in &change.dels {
                    entries.remove(key);
                }
                for key in &change.puts {
                    entries.insert(key.clone(), b.version(name, key).unwrap());
                }
            }
            applied.retain(|_, entries| !entries.is_empty());
            let mut expected = b.0.clone();
            expected.retain(|_, entries| !entries.is_empty());
            prop_assert_eq!(applied, expected);
        }
    }
}
