//! In-memory store with optimistic, row-level conflict detection.
//!
//! Transactions buffer their writes and remember the commit sequence of every
//! row they read. Commit validates that none of those rows changed in the
//! meantime and applies the buffered writes under one short write lock, so
//! contention is limited to the rows two transactions actually share.

use crate::error::{StoreError, StoreResult};
use crate::records::{ClientGroupRecord, ClientRecord, ProgressRecord};
use crate::store::{check_client_update, check_group_update, Store, StoreTxn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_protocol::{ClientGroupId, ClientId, ProgressKey};
use tracing::{debug, trace};

/// Default number of times a conflicting transaction is re-run.
pub const DEFAULT_MAX_RETRIES: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    Group(ClientGroupId),
    Client(ClientId),
    /// Membership of a group; bumped whenever one of its clients is written.
    Members(ClientGroupId),
    Progress(ProgressKey),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Group(id) => write!(f, "group:{id}"),
            RowKey::Client(id) => write!(f, "client:{id}"),
            RowKey::Members(id) => write!(f, "members:{id}"),
            RowKey::Progress(key) => write!(f, "progress:{key}"),
        }
    }
}

#[derive(Debug, Clone)]
enum Row {
    Group(ClientGroupRecord),
    Client(ClientRecord),
    Progress(ProgressRecord),
}

impl Row {
    fn into_group(self) -> Option<ClientGroupRecord> {
        match self {
            Row::Group(g) => Some(g),
            _ => None,
        }
    }

    fn into_client(self) -> Option<ClientRecord> {
        match self {
            Row::Client(c) => Some(c),
            _ => None,
        }
    }

    fn into_progress(self) -> Option<ProgressRecord> {
        match self {
            Row::Progress(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<RowKey, Row>,
    /// Commit sequence that last wrote each row. Absent rows read as 0.
    seqs: HashMap<RowKey, u64>,
    commit_seq: u64,
}

impl Tables {
    fn seq(&self, key: &RowKey) -> u64 {
        self.seqs.get(key).copied().unwrap_or(0)
    }
}

/// Counters describing store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Committed transactions.
    pub commits: u64,
    /// Commits rejected because a read row changed.
    pub conflicts: u64,
    /// Transactions aborted by their closure.
    pub aborts: u64,
}

/// In-memory implementation of [`Store`].
pub struct MemoryStore {
    tables: RwLock<Tables>,
    max_retries: u32,
    commits: AtomicU64,
    conflicts: AtomicU64,
    aborts: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            max_retries: DEFAULT_MAX_RETRIES,
            commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            aborts: AtomicU64::new(0),
        }
    }

    /// Sets how many times a conflicting transaction is re-run.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Returns activity counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
        }
    }

    /// Returns the sequence of the latest commit.
    pub fn commit_seq(&self) -> u64 {
        self.tables.read().commit_seq
    }

    fn commit(&self, txn: MemoryTxn<'_>) -> StoreResult<()> {
        let mut tables = self.tables.write();

        for (key, (seen, _)) in &txn.reads {
            if tables.seq(key) != *seen {
                return Err(StoreError::conflict(key.to_string()));
            }
        }

        if txn.writes.is_empty() {
            return Ok(());
        }

        tables.commit_seq += 1;
        let seq = tables.commit_seq;
        let count = txn.writes.len();
        for (key, row) in txn.writes {
            if let Row::Client(client) = &row {
                tables
                    .seqs
                    .insert(RowKey::Members(client.client_group_id.clone()), seq);
            }
            tables.seqs.insert(key.clone(), seq);
            tables.rows.insert(key, row);
        }
        trace!(seq, writes = count, "committed transaction");
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn transaction<T, E, F>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn StoreTxn) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut retries = 0;
        loop {
            let mut txn = MemoryTxn::new(&self.tables);
            let value = match f(&mut txn) {
                Ok(value) => value,
                Err(e) => {
                    self.aborts.fetch_add(1, Ordering::Relaxed);
                    return Err(e);
                }
            };

            match self.commit(txn) {
                Ok(()) => {
                    self.commits.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(StoreError::Conflict { row }) if retries < self.max_retries => {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                    retries += 1;
                    debug!(%row, retries, "transaction conflict, retrying");
                }
                Err(err) => {
                    if matches!(err, StoreError::Conflict { .. }) {
                        self.conflicts.fetch_add(1, Ordering::Relaxed);
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

/// A transaction over a [`MemoryStore`].
struct MemoryTxn<'a> {
    tables: &'a RwLock<Tables>,
    /// Rows read, with the commit sequence and value seen at first read.
    /// Later reads return the same value so a transaction never observes
    /// a concurrent commit halfway through.
    reads: HashMap<RowKey, (u64, Option<Row>)>,
    /// Buffered writes.
    writes: HashMap<RowKey, Row>,
}

impl<'a> MemoryTxn<'a> {
    fn new(tables: &'a RwLock<Tables>) -> Self {
        Self {
            tables,
            reads: HashMap::new(),
            writes: HashMap::new(),
        }
    }

    fn read(&mut self, key: RowKey) -> Option<Row> {
        if let Some(row) = self.writes.get(&key) {
            return Some(row.clone());
        }
        if let Some((_, row)) = self.reads.get(&key) {
            return row.clone();
        }
        let lock = self.tables;
        let tables = lock.read();
        let row = tables.rows.get(&key).cloned();
        let seq = tables.seq(&key);
        self.reads.insert(key, (seq, row.clone()));
        row
    }
}

impl StoreTxn for MemoryTxn<'_> {
    fn client_group(&mut self, id: &ClientGroupId) -> StoreResult<Option<ClientGroupRecord>> {
        Ok(self.read(RowKey::Group(id.clone())).and_then(Row::into_group))
    }

    fn put_client_group(&mut self, group: ClientGroupRecord) -> StoreResult<()> {
        let current = self.client_group(&group.id)?;
        check_group_update(current.as_ref(), &group)?;
        self.writes
            .insert(RowKey::Group(group.id.clone()), Row::Group(group));
        Ok(())
    }

    fn client(&mut self, id: &ClientId) -> StoreResult<Option<ClientRecord>> {
        Ok(self.read(RowKey::Client(id.clone())).and_then(Row::into_client))
    }

    fn put_client(&mut self, client: ClientRecord) -> StoreResult<()> {
        let current = self.client(&client.id)?;
        check_client_update(current.as_ref(), &client)?;
        self.writes
            .insert(RowKey::Client(client.id.clone()), Row::Client(client));
        Ok(())
    }

    fn clients_in_group(&mut self, group: &ClientGroupId) -> StoreResult<Vec<ClientRecord>> {
        let members = RowKey::Members(group.clone());
        let lock = self.tables;
        let mut clients: BTreeMap<ClientId, ClientRecord> = {
            let tables = lock.read();
            let seq = tables.seq(&members);
            self.reads.entry(members).or_insert((seq, None));
            tables
                .rows
                .values()
                .filter_map(|row| match row {
                    Row::Client(c) if &c.client_group_id == group => {
                        Some((c.id.clone(), c.clone()))
                    }
                    _ => None,
                })
                .collect()
        };

        for row in self.writes.values() {
            if let Row::Client(c) = row {
                if &c.client_group_id == group {
                    clients.insert(c.id.clone(), c.clone());
                }
            }
        }
        Ok(clients.into_values().collect())
    }

    fn progress(&mut self, key: &ProgressKey) -> StoreResult<Option<ProgressRecord>> {
        Ok(self
            .read(RowKey::Progress(key.clone()))
            .and_then(Row::into_progress))
    }

    fn write_progress(&mut self, mut progress: ProgressRecord) -> StoreResult<u64> {
        let key = progress.key();
        progress.version = match self.progress(&key)? {
            Some(current) if current.id != progress.id => {
                return Err(StoreError::invariant(format!(
                    "progress {key} already exists as {}",
                    current.id
                )));
            }
            Some(current) => current.version + 1,
            None => 0,
        };
        let version = progress.version;
        self.writes
            .insert(RowKey::Progress(key), Row::Progress(progress));
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use tessera_protocol::ProgressData;

    fn group(id: &str, user: &str) -> ClientGroupRecord {
        ClientGroupRecord::new(id.into(), user.into())
    }

    fn client(id: &str, group: &str, lmid: u64) -> ClientRecord {
        ClientRecord {
            id: id.into(),
            client_group_id: group.into(),
            last_mutation_id: lmid,
        }
    }

    fn key() -> ProgressKey {
        ProgressKey::new("alice".into(), "p1".into())
    }

    #[test]
    fn reads_see_own_writes() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| {
                txn.put_client(client("x", "g", 1))?;
                assert_eq!(txn.client(&"x".into())?.unwrap().last_mutation_id, 1);
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let committed = store.transaction(|txn| txn.client(&"x".into())).unwrap();
        assert_eq!(committed, Some(client("x", "g", 1)));
    }

    #[test]
    fn failed_closure_writes_nothing() {
        let store = MemoryStore::new();
        let result: StoreResult<()> = store.transaction(|txn| {
            txn.put_client_group(group("g", "alice"))?;
            Err(StoreError::Backend("boom".into()))
        });
        assert!(result.is_err());
        assert!(store
            .transaction(|txn| txn.client_group(&"g".into()))
            .unwrap()
            .is_none());
        assert_eq!(store.stats().aborts, 1);
        assert_eq!(store.commit_seq(), 0);
    }

    #[test]
    fn progress_versions_are_assigned() {
        let store = MemoryStore::new();
        let seeded = ProgressRecord::seeded(&key(), ProgressData::new());

        let v0 = store
            .transaction(|txn| txn.write_progress(seeded.clone()))
            .unwrap();
        assert_eq!(v0, 0);

        let v1 = store
            .transaction(|txn| {
                let mut p = txn.progress(&key())?.unwrap();
                p.data.set("time", json!(5), 1);
                txn.write_progress(p)
            })
            .unwrap();
        assert_eq!(v1, 1);

        // Two writes in one transaction bump twice.
        let v3 = store
            .transaction(|txn| {
                let p = txn.progress(&key())?.unwrap();
                txn.write_progress(p.clone())?;
                let p = txn.progress(&key())?.unwrap();
                txn.write_progress(p)
            })
            .unwrap();
        assert_eq!(v3, 3);
    }

    #[test]
    fn duplicate_progress_row_is_rejected() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| txn.write_progress(ProgressRecord::seeded(&key(), ProgressData::new())))
            .unwrap();
        let err = store
            .transaction(|txn| txn.write_progress(ProgressRecord::seeded(&key(), ProgressData::new())))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation { .. }));
    }

    #[test]
    fn last_mutation_id_cannot_go_backwards() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| txn.put_client(client("x", "g", 3)))
            .unwrap();
        let err = store
            .transaction(|txn| txn.put_client(client("x", "g", 2)))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvariantViolation { .. }));
    }

    #[test]
    fn client_cannot_change_group() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| txn.put_client(client("x", "g1", 1)))
            .unwrap();
        assert!(store
            .transaction(|txn| txn.put_client(client("x", "g2", 2)))
            .is_err());
    }

    #[test]
    fn group_owner_is_immutable() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| txn.put_client_group(group("g", "alice")))
            .unwrap();
        assert!(store
            .transaction(|txn| txn.put_client_group(group("g", "mallory")))
            .is_err());

        let mut advanced = group("g", "alice");
        advanced.cvr_version = 2;
        store
            .transaction(|txn| txn.put_client_group(advanced.clone()))
            .unwrap();
        assert!(store
            .transaction(|txn| txn.put_client_group(group("g", "alice")))
            .is_err());
    }

    #[test]
    fn clients_in_group_merges_pending_writes() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| {
                txn.put_client(client("b", "g", 1))?;
                txn.put_client(client("other", "h", 1))
            })
            .unwrap();

        let ids: Vec<String> = store
            .transaction(|txn| {
                txn.put_client(client("a", "g", 0))?;
                txn.put_client(client("b", "g", 2))?;
                txn.clients_in_group(&"g".into())
            })
            .unwrap()
            .into_iter()
            .map(|c| format!("{}={}", c.id, c.last_mutation_id))
            .collect();
        assert_eq!(ids, vec!["a=0", "b=2"]);
    }

    #[test]
    fn conflicting_commit_is_retried() {
        let store = MemoryStore::new();
        store
            .transaction(|txn| txn.put_client(client("x", "g", 0)))
            .unwrap();

        let interfered = AtomicBool::new(false);
        let final_lmid = store
            .transaction(|txn| {
                let mut c = txn.client(&"x".into())?.unwrap();
                if !interfered.swap(true, Ordering::SeqCst) {
                    // A concurrent writer commits between our read and our commit.
                    store.transaction(|other| other.put_client(client("x", "g", 5)))?;
                }
                c.last_mutation_id += 1;
                txn.put_client(c.clone())?;
                Ok::<_, StoreError>(c.last_mutation_id)
            })
            .unwrap();

        assert_eq!(final_lmid, 6);
        assert_eq!(store.stats().conflicts, 1);
    }

    #[test]
    fn exhausted_retries_surface_conflict() {
        let store = MemoryStore::new().with_max_retries(2);
        store
            .transaction(|txn| txn.put_client_group(group("g", "alice")))
            .unwrap();

        let result: StoreResult<()> = store.transaction(|txn| {
            let mut g = txn.client_group(&"g".into())?.unwrap();
            let mut bumped = g.clone();
            bumped.cvr_version += 1;
            store.transaction(|other| other.put_client_group(bumped.clone()))?;
            g.cvr_version += 100;
            txn.put_client_group(g)
        });
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert_eq!(store.stats().conflicts, 3);
    }

    #[test]
    fn membership_read_conflicts_with_new_client() {
        let store = MemoryStore::new();
        let interfered = AtomicBool::new(false);
        let count = store
            .transaction(|txn| {
                let clients = txn.clients_in_group(&"g".into())?;
                if !interfered.swap(true, Ordering::SeqCst) {
                    store.transaction(|other| other.put_client(client("late", "g", 0)))?;
                }
                txn.put_client_group(group("g", "alice"))?;
                Ok::<_, StoreError>(clients.len())
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn concurrent_increments_are_serialized() {
        let store = Arc::new(MemoryStore::new().with_max_retries(10_000));
        store
            .transaction(|txn| txn.put_client(client("x", "g", 0)))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .transaction(|txn| {
                                let mut c = txn.client(&"x".into())?.unwrap();
                                c.last_mutation_id += 1;
                                txn.put_client(c)
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let c = store
            .transaction(|txn| txn.client(&"x".into()))
            .unwrap()
            .unwrap();
        assert_eq!(c.last_mutation_id, 200);
    }
}
