//! Store and transaction traits.

use crate::error::{StoreError, StoreResult};
use crate::records::{ClientGroupRecord, ClientRecord, ProgressRecord};
use tessera_protocol::{ClientGroupId, ClientId, ProgressKey};

/// Operations available inside a store transaction.
///
/// Reads see the transaction's own pending writes. Writes are buffered and
/// become visible to other transactions only when the transaction commits.
pub trait StoreTxn {
    /// Reads a client group.
    fn client_group(&mut self, id: &ClientGroupId) -> StoreResult<Option<ClientGroupRecord>>;

    /// Inserts or updates a client group.
    ///
    /// Fails if the owner would change or `cvr_version` would decrease.
    fn put_client_group(&mut self, group: ClientGroupRecord) -> StoreResult<()>;

    /// Reads a client.
    fn client(&mut self, id: &ClientId) -> StoreResult<Option<ClientRecord>>;

    /// Inserts or updates a client.
    ///
    /// Fails if the client would move between groups or `last_mutation_id`
    /// would decrease.
    fn put_client(&mut self, client: ClientRecord) -> StoreResult<()>;

    /// Lists every client of a group, ordered by client ID.
    fn clients_in_group(&mut self, group: &ClientGroupId) -> StoreResult<Vec<ClientRecord>>;

    /// Reads the progress row for a (user, puzzle) pair.
    fn progress(&mut self, key: &ProgressKey) -> StoreResult<Option<ProgressRecord>>;

    /// Writes a progress row and returns its assigned version.
    ///
    /// A new row is stored at version 0; each later write stores the
    /// previous version plus one. The caller's `version` field is ignored.
    fn write_progress(&mut self, progress: ProgressRecord) -> StoreResult<u64>;
}

/// A durable, transactional entity store.
pub trait Store: Send + Sync {
    /// Runs `f` inside a transaction and commits its writes atomically.
    ///
    /// If `f` returns an error the transaction is aborted and nothing is
    /// written. Implementations may re-run `f` when a commit fails with a
    /// retryable conflict, so `f` must not have side effects outside the
    /// transaction that cannot be repeated.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnMut(&mut dyn StoreTxn) -> Result<T, E>,
        E: From<StoreError>;
}

/// Checks the invariants of a client group update.
pub(crate) fn check_group_update(
    current: Option<&ClientGroupRecord>,
    next: &ClientGroupRecord,
) -> StoreResult<()> {
    if let Some(current) = current {
        if current.user_id != next.user_id {
            return Err(StoreError::invariant(format!(
                "client group {} cannot change owner",
                next.id
            )));
        }
        if next.cvr_version < current.cvr_version {
            return Err(StoreError::invariant(format!(
                "client group {} cvrVersion went backwards ({} -> {})",
                next.id, current.cvr_version, next.cvr_version
            )));
        }
    }
    Ok(())
}

/// Checks the invariants of a client update.
pub(crate) fn check_client_update(
    current: Option<&ClientRecord>,
    next: &ClientRecord,
) -> StoreResult<()> {
    if let Some(current) = current {
        if current.client_group_id != next.client_group_id {
            return Err(StoreError::invariant(format!(
                "client {} cannot move to group {}",
                next.id, next.client_group_id
            )));
        }
        if next.last_mutation_id < current.last_mutation_id {
            return Err(StoreError::invariant(format!(
                "client {} lastMutationID went backwards ({} -> {})",
                next.id, current.last_mutation_id, next.last_mutation_id
            )));
        }
    }
    Ok(())
}
