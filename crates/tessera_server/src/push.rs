//! Push processing: per-client, exactly-once mutation application.
//!
//! Each mutation runs in its own store transaction:
//!
//! 1. Resolve the client group and client, checking ownership.
//! 2. Compare the mutation ID with the client's next expected ID. Older IDs
//!    are replays and change nothing; newer IDs are causal gaps and are
//!    dropped.
//! 3. Apply the mutator and advance the client's ledger atomically.
//!
//! A mutation rejected by validation is re-run in a second transaction that
//! only advances the ledger, so one corrupt payload never wedges a client.
//! Pokes go out once per affected progress row after the whole batch.

use crate::error::{ServerError, ServerResult};
use crate::handler::{resolve_group, HandlerContext};
use crate::mutators;
use crate::poke::PokeChannel;
use crate::session::SyncSession;
use std::collections::BTreeSet;
use tessera_protocol::{
    ClientGroupId, ClientId, Mutation, MutationKind, ProgressKey, PushRequest,
};
use tessera_store::{ClientRecord, Store, StoreTxn};
use tracing::{debug, warn};

/// What happened to one pushed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The mutator ran and the ledger advanced.
    Applied,
    /// Already applied earlier; nothing changed.
    Replayed,
    /// The mutator rejected the payload; only the ledger advanced.
    Discarded {
        /// Why the mutation was discarded.
        reason: String,
    },
    /// The mutation ID was ahead of the ledger; nothing changed.
    Gap {
        /// The ID the server expected instead.
        expected: u64,
    },
}

impl MutationOutcome {
    /// Returns true if the client's ledger advanced.
    pub fn advanced(&self) -> bool {
        matches!(
            self,
            MutationOutcome::Applied | MutationOutcome::Discarded { .. }
        )
    }
}

/// Result of processing a push batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Outcome per mutation, in submission order.
    pub outcomes: Vec<(u64, ClientId, MutationOutcome)>,
    /// Progress rows whose view changed.
    pub affected: BTreeSet<ProgressKey>,
}

impl PushSummary {
    /// Number of mutations whose ledger advanced.
    pub fn advanced(&self) -> usize {
        self.outcomes.iter().filter(|(_, _, o)| o.advanced()).count()
    }
}

/// How much of a mutation a transaction attempt writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Domain write plus ledger bookkeeping.
    Full,
    /// Ledger bookkeeping only.
    BookkeepingOnly,
}

/// Applies push batches against the store.
pub struct PushProcessor<'a, S> {
    ctx: &'a HandlerContext<S>,
}

impl<'a, S: Store> PushProcessor<'a, S> {
    /// Creates a processor over `ctx`.
    pub fn new(ctx: &'a HandlerContext<S>) -> Self {
        Self { ctx }
    }

    /// Processes every mutation of `request` in order.
    ///
    /// Authorization, missing-puzzle and storage failures stop the batch and
    /// are returned; mutations committed before the failure stay committed
    /// and are still poked.
    pub fn process(
        &self,
        session: &SyncSession,
        request: &PushRequest,
    ) -> ServerResult<PushSummary> {
        let key = session.progress_key();
        let mut summary = PushSummary::default();
        let mut failure = None;

        for mutation in &request.mutations {
            match self.process_mutation(session, &request.client_group_id, mutation, &key) {
                Ok(outcome) => {
                    if outcome.advanced() {
                        summary.affected.insert(key.clone());
                    }
                    summary
                        .outcomes
                        .push((mutation.id, mutation.client_id.clone(), outcome));
                }
                Err(err) => {
                    warn!(
                        client = %mutation.client_id,
                        mutation = mutation.id,
                        error = %err,
                        "push aborted"
                    );
                    failure = Some(err);
                    break;
                }
            }
        }

        for affected in &summary.affected {
            self.ctx.broadcaster.poke(&PokeChannel::for_progress(affected));
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    fn process_mutation(
        &self,
        session: &SyncSession,
        group_id: &ClientGroupId,
        mutation: &Mutation,
        key: &ProgressKey,
    ) -> ServerResult<MutationOutcome> {
        let first = self.ctx.store.transaction(|txn| {
            self.attempt(txn, session, group_id, mutation, key, Phase::Full)
        });

        let outcome = match first {
            Err(ServerError::Validation(reason)) => {
                warn!(
                    client = %mutation.client_id,
                    mutation = mutation.id,
                    name = mutation.name.as_str(),
                    %reason,
                    "discarding mutation, advancing ledger only"
                );
                self.ctx
                    .store
                    .transaction(|txn| {
                        self.attempt(txn, session, group_id, mutation, key, Phase::BookkeepingOnly)
                    })
                    .map(|outcome| match outcome {
                        MutationOutcome::Applied => MutationOutcome::Discarded { reason },
                        other => other,
                    })
            }
            Err(ServerError::CausalGap {
                client,
                expected,
                actual,
            }) => {
                warn!(%client, expected, actual, "causal gap, dropping mutation");
                Ok(MutationOutcome::Gap { expected })
            }
            other => other,
        }?;

        debug!(
            client = %mutation.client_id,
            mutation = mutation.id,
            ?outcome,
            "processed mutation"
        );
        Ok(outcome)
    }

    fn attempt(
        &self,
        txn: &mut dyn StoreTxn,
        session: &SyncSession,
        group_id: &ClientGroupId,
        mutation: &Mutation,
        key: &ProgressKey,
        phase: Phase,
    ) -> ServerResult<MutationOutcome> {
        let (group, new_group) = resolve_group(txn, group_id, session.user())?;

        let client = match txn.client(&mutation.client_id)? {
            Some(client) if &client.client_group_id != group_id => {
                return Err(ServerError::Authorization(format!(
                    "client {} belongs to group {}, not {group_id}",
                    client.id, client.client_group_id
                )));
            }
            Some(client) => client,
            None => ClientRecord::new(mutation.client_id.clone(), group_id.clone()),
        };

        let expected = client.expected_mutation_id();
        if mutation.id < expected {
            return Ok(MutationOutcome::Replayed);
        }
        if mutation.id > expected {
            return Err(ServerError::CausalGap {
                client: client.id,
                expected,
                actual: mutation.id,
            });
        }

        if phase == Phase::Full {
            self.mutate(txn, mutation, key)?;
        }

        if new_group {
            txn.put_client_group(group)?;
        }
        txn.put_client(ClientRecord {
            last_mutation_id: expected,
            ..client
        })?;
        Ok(MutationOutcome::Applied)
    }

    fn mutate(
        &self,
        txn: &mut dyn StoreTxn,
        mutation: &Mutation,
        key: &ProgressKey,
    ) -> ServerResult<()> {
        let kind = mutation.kind().map_err(ServerError::validation)?;
        let mut progress = self.ctx.load_progress(txn, key)?;
        let defaults = match kind {
            MutationKind::ResetProgress => self.ctx.catalog.defaults(&key.puzzle_id)?,
            _ => None,
        };

        if mutators::apply(&kind, &mut progress.data, mutation.timestamp, defaults.as_ref())? {
            let version = txn.write_progress(progress)?;
            debug!(%key, version, "progress updated");
        }
        Ok(())
    }
}
