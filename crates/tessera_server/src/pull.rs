//! Pull processing: minimal patches from CVR diffs.
//!
//! A pull fingerprints the authoritative state the client group can see
//! (its progress row and every client's ledger position), diffs that
//! against the snapshot named by the client's cookie and ships only the
//! difference. All reads and the version bump happen in one transaction.

use crate::error::{ServerError, ServerResult};
use crate::handler::{resolve_group, HandlerContext};
use crate::session::SyncSession;
use std::collections::{BTreeMap, HashMap};
use tessera_protocol::{
    diff, ClientId, Cookie, Cvr, CvrDiff, CvrId, PatchOp, ProgressId, ProtocolError,
    PullRequest, PullResponse, CLIENTS_COLLECTION, PROGRESS_COLLECTION,
};
use tessera_store::{ClientRecord, ProgressRecord, Store};
use tracing::{debug, info};

/// Outcome of the pull transaction.
enum Pulled {
    /// Nothing changed since the cookie's snapshot.
    Unchanged(Cookie),
    /// A new snapshot must be stored before responding.
    Advanced {
        response: PullResponse,
        snapshot: Cvr,
        cvr_id: CvrId,
    },
}

/// Serves pull requests.
pub struct PullProcessor<'a, S> {
    ctx: &'a HandlerContext<S>,
}

impl<'a, S: Store> PullProcessor<'a, S> {
    /// Creates a processor over `ctx`.
    pub fn new(ctx: &'a HandlerContext<S>) -> Self {
        Self { ctx }
    }

    /// Computes the patch from the cookie's snapshot to current state.
    pub fn process(
        &self,
        session: &SyncSession,
        request: &PullRequest,
    ) -> ServerResult<PullResponse> {
        let base = match &request.cookie {
            Some(cookie) => self.ctx.cache.get(&cookie.cvr_id)?,
            None => None,
        };
        if request.cookie.is_some() && base.is_none() {
            debug!(group = %request.client_group_id, "cookie snapshot missing, full resync");
        }

        let key = session.progress_key();
        let pulled = self.ctx.store.transaction(|txn| -> ServerResult<Pulled> {
            let (mut group, _) = resolve_group(txn, &request.client_group_id, session.user())?;
            let progress = self.ctx.load_progress(txn, &key)?;
            let clients = txn.clients_in_group(&request.client_group_id)?;

            let next = Cvr::builder().add(&progress).add_all(&clients).build();
            let changes = diff(base.as_ref().unwrap_or(&Cvr::empty()), &next);

            if let (Some(_), Some(cookie)) = (&base, &request.cookie) {
                if changes.is_empty() {
                    return Ok(Pulled::Unchanged(cookie.clone()));
                }
            }

            let order = request
                .cookie
                .as_ref()
                .map_or(0, |c| c.order)
                .max(group.cvr_version)
                .checked_add(1)
                .ok_or_else(|| ServerError::InvalidRequest("cookie order out of range".into()))?;
            group.cvr_version = order;
            txn.put_client_group(group)?;

            let cvr_id = CvrId::generate();
            let response = PullResponse {
                cookie: Cookie::new(order, cvr_id.clone()),
                last_mutation_id_changes: ledger_changes(&changes, &clients),
                patch: build_patch(base.is_none(), &changes, &progress)?,
            };
            Ok(Pulled::Advanced {
                response,
                snapshot: next,
                cvr_id,
            })
        })?;

        match pulled {
            Pulled::Unchanged(cookie) => {
                debug!(group = %request.client_group_id, order = cookie.order, "pull unchanged");
                Ok(PullResponse::unchanged(cookie))
            }
            Pulled::Advanced {
                response,
                snapshot,
                cvr_id,
            } => {
                self.ctx.cache.put(cvr_id, &snapshot)?;
                info!(
                    group = %request.client_group_id,
                    order = response.cookie.order,
                    ops = response.patch.len(),
                    "cvr advanced"
                );
                Ok(response)
            }
        }
    }
}

/// Ledger positions of clients that changed since the base snapshot.
fn ledger_changes(changes: &CvrDiff, clients: &[ClientRecord]) -> BTreeMap<ClientId, u64> {
    let by_id: HashMap<&str, &ClientRecord> =
        clients.iter().map(|c| (c.id.as_str(), c)).collect();
    changes
        .puts(CLIENTS_COLLECTION)
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .map(|c| (c.id.clone(), c.last_mutation_id))
        .collect()
}

/// Builds patch ops: `clear` for a full resync, then dels, then puts.
fn build_patch(
    full: bool,
    changes: &CvrDiff,
    progress: &ProgressRecord,
) -> ServerResult<Vec<PatchOp>> {
    let mut patch = Vec::new();
    if full {
        patch.push(PatchOp::Clear);
    }
    for id in changes.dels(PROGRESS_COLLECTION) {
        let key = match ProgressId::parse(id) {
            Some(id) => id.patch_key(),
            None => format!("progress/{id}"),
        };
        patch.push(PatchOp::Del { key });
    }
    let progress_id = progress.id.to_string();
    if changes
        .puts(PROGRESS_COLLECTION)
        .iter()
        .any(|id| *id == progress_id)
    {
        let value = serde_json::to_value(progress).map_err(ProtocolError::from)?;
        patch.push(PatchOp::Put {
            key: progress.id.patch_key(),
            value,
        });
    }
    Ok(patch)
}
