//! Shared handler context and request dispatch.

use crate::config::ServerConfig;
use crate::cvr_cache::{CvrCache, MemoryCvrCache};
use crate::error::{ServerError, ServerResult};
use crate::poke::{NoopBroadcaster, PokeBroadcaster};
use crate::pull::PullProcessor;
use crate::push::{PushProcessor, PushSummary};
use crate::session::SyncSession;
use std::sync::Arc;
use tessera_protocol::{
    ClientGroupId, ProgressKey, PullRequest, PullResponse, PushRequest, UserId,
};
use tessera_store::{ClientGroupRecord, ProgressRecord, PuzzleCatalog, Store, StoreTxn};
use tracing::debug;

/// Collaborators shared by every request.
pub struct HandlerContext<S> {
    /// Server configuration.
    pub config: ServerConfig,
    /// Entity store.
    pub store: Arc<S>,
    /// Puzzle content reader.
    pub catalog: Arc<dyn PuzzleCatalog>,
    /// CVR snapshot cache.
    pub cache: Arc<dyn CvrCache>,
    /// Poke fan-out.
    pub broadcaster: Arc<dyn PokeBroadcaster>,
}

impl<S: Store> HandlerContext<S> {
    /// Creates a context with an in-memory CVR cache sized from `config`
    /// and no poke fan-out.
    pub fn new(config: ServerConfig, store: Arc<S>, catalog: Arc<dyn PuzzleCatalog>) -> Self {
        let cache = Arc::new(MemoryCvrCache::new(config.cvr_ttl, config.cvr_capacity));
        Self {
            config,
            store,
            catalog,
            cache,
            broadcaster: Arc::new(NoopBroadcaster),
        }
    }

    /// Replaces the CVR snapshot cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CvrCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the poke broadcaster.
    #[must_use]
    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn PokeBroadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    /// Loads the progress row, seeding it from puzzle defaults at version 0
    /// if it does not exist yet.
    pub(crate) fn load_progress(
        &self,
        txn: &mut dyn StoreTxn,
        key: &ProgressKey,
    ) -> ServerResult<ProgressRecord> {
        if let Some(progress) = txn.progress(key)? {
            return Ok(progress);
        }
        let defaults = self
            .catalog
            .defaults(&key.puzzle_id)?
            .ok_or_else(|| ServerError::NotFound(format!("puzzle {}", key.puzzle_id)))?;
        let mut progress = ProgressRecord::seeded(key, defaults);
        progress.version = txn.write_progress(progress.clone())?;
        debug!(progress = %progress.id, %key, "seeded progress");
        Ok(progress)
    }
}

/// Loads the group, creating it for `user` if absent.
///
/// Returns the record and whether it is new. Fails if another user owns it.
pub(crate) fn resolve_group(
    txn: &mut dyn StoreTxn,
    id: &ClientGroupId,
    user: &UserId,
) -> ServerResult<(ClientGroupRecord, bool)> {
    match txn.client_group(id)? {
        Some(group) if group.is_owned_by(user) => Ok((group, false)),
        Some(group) => Err(ServerError::Authorization(format!(
            "client group {id} belongs to {}, not {user}",
            group.user_id
        ))),
        None => Ok((ClientGroupRecord::new(id.clone(), user.clone()), true)),
    }
}

/// Handler for sync requests.
pub struct RequestHandler<S> {
    context: Arc<HandlerContext<S>>,
}

impl<S: Store> RequestHandler<S> {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext<S>>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Arc<HandlerContext<S>> {
        &self.context
    }

    /// Handles a push request.
    pub fn handle_push(
        &self,
        session: &SyncSession,
        request: &PushRequest,
    ) -> ServerResult<PushSummary> {
        let limit = self.context.config.max_push_batch;
        if request.mutations.len() > limit {
            return Err(ServerError::InvalidRequest(format!(
                "too many mutations: {} > {limit}",
                request.mutations.len()
            )));
        }
        PushProcessor::new(&self.context).process(session, request)
    }

    /// Handles a pull request.
    pub fn handle_pull(
        &self,
        session: &SyncSession,
        request: &PullRequest,
    ) -> ServerResult<PullResponse> {
        PullProcessor::new(&self.context).process(session, request)
    }
}
