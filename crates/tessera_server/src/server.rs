//! Main sync server.

use crate::auth::{
    AuthConfig, Credentials, IdentityResolver, TokenIdentityResolver, TokenValidator,
    TrustedIdentityResolver,
};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{HandlerContext, RequestHandler};
use crate::push::PushSummary;
use crate::session::SyncSession;
use std::sync::Arc;
use tessera_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, PuzzleId, SyncMessage};
use tessera_store::{MemoryStore, PuzzleCatalog, Store};
use tracing::debug;

/// The sync server.
///
/// Resolves connections into [`SyncSession`]s and serves push and pull
/// requests for them. The server keeps no per-connection state; callers
/// hold the session and pass it with every request.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tessera_server::{Credentials, ServerConfig, SyncServer};
/// use tessera_store::{MemoryCatalog, MemoryStore};
///
/// let catalog = Arc::new(MemoryCatalog::new());
/// let server = SyncServer::new(ServerConfig::default(), Arc::new(MemoryStore::new()), catalog);
/// let session = server
///     .connect(&Credentials::User("alice".into()), "p1".into())
///     .unwrap();
/// assert_eq!(session.user().as_str(), "alice");
/// ```
pub struct SyncServer<S> {
    handler: RequestHandler<S>,
    identity: Arc<dyn IdentityResolver>,
}

impl<S: Store> SyncServer<S> {
    /// Creates a server over `store` with the default collaborators.
    ///
    /// Token authentication is used when `config` enables it, otherwise
    /// transport-authenticated users are trusted.
    pub fn new(config: ServerConfig, store: Arc<S>, catalog: Arc<dyn PuzzleCatalog>) -> Self {
        Self::with_context(HandlerContext::new(config, store, catalog))
    }

    /// Creates a server from a prepared context.
    pub fn with_context(context: HandlerContext<S>) -> Self {
        let identity: Arc<dyn IdentityResolver> = match &context.config.auth_secret {
            Some(secret) if context.config.require_auth => Arc::new(TokenIdentityResolver::new(
                TokenValidator::new(AuthConfig::new(secret.clone())),
            )),
            _ => Arc::new(TrustedIdentityResolver),
        };
        Self {
            handler: RequestHandler::new(Arc::new(context)),
            identity,
        }
    }

    /// Replaces the identity resolver.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    /// Returns the shared handler context.
    pub fn context(&self) -> &HandlerContext<S> {
        self.handler.context()
    }

    /// Authenticates a connection and opens a session for `puzzle`.
    pub fn connect(&self, credentials: &Credentials, puzzle: PuzzleId) -> ServerResult<SyncSession> {
        let user = self.identity.resolve(credentials)?;
        debug!(%user, %puzzle, "session opened");
        Ok(SyncSession::new(user, puzzle))
    }

    /// Handles a push and reports per-mutation outcomes.
    pub fn push(&self, session: &SyncSession, request: &PushRequest) -> ServerResult<PushSummary> {
        self.handler.handle_push(session, request)
    }

    /// Handles a push request.
    pub fn handle_push(
        &self,
        session: &SyncSession,
        request: PushRequest,
    ) -> ServerResult<PushResponse> {
        self.push(session, &request).map(|_| PushResponse::default())
    }

    /// Handles a pull request.
    pub fn handle_pull(
        &self,
        session: &SyncSession,
        request: PullRequest,
    ) -> ServerResult<PullResponse> {
        self.handler.handle_pull(session, &request)
    }

    /// Handles a sync message (dispatches to the appropriate handler).
    pub fn handle_message(
        &self,
        session: &SyncSession,
        message: SyncMessage,
    ) -> ServerResult<SyncMessage> {
        match message {
            SyncMessage::Push(req) => self.handle_push(session, req).map(SyncMessage::PushResponse),
            SyncMessage::Pull(req) => self.handle_pull(session, req).map(SyncMessage::PullResponse),
            SyncMessage::PushResponse(_) | SyncMessage::PullResponse(_) => Err(
                ServerError::InvalidRequest("unexpected response message".into()),
            ),
        }
    }
}

impl SyncServer<MemoryStore> {
    /// Creates a server backed by a fresh [`MemoryStore`].
    pub fn in_memory(config: ServerConfig, catalog: Arc<dyn PuzzleCatalog>) -> Self {
        let store = MemoryStore::new().with_max_retries(config.store_retries);
        Self::new(config, Arc::new(store), catalog)
    }
}
