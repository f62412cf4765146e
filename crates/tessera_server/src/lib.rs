//! # Tessera Sync Server
//!
//! Push/pull request handling for Tessera puzzle progress.
//!
//! This crate provides:
//! - The push processor: exactly-once, per-client ordered mutation
//!   application with a bookkeeping-only fallback for rejected payloads
//! - The pull processor: CVR fingerprinting and minimal patch generation
//! - A CVR snapshot cache with TTL expiry and LRU eviction
//! - Best-effort poke fan-out over tokio broadcast channels
//! - Identity resolution (HMAC-SHA256 tokens or upstream-trusted users)
//!
//! # Protocol
//!
//! 1. A connection is resolved into a [`SyncSession`] via [`SyncServer::connect`]
//! 2. Clients push mutations; each one commits in its own transaction
//! 3. Other devices of the user receive a poke and pull
//! 4. The pull diffs the cookie's CVR snapshot against current state and
//!    returns only what changed, plus a new cookie
//!
//! Transport is left to the embedder: every entry point is a plain
//! synchronous call taking and returning protocol types.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod auth;
mod config;
mod cvr_cache;
mod error;
mod handler;
mod mutators;
mod poke;
mod pull;
mod push;
mod server;
mod session;

pub use auth::{
    AuthConfig, Credentials, IdentityResolver, TokenIdentityResolver, TokenValidator,
    TrustedIdentityResolver,
};
pub use config::ServerConfig;
pub use cvr_cache::{CvrCache, MemoryCvrCache};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use mutators::apply as apply_mutation;
pub use poke::{ChannelBroadcaster, NoopBroadcaster, PokeBroadcaster, PokeChannel};
pub use pull::PullProcessor;
pub use push::{MutationOutcome, PushProcessor, PushSummary};
pub use server::SyncServer;
pub use session::SyncSession;
