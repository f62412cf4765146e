//! # Tessera Sync Protocol
//!
//! Protocol types and the Client View Record engine for Tessera.
//!
//! This crate provides:
//! - Identifier newtypes (`UserId`, `ClientId`, `ClientGroupId`, ...)
//! - `Mutation` wire records and the closed, typed `MutationKind` set
//! - Push/pull messages, cookies and patch operations
//! - `ProgressData` with field-level last-write-wins
//! - The CVR engine: `fingerprint`, `diff` and `CvrDiff::is_empty`
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cvr;
mod error;
mod ids;
mod messages;
mod mutation;
pub mod progress;

pub use cvr::{
    diff, fingerprint, CollectionDiff, Cvr, CvrBuilder, CvrDiff, Fingerprint, CLIENTS_COLLECTION,
    PROGRESS_COLLECTION,
};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{ClientGroupId, ClientId, CvrId, ProgressId, ProgressKey, PuzzleId, UserId};
pub use messages::{
    Cookie, PatchOp, PullRequest, PullResponse, PushRequest, PushResponse, SyncMessage,
};
pub use mutation::{AnswerArgs, Mutation, MutationKind, MutationName, Position, MAX_ANSWER_LEN};
pub use progress::{FieldValue, ProgressData};
