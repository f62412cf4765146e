//! Stored rows: clients, client groups and progress.

use serde::{Deserialize, Serialize};
use tessera_protocol::{
    ClientGroupId, ClientId, Fingerprint, ProgressData, ProgressId, ProgressKey, PuzzleId, UserId,
    CLIENTS_COLLECTION, PROGRESS_COLLECTION,
};

/// A device-local client and its mutation ledger position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    /// Client ID.
    pub id: ClientId,
    /// Group the client belongs to.
    pub client_group_id: ClientGroupId,
    /// ID of the last mutation applied for this client. Gapless, starts at 0.
    pub last_mutation_id: u64,
}

impl ClientRecord {
    /// Creates a client that has applied nothing yet.
    pub fn new(id: ClientId, client_group_id: ClientGroupId) -> Self {
        Self {
            id,
            client_group_id,
            last_mutation_id: 0,
        }
    }

    /// The mutation ID this client must submit next.
    #[must_use]
    pub fn expected_mutation_id(&self) -> u64 {
        self.last_mutation_id + 1
    }
}

impl Fingerprint for ClientRecord {
    fn collection(&self) -> &'static str {
        CLIENTS_COLLECTION
    }

    fn cvr_key(&self) -> String {
        self.id.to_string()
    }

    fn cvr_version(&self) -> u64 {
        self.last_mutation_id
    }
}

/// A client group, owned by exactly one user for its whole life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGroupRecord {
    /// Group ID.
    pub id: ClientGroupId,
    /// Owning user.
    pub user_id: UserId,
    /// Advanced only when a pull yields a non-empty patch.
    pub cvr_version: u64,
}

impl ClientGroupRecord {
    /// Creates a group owned by `user_id`.
    pub fn new(id: ClientGroupId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            cvr_version: 0,
        }
    }

    /// Returns true if `user_id` owns this group.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}

/// Puzzle progress for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Row ID.
    pub id: ProgressId,
    /// Owning user.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Puzzle this progress belongs to.
    #[serde(rename = "puzzleID")]
    pub puzzle_id: PuzzleId,
    /// Bumped on every write; assigned by the store.
    pub version: u64,
    /// Field-level LWW data.
    pub data: ProgressData,
}

impl ProgressRecord {
    /// Creates a fresh row seeded from puzzle defaults, at version 0.
    pub fn seeded(key: &ProgressKey, defaults: ProgressData) -> Self {
        Self {
            id: ProgressId::new(),
            user_id: key.user_id.clone(),
            puzzle_id: key.puzzle_id.clone(),
            version: 0,
            data: defaults,
        }
    }

    /// Returns the (user, puzzle) key.
    #[must_use]
    pub fn key(&self) -> ProgressKey {
        ProgressKey::new(self.user_id.clone(), self.puzzle_id.clone())
    }
}

impl Fingerprint for ProgressRecord {
    fn collection(&self) -> &'static str {
        PROGRESS_COLLECTION
    }

    fn cvr_key(&self) -> String {
        self.id.to_string()
    }

    fn cvr_version(&self) -> u64 {
        self.version
    }
}
