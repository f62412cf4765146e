//! Per-connection sync context.

use std::time::SystemTime;
use tessera_protocol::{ProgressKey, PuzzleId, UserId};

/// The resolved identity and target puzzle of one client connection.
///
/// Built once by [`SyncServer::connect`](crate::SyncServer::connect) and
/// passed explicitly to every push and pull on that connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSession {
    user: UserId,
    puzzle: PuzzleId,
    connected_at: SystemTime,
}

impl SyncSession {
    /// Creates a session for an already-resolved user.
    pub fn new(user: UserId, puzzle: PuzzleId) -> Self {
        Self {
            user,
            puzzle,
            connected_at: SystemTime::now(),
        }
    }

    /// The authenticated user.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// The puzzle this connection syncs.
    pub fn puzzle(&self) -> &PuzzleId {
        &self.puzzle
    }

    /// When the session was established.
    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// Key of the progress row this session reads and writes.
    pub fn progress_key(&self) -> ProgressKey {
        ProgressKey::new(self.user.clone(), self.puzzle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_key_pairs_user_and_puzzle() {
        let session = SyncSession::new("alice".into(), "p1".into());
        let key = session.progress_key();
        assert_eq!(key.user_id, UserId::new("alice"));
        assert_eq!(key.puzzle_id, PuzzleId::new("p1"));
        assert!(session.connected_at() <= SystemTime::now());
    }
}
