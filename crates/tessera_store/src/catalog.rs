//! Puzzle content reader.
//!
//! Progress rows are seeded from the puzzle's default field values the first
//! time a user touches a puzzle. The catalog itself is owned elsewhere; this
//! module only defines the read interface and an in-memory implementation.

use crate::error::StoreResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use tessera_protocol::{ProgressData, PuzzleId};

/// Supplies default progress data for puzzles.
pub trait PuzzleCatalog: Send + Sync {
    /// Returns the seed data for a puzzle, or `None` if the puzzle is unknown.
    fn defaults(&self, puzzle: &PuzzleId) -> StoreResult<Option<ProgressData>>;
}

/// In-memory puzzle catalog.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    puzzles: RwLock<HashMap<PuzzleId, ProgressData>>,
}

impl MemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a puzzle, builder style.
    #[must_use]
    pub fn with_puzzle(self, puzzle: impl Into<PuzzleId>, defaults: ProgressData) -> Self {
        self.insert(puzzle, defaults);
        self
    }

    /// Adds or replaces a puzzle.
    pub fn insert(&self, puzzle: impl Into<PuzzleId>, defaults: ProgressData) {
        self.puzzles.write().insert(puzzle.into(), defaults);
    }

    /// Returns the number of puzzles.
    pub fn len(&self) -> usize {
        self.puzzles.read().len()
    }

    /// Returns true if the catalog has no puzzles.
    pub fn is_empty(&self) -> bool {
        self.puzzles.read().is_empty()
    }
}

impl PuzzleCatalog for MemoryCatalog {
    fn defaults(&self, puzzle: &PuzzleId) -> StoreResult<Option<ProgressData>> {
        Ok(self.puzzles.read().get(puzzle).cloned())
    }
}
