//! Identifier types shared by every sync component.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Stable identity of an authenticated user.
    UserId
);

string_id!(
    /// Identifier of a single device-local client.
    ClientId
);

string_id!(
    /// Identifier of a client group (one user's devices sharing a CVR history).
    ClientGroupId
);

string_id!(
    /// Identifier of a puzzle in the content catalog.
    PuzzleId
);

/// Identifier of a progress row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProgressId(Uuid);

impl ProgressId {
    /// Creates a new random progress ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a hyphenated UUID string.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Returns the patch key for this progress row (`progress/<id>`).
    #[must_use]
    pub fn patch_key(&self) -> String {
        format!("{}/{}", crate::cvr::PROGRESS_COLLECTION, self.0)
    }
}

impl Default for ProgressId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgressId({})", self.0)
    }
}

impl fmt::Display for ProgressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a stored CVR snapshot, carried in pull cookies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CvrId(String);

impl CvrId {
    /// Generates a fresh, unguessable snapshot ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an ID received from a client cookie.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CvrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Natural key of a progress row: one row per (user, puzzle).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgressKey {
    /// Owning user.
    pub user_id: UserId,
    /// Puzzle the progress belongs to.
    pub puzzle_id: PuzzleId,
}

impl ProgressKey {
    /// Creates a progress key.
    pub fn new(user_id: UserId, puzzle_id: PuzzleId) -> Self {
        Self { user_id, puzzle_id }
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.puzzle_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_serialize_transparently() {
        let id = ClientId::new("device-a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"device-a\"");
        assert_eq!(id.to_string(), "device-a");
    }

    #[test]
    fn progress_patch_key() {
        let id = ProgressId::parse("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(id.patch_key(), "progress/67e55044-10b1-426f-9247-bb680e5fe0c8");
    }

    #[test]
    fn cvr_ids_are_unique() {
        assert_ne!(CvrId::generate(), CvrId::generate());
    }
}
