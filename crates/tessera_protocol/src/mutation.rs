//! Client mutations.
//!
//! A [`Mutation`] is what travels on the wire: an ordered id, the submitting
//! client, a name drawn from the closed [`MutationName`] set, and untyped
//! JSON arguments. [`Mutation::kind`] parses the arguments into a strongly
//! typed [`MutationKind`]; a parse failure is a validation error that the
//! push processor recovers from by committing bookkeeping only.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::ClientId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum length, in characters, of a single cell answer.
pub const MAX_ANSWER_LEN: usize = 32;

/// The closed set of mutation names accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MutationName {
    /// Record elapsed solve time.
    SetTime,
    /// Move the player character.
    SetCharacterPosition,
    /// Fill in a puzzle cell.
    SetAnswer,
    /// Reset every field to the puzzle defaults.
    ResetProgress,
}

impl MutationName {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationName::SetTime => "setTime",
            MutationName::SetCharacterPosition => "setCharacterPosition",
            MutationName::SetAnswer => "setAnswer",
            MutationName::ResetProgress => "resetProgress",
        }
    }
}

/// A mutation as submitted in a push request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Per-client sequence number, starting at 1.
    pub id: u64,
    /// Client that created the mutation.
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    /// Mutation kind.
    pub name: MutationName,
    /// Raw arguments, validated by [`Mutation::kind`].
    #[serde(default)]
    pub args: Value,
    /// Client clock in milliseconds, used for field-level last-write-wins.
    #[serde(default)]
    pub timestamp: u64,
}

impl Mutation {
    /// Creates a mutation.
    pub fn new(id: u64, client_id: impl Into<ClientId>, name: MutationName, args: Value) -> Self {
        Self {
            id,
            client_id: client_id.into(),
            name,
            args,
            timestamp: 0,
        }
    }

    /// Sets the client timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Parses the arguments into a typed mutation.
    pub fn kind(&self) -> ProtocolResult<MutationKind> {
        MutationKind::parse(self.name, &self.args)
    }
}

/// Character position in puzzle space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

/// Arguments of `setAnswer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerArgs {
    /// Cell identifier, e.g. `A1`.
    pub cell: String,
    /// Answer text; empty clears the cell.
    pub value: String,
}

/// A mutation with validated, typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    /// Elapsed time in whole seconds.
    SetTime(u64),
    /// New character position.
    SetCharacterPosition(Position),
    /// Cell answer.
    SetAnswer(AnswerArgs),
    /// Reset to puzzle defaults.
    ResetProgress,
}

impl MutationKind {
    /// Parses and validates arguments for the named mutation.
    pub fn parse(name: MutationName, args: &Value) -> ProtocolResult<Self> {
        let invalid = |message: String| ProtocolError::invalid_args(name.as_str(), message);

        match name {
            MutationName::SetTime => {
                let seconds = args
                    .as_u64()
                    .ok_or_else(|| invalid(format!("expected a non-negative integer, got {args}")))?;
                Ok(MutationKind::SetTime(seconds))
            }
            MutationName::SetCharacterPosition => {
                let position: Position =
                    serde_json::from_value(args.clone()).map_err(|e| invalid(e.to_string()))?;
                if ![position.x, position.y, position.z]
                    .iter()
                    .all(|c| c.is_finite())
                {
                    return Err(invalid("coordinates must be finite".into()));
                }
                Ok(MutationKind::SetCharacterPosition(position))
            }
            MutationName::SetAnswer => {
                let answer: AnswerArgs =
                    serde_json::from_value(args.clone()).map_err(|e| invalid(e.to_string()))?;
                if answer.cell.is_empty() {
                    return Err(invalid("cell must not be empty".into()));
                }
                if answer.value.chars().count() > MAX_ANSWER_LEN {
                    return Err(invalid(format!(
                        "answer longer than {MAX_ANSWER_LEN} characters"
                    )));
                }
                Ok(MutationKind::SetAnswer(answer))
            }
            MutationName::ResetProgress => match args {
                Value::Null => Ok(MutationKind::ResetProgress),
                Value::Object(map) if map.is_empty() => Ok(MutationKind::ResetProgress),
                other => Err(invalid(format!("expected no arguments, got {other}"))),
            },
        }
    }

    /// Returns the wire name of this mutation.
    #[must_use]
    pub fn name(&self) -> MutationName {
        match self {
            MutationKind::SetTime(_) => MutationName::SetTime,
            MutationKind::SetCharacterPosition(_) => MutationName::SetCharacterPosition,
            MutationKind::SetAnswer(_) => MutationName::SetAnswer,
            MutationKind::ResetProgress => MutationName::ResetProgress,
        }
    }
}
