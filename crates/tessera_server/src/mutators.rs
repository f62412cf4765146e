//! Mutators: pure state transitions over progress data.

use crate::error::{ServerError, ServerResult};
use serde_json::json;
use tessera_protocol::progress::{answer_field, CHARACTER_POSITION_FIELD, TIME_FIELD};
use tessera_protocol::{MutationKind, ProgressData};

/// Applies a mutation to `data` with field-level last-write-wins.
///
/// `defaults` are the puzzle's seed values, needed by `resetProgress`.
/// Returns whether any field changed. A [`ServerError::Validation`] means
/// the mutation must be discarded and nothing in `data` was modified.
pub fn apply(
    kind: &MutationKind,
    data: &mut ProgressData,
    timestamp: u64,
    defaults: Option<&ProgressData>,
) -> ServerResult<bool> {
    match kind {
        MutationKind::SetTime(seconds) => Ok(data.set(TIME_FIELD, json!(seconds), timestamp)),
        MutationKind::SetCharacterPosition(position) => Ok(data.set(
            CHARACTER_POSITION_FIELD,
            json!({ "x": position.x, "y": position.y, "z": position.z }),
            timestamp,
        )),
        MutationKind::SetAnswer(answer) => {
            let field = answer_field(&answer.cell);
            if !data.contains(&field) {
                return Err(ServerError::Validation(format!(
                    "unknown cell {:?}",
                    answer.cell
                )));
            }
            Ok(data.set(field, json!(answer.value), timestamp))
        }
        MutationKind::ResetProgress => {
            let defaults = defaults
                .ok_or_else(|| ServerError::validation("puzzle defaults unavailable"))?;
            let mut changed = false;
            for (field, seed) in defaults.iter() {
                changed |= data.set(field, seed.value.clone(), timestamp);
            }
            let extra: Vec<String> = data
                .fields()
                .filter(|field| !defaults.contains(field))
                .map(str::to_owned)
                .collect();
            for field in extra {
                changed |= data.remove(&field, timestamp);
            }
            Ok(changed)
        }
    }
}
