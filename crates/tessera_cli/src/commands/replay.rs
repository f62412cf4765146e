//! Replay command implementation.
//!
//! A script seeds puzzles and lists sync messages, each sent on behalf of a
//! user:
//!
//! ```json
//! {
//!   "puzzles": { "p1": { "time": { "value": 0, "timestamp": 0 } } },
//!   "steps": [
//!     { "user": "alice", "puzzle": "p1",
//!       "message": { "type": "push", "clientGroupID": "g", "mutations": [
//!         { "id": 1, "clientID": "x", "name": "setTime", "args": 120 } ] } },
//!     { "user": "alice", "puzzle": "p1",
//!       "message": { "type": "pull", "clientGroupID": "g", "cookie": null } }
//!   ]
//! }
//! ```
//!
//! Each step's response (or error) is printed as one JSON array.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tessera_protocol::{ProgressData, SyncMessage};
use tessera_server::{Credentials, ServerConfig, SyncServer};
use tessera_store::MemoryCatalog;
use tracing::{debug, info};

/// A replay script.
#[derive(Debug, Deserialize)]
pub struct Script {
    /// Puzzle defaults to seed the catalog with.
    #[serde(default)]
    pub puzzles: BTreeMap<String, ProgressData>,
    /// Messages to send, in order.
    pub steps: Vec<Step>,
}

/// One scripted message.
#[derive(Debug, Deserialize)]
pub struct Step {
    /// User sending the message.
    pub user: String,
    /// Puzzle the session targets.
    pub puzzle: String,
    /// The message.
    pub message: SyncMessage,
}

/// Result of one step.
#[derive(Debug, Serialize)]
pub struct StepResult {
    /// Step index, from 0.
    pub step: usize,
    /// Server reply, if the step succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<SyncMessage>,
    /// Error message, if the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Loads a script from disk.
pub fn load(path: &Path) -> Result<Script, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("cannot read script {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}

/// Runs every step against a fresh in-memory server.
pub fn replay(script: Script) -> Vec<StepResult> {
    let catalog = MemoryCatalog::new();
    for (puzzle, defaults) in script.puzzles {
        catalog.insert(puzzle, defaults);
    }
    let server = SyncServer::in_memory(ServerConfig::default(), Arc::new(catalog));

    script
        .steps
        .into_iter()
        .enumerate()
        .map(|(step, Step { user, puzzle, message })| {
            let result = server
                .connect(&Credentials::User(user.into()), puzzle.into())
                .and_then(|session| server.handle_message(&session, message));
            match result {
                Ok(response) => StepResult {
                    step,
                    response: Some(response),
                    error: None,
                },
                Err(e) => {
                    debug!(step, error = %e, "step failed");
                    StepResult {
                        step,
                        response: None,
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect()
}

/// Runs the replay command.
pub fn run(path: &Path, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let script = load(path)?;
    info!(steps = script.steps.len(), "replaying script");
    let results = replay(script);
    let output = if pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };
    println!("{output}");
    Ok(())
}
