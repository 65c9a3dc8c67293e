//! A client-side replica of a game, kept in sync by applying operations.
//!
//! The server never needs this to serve traffic; it defines what "applying
//! an operation" means and lets tests check that the diff protocol
//! converges on the authoritative state.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::game_state::GameView;
use crate::sync::operation::Operation;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplicaError {
    /// The operation does not follow the replica's version; resync needed.
    #[error("expected version {expected}, got {got}")]
    VersionGap { expected: u64, got: u64 },
    #[error("replica state is not an object")]
    Malformed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Replica {
    version: u64,
    state: Map<String, Value>,
}

impl Replica {
    pub fn from_snapshot(view: &GameView, version: u64) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(view)? {
            Value::Object(state) => Ok(Self { version, state }),
            _ => Ok(Self {
                version,
                state: Map::new(),
            }),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Apply `op` stamped with `version`. Only `self.version + 1` is accepted.
    pub fn apply(&mut self, op: &Operation, version: u64) -> Result<(), ReplicaError> {
        let expected = self.version + 1;
        if version != expected {
            return Err(ReplicaError::VersionGap {
                expected,
                got: version,
            });
        }

        if let Some(fields) = &op.game {
            merge(&mut self.state, fields);
        }
        if let Some(fields) = &op.settings {
            let settings = self
                .state
                .entry("settings")
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or(ReplicaError::Malformed)?;
            merge(settings, fields);
        }

        let players = self
            .state
            .entry("players")
            .or_insert_with(|| Value::Array(Vec::new()))
            .as_array_mut()
            .ok_or(ReplicaError::Malformed)?;

        if let Some(removed) = &op.remove_players {
            players.retain(|p| {
                p.get("id")
                    .and_then(Value::as_str)
                    .map_or(true, |id| !removed.iter().any(|r| r == id))
            });
        }
        if let Some(updates) = &op.update_players {
            for update in updates {
                let id = update.get("id").and_then(Value::as_str);
                let target = players
                    .iter_mut()
                    .filter_map(Value::as_object_mut)
                    .find(|p| p.get("id").and_then(Value::as_str) == id);
                if let Some(target) = target {
                    merge(target, update);
                }
            }
        }
        if let Some(added) = &op.add_players {
            players.extend(added.iter().cloned());
        }

        self.version = version;
        Ok(())
    }
}

/// Last write wins per field.
fn merge(target: &mut Map<String, Value>, fields: &Map<String, Value>) {
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
}
