//! Version-stamped operation diffs between consecutive game states.

pub mod operation;
pub mod replica;

#[cfg(test)]
mod tests_props_sync;

use time::OffsetDateTime;

use crate::domain::state::Game;
use crate::protocol::game_state::GameView;
pub use operation::Operation;
pub use replica::{Replica, ReplicaError};

/// A committed mutation: the new version and what changed to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub version: u64,
    pub operation: Operation,
}

/// Stamp `after` with the next version and diff it against `before`.
/// Returns `None` (and leaves `after` unstamped) when nothing changed.
pub fn stamp(
    before: &Game,
    after: &mut Game,
    now: OffsetDateTime,
) -> Result<Option<Commit>, serde_json::Error> {
    if after.same_state_as(before) {
        return Ok(None);
    }
    let operation = Operation::between(&GameView::from(before), &GameView::from(&*after))?;
    after.version = before.version + 1;
    after.updated_at = now;
    Ok(Some(Commit {
        version: after.version,
        operation,
    }))
}
