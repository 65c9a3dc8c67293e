//! Domain layer: pure game rules and types. Nothing here does I/O.

pub mod cards;
pub mod code;
pub mod grid;
pub mod kick_vote;
pub mod player;
pub mod scoring;
pub mod settings;
pub mod state;
pub mod turns;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-exports for ergonomics
pub use cards::{Card, CardId};
pub use code::GameCode;
pub use grid::{Grid, Position};
pub use kick_vote::{KickVote, KickVoteStatus};
pub use player::{ConnectionStatus, Player, PlayerId, PlayerProfile, ScoreEntry};
pub use settings::{FirstPlayerPenaltyType, GameSettings, SettingsUpdate};
pub use state::{Game, GameStatus, LastTurnStatus, PileSource, RoundStatus, TurnPhase};
pub use turns::{PlayAction, TurnOutcome};
