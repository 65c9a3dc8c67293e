//! Per-game rule settings, adjustable by the admin while in the lobby.

use serde::{Deserialize, Serialize};

use crate::domain::code::GameCode;
use crate::errors::domain::DomainError;

pub const MIN_PLAYERS: usize = 2;
pub const MAX_PLAYERS: u8 = 8;

/// How the first player to finish a round is penalised when they did not
/// score strictly lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FirstPlayerPenaltyType {
    MultiplierOnly,
    FlatOnly,
    MultiplierThenFlat,
    FlatThenMultiplier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub private: bool,
    pub max_players: u8,
    pub allow_skyjo_for_column: bool,
    pub allow_skyjo_for_row: bool,
    pub initial_turned_count: u8,
    /// Cards per row, i.e. number of columns.
    pub card_per_row: u8,
    /// Cards per column, i.e. number of rows.
    pub card_per_column: u8,
    pub score_to_end_game: i32,
    pub multiplier_for_first_player: i32,
    pub first_player_penalty_type: FirstPlayerPenaltyType,
    pub first_player_flat_penalty: i32,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            private: false,
            max_players: MAX_PLAYERS,
            allow_skyjo_for_column: true,
            allow_skyjo_for_row: false,
            initial_turned_count: 2,
            card_per_row: 4,
            card_per_column: 3,
            score_to_end_game: 100,
            multiplier_for_first_player: 2,
            first_player_penalty_type: FirstPlayerPenaltyType::MultiplierOnly,
            first_player_flat_penalty: 0,
        }
    }
}

/// Partial settings sent by the admin; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub private: Option<bool>,
    pub max_players: Option<u8>,
    pub allow_skyjo_for_column: Option<bool>,
    pub allow_skyjo_for_row: Option<bool>,
    pub initial_turned_count: Option<u8>,
    pub card_per_row: Option<u8>,
    pub card_per_column: Option<u8>,
    pub score_to_end_game: Option<i32>,
    pub multiplier_for_first_player: Option<i32>,
    pub first_player_penalty_type: Option<FirstPlayerPenaltyType>,
    pub first_player_flat_penalty: Option<i32>,
}

impl GameSettings {
    pub fn grid_size(&self) -> usize {
        self.card_per_row as usize * self.card_per_column as usize
    }

    /// Returns the settings with `update` applied, or `NotAllowed` if the
    /// result is out of range. `player_count` bounds `maxPlayers` from below.
    pub fn merged(
        &self,
        code: &GameCode,
        update: &SettingsUpdate,
        player_count: usize,
    ) -> Result<GameSettings, DomainError> {
        let mut next = self.clone();
        if let Some(v) = update.private {
            next.private = v;
        }
        if let Some(v) = update.max_players {
            next.max_players = v;
        }
        if let Some(v) = update.allow_skyjo_for_column {
            next.allow_skyjo_for_column = v;
        }
        if let Some(v) = update.allow_skyjo_for_row {
            next.allow_skyjo_for_row = v;
        }
        if let Some(v) = update.initial_turned_count {
            next.initial_turned_count = v;
        }
        if let Some(v) = update.card_per_row {
            next.card_per_row = v;
        }
        if let Some(v) = update.card_per_column {
            next.card_per_column = v;
        }
        if let Some(v) = update.score_to_end_game {
            next.score_to_end_game = v;
        }
        if let Some(v) = update.multiplier_for_first_player {
            next.multiplier_for_first_player = v;
        }
        if let Some(v) = update.first_player_penalty_type {
            next.first_player_penalty_type = v;
        }
        if let Some(v) = update.first_player_flat_penalty {
            next.first_player_flat_penalty = v;
        }
        next.validate(code, player_count)?;
        Ok(next)
    }

    fn validate(&self, code: &GameCode, player_count: usize) -> Result<(), DomainError> {
        let reject = |detail: &str| Err(DomainError::not_allowed(code, detail));

        if !(MIN_PLAYERS as u8..=MAX_PLAYERS).contains(&self.max_players) {
            return reject("maxPlayers must be between 2 and 8");
        }
        if (self.max_players as usize) < player_count {
            return reject("maxPlayers is below the current player count");
        }
        if !(1..=6).contains(&self.card_per_row) || !(1..=6).contains(&self.card_per_column) {
            return reject("grid dimensions must be between 1 and 6");
        }
        // The deck must cover every grid plus the first discard.
        if self.grid_size() * self.max_players as usize + 1 > crate::domain::cards::DECK_SIZE {
            return reject("grid too large for the deck");
        }
        if !(1..=self.grid_size()).contains(&(self.initial_turned_count as usize)) {
            return reject("initialTurnedCount must be between 1 and the grid size");
        }
        if !(1..=1000).contains(&self.score_to_end_game) {
            return reject("scoreToEndGame must be between 1 and 1000");
        }
        if !(1..=10).contains(&self.multiplier_for_first_player) {
            return reject("multiplierForFirstPlayer must be between 1 and 10");
        }
        if !(0..=100).contains(&self.first_player_flat_penalty) {
            return reject("firstPlayerFlatPenalty must be between 0 and 100");
        }
        Ok(())
    }

    /// Penalised round score for the first finisher.
    pub fn apply_first_player_penalty(&self, score: i32) -> i32 {
        let m = self.multiplier_for_first_player;
        let flat = self.first_player_flat_penalty;
        match self.first_player_penalty_type {
            FirstPlayerPenaltyType::MultiplierOnly => score * m,
            FirstPlayerPenaltyType::FlatOnly => score + flat,
            FirstPlayerPenaltyType::MultiplierThenFlat => score * m + flat,
            FirstPlayerPenaltyType::FlatThenMultiplier => (score + flat) * m,
        }
    }
}
