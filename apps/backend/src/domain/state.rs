//! The game aggregate: players, piles, settings, turn/phase state and the
//! version counter. Rule operations live in `turns` and `scoring`; this
//! module holds the types and the lobby/membership lifecycle.

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::cards::Card;
use crate::domain::code::GameCode;
use crate::domain::kick_vote::KickVote;
use crate::domain::player::{Player, PlayerId, PlayerProfile, ScoreEntry};
use crate::domain::settings::{GameSettings, SettingsUpdate, MIN_PLAYERS};
use crate::errors::domain::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameStatus {
    Lobby,
    Playing,
    Stopped,
    Finished,
}

/// Sub-phase of the current turn while `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnPhase {
    /// Every player turns `initialTurnedCount` cards before the first turn.
    InitialReveal,
    AwaitingPickOrReveal,
    AwaitingReplaceOrDiscard,
    /// The card came from the discard pile and must go into the grid.
    AwaitingReplace,
    /// The drawn card was discarded; a hidden grid card must be turned.
    AwaitingTurnCard,
    TurnResolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PileSource {
    DrawPile,
    DiscardPile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundStatus {
    Normal,
    /// Someone finished; everyone else has one more turn.
    LastLap,
    Over,
}

/// How the previous turn was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LastTurnStatus {
    Replaced,
    DiscardedAndTurned,
    /// The player disconnected or left while it was their turn.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldCard {
    pub card: Card,
    pub source: PileSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    pub number: u32,
    pub status: RoundStatus,
    pub first_to_finish: Option<PlayerId>,
    /// Starter for the next round once the initial reveal completes.
    pub next_starter: Option<PlayerId>,
}

impl Default for RoundState {
    fn default() -> Self {
        Self {
            number: 0,
            status: RoundStatus::Normal,
            first_to_finish: None,
            next_starter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRoundScore {
    pub player_id: PlayerId,
    pub score: ScoreEntry,
}

/// Outcome of the most recently completed round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub number: u32,
    pub first_to_finish: Option<PlayerId>,
    pub scores: Vec<PlayerRoundScore>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub code: GameCode,
    pub status: GameStatus,
    pub settings: GameSettings,
    pub admin_id: PlayerId,
    /// Turn order is sequence order; index order is also join order.
    pub players: Vec<Player>,
    pub(crate) draw_pile: Vec<Card>,
    pub(crate) discard_pile: Vec<Card>,
    pub(crate) selected_card: Option<HeldCard>,
    pub current_player_index: usize,
    pub phase: TurnPhase,
    pub round: RoundState,
    pub last_turn_status: Option<LastTurnStatus>,
    pub previous_round: Option<RoundSummary>,
    pub kick_vote: Option<KickVote>,
    pub version: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Game {
    /// Create a lobby with `creator` as admin and sole player.
    pub fn new(code: GameCode, creator: PlayerProfile, private: bool) -> Self {
        let admin = Player::new(creator);
        let now = OffsetDateTime::now_utc();
        Self {
            code,
            status: GameStatus::Lobby,
            settings: GameSettings {
                private,
                ..GameSettings::default()
            },
            admin_id: admin.id,
            players: vec![admin],
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            selected_card: None,
            current_player_index: 0,
            phase: TurnPhase::InitialReveal,
            round: RoundState::default(),
            last_turn_status: None,
            previous_round: None,
            kick_vote: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == player_id)
    }

    pub(crate) fn player_index(&self, player_id: &PlayerId) -> Result<usize, DomainError> {
        self.players
            .iter()
            .position(|p| &p.id == player_id)
            .ok_or_else(|| DomainError::player_not_found(&self.code, *player_id))
    }

    pub(crate) fn player_mut(&mut self, player_id: &PlayerId) -> Result<&mut Player, DomainError> {
        let idx = self.player_index(player_id)?;
        Ok(&mut self.players[idx])
    }

    pub fn current_player(&self) -> Option<&Player> {
        match self.status {
            GameStatus::Playing if self.phase != TurnPhase::InitialReveal => {
                self.players.get(self.current_player_index)
            }
            _ => None,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected()).count()
    }

    pub fn connected_ids(&self) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|p| p.is_connected())
            .map(|p| p.id)
            .collect()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.settings.max_players as usize
    }

    /// Top of the discard pile, always face up.
    pub fn discard_top(&self) -> Option<&Card> {
        self.discard_pile.last()
    }

    pub fn selected_card(&self) -> Option<&HeldCard> {
        self.selected_card.as_ref()
    }

    /// True when nothing but the store bookkeeping differs.
    pub fn same_state_as(&self, other: &Game) -> bool {
        let mut a = self.clone();
        a.version = other.version;
        a.updated_at = other.updated_at;
        &a == other
    }

    pub fn add_player(&mut self, profile: PlayerProfile) -> Result<PlayerId, DomainError> {
        if self.status != GameStatus::Lobby {
            return Err(DomainError::GameAlreadyStarted {
                code: self.code.clone(),
            });
        }
        if self.is_full() {
            return Err(DomainError::GameIsFull {
                code: self.code.clone(),
            });
        }
        let player = Player::new(profile);
        let id = player.id;
        self.players.push(player);
        Ok(id)
    }

    fn require_admin(&self, player_id: &PlayerId) -> Result<(), DomainError> {
        self.player_index(player_id)?;
        if &self.admin_id != player_id {
            return Err(DomainError::not_allowed(
                &self.code,
                "only the admin can do this",
            ));
        }
        Ok(())
    }

    pub fn update_settings(
        &mut self,
        player_id: &PlayerId,
        update: &SettingsUpdate,
    ) -> Result<(), DomainError> {
        self.require_admin(player_id)?;
        if self.status != GameStatus::Lobby {
            return Err(DomainError::GameAlreadyStarted {
                code: self.code.clone(),
            });
        }
        self.settings = self
            .settings
            .merged(&self.code, update, self.players.len())?;
        Ok(())
    }

    pub fn start<R: Rng + ?Sized>(
        &mut self,
        player_id: &PlayerId,
        rng: &mut R,
    ) -> Result<(), DomainError> {
        self.require_admin(player_id)?;
        if self.status != GameStatus::Lobby {
            return Err(DomainError::GameAlreadyStarted {
                code: self.code.clone(),
            });
        }
        if self.connected_count() < MIN_PLAYERS {
            return Err(DomainError::TooFewPlayers {
                code: self.code.clone(),
            });
        }
        self.status = GameStatus::Playing;
        self.round = RoundState::default();
        self.previous_round = None;
        self.last_turn_status = None;
        self.start_round(rng);
        Ok(())
    }

    /// Opt in to a replay; once every connected player has, the game returns
    /// to the lobby with the same players.
    pub fn request_replay(&mut self, player_id: &PlayerId) -> Result<(), DomainError> {
        if self.status != GameStatus::Finished {
            return Err(DomainError::not_allowed(
                &self.code,
                "replay is only possible once the game is finished",
            ));
        }
        self.player_mut(player_id)?.wants_replay = true;
        self.reset_if_everyone_replays();
        Ok(())
    }

    fn reset_if_everyone_replays(&mut self) {
        let connected: Vec<&Player> = self.players.iter().filter(|p| p.is_connected()).collect();
        if connected.is_empty() || !connected.iter().all(|p| p.wants_replay) {
            return;
        }
        self.players.iter_mut().for_each(Player::reset_for_replay);
        self.status = GameStatus::Lobby;
        self.draw_pile.clear();
        self.discard_pile.clear();
        self.selected_card = None;
        self.current_player_index = 0;
        self.phase = TurnPhase::InitialReveal;
        self.round = RoundState::default();
        self.last_turn_status = None;
        self.previous_round = None;
        self.kick_vote = None;
    }

    /// Remove a player for good (leave, kick, grace expiry).
    pub fn remove_player<R: Rng + ?Sized>(
        &mut self,
        player_id: &PlayerId,
        rng: &mut R,
    ) -> Result<Player, DomainError> {
        let idx = self.player_index(player_id)?;
        let in_turn = self.status == GameStatus::Playing && self.phase != TurnPhase::InitialReveal;
        let was_current = in_turn && idx == self.current_player_index;

        if was_current {
            self.drop_selected_card();
            self.last_turn_status = Some(LastTurnStatus::Skipped);
        }

        let mut removed = self.players.remove(idx);
        removed.connection_status = crate::domain::player::ConnectionStatus::Leaving;

        if self.admin_id == removed.id {
            if let Some(next_admin) = self.players.first() {
                self.admin_id = next_admin.id;
            }
        }
        if self
            .kick_vote
            .as_ref()
            .is_some_and(|vote| vote.target_id == removed.id)
        {
            self.kick_vote = None;
        }

        if self.players.is_empty() {
            self.current_player_index = 0;
            if self.status == GameStatus::Playing {
                self.status = GameStatus::Stopped;
            }
            return Ok(removed);
        }

        if idx < self.current_player_index {
            self.current_player_index -= 1;
        } else if self.current_player_index >= self.players.len() {
            self.current_player_index = 0;
        }

        match self.status {
            GameStatus::Playing if self.players.len() < MIN_PLAYERS => {
                self.status = GameStatus::Stopped;
            }
            GameStatus::Playing if self.phase == TurnPhase::InitialReveal => {
                self.complete_initial_reveal_if_ready();
            }
            GameStatus::Playing if was_current => {
                // The player now sitting at `idx` is the first candidate.
                let from = (idx + self.players.len() - 1) % self.players.len();
                self.advance_turn_from(from, rng);
            }
            GameStatus::Finished => self.reset_if_everyone_replays(),
            _ => {}
        }
        Ok(removed)
    }

    /// Transport-level disconnect: the seat is kept for the grace period.
    pub fn mark_disconnected<R: Rng + ?Sized>(
        &mut self,
        player_id: &PlayerId,
        now: OffsetDateTime,
        rng: &mut R,
    ) -> Result<(), DomainError> {
        let idx = self.player_index(player_id)?;
        if !self.players[idx].is_connected() {
            return Ok(());
        }
        self.players[idx].mark_disconnected(now);

        if self.status != GameStatus::Playing {
            return Ok(());
        }
        if self.phase == TurnPhase::InitialReveal {
            self.complete_initial_reveal_if_ready();
        } else if idx == self.current_player_index {
            self.drop_selected_card();
            self.last_turn_status = Some(LastTurnStatus::Skipped);
            if self.round.status == RoundStatus::LastLap {
                self.players[idx].has_played_last_turn = true;
            }
            self.advance_turn_from(idx, rng);
        }
        Ok(())
    }

    /// Rebind a returning player. Fails with `CannotReconnect` when the seat
    /// is gone.
    pub fn mark_reconnected(&mut self, player_id: &PlayerId) -> Result<(), DomainError> {
        let idx = self
            .player_index(player_id)
            .map_err(|_| DomainError::CannotReconnect {
                code: self.code.clone(),
                player_id: *player_id,
            })?;
        self.players[idx].mark_connected();
        if self.status == GameStatus::Playing {
            self.normalize_current_player();
        }
        Ok(())
    }

    /// A held card goes back on the discard pile when its holder loses the turn.
    pub(crate) fn drop_selected_card(&mut self) {
        if let Some(held) = self.selected_card.take() {
            self.discard_pile.push(held.card.into_visible());
        }
    }
}
