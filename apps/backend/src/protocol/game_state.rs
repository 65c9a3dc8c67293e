//! Client-facing projection of a game.
//!
//! `GameView` is what every member of the room may see: hidden card values
//! are `null`, piles are reduced to the discard top, and store bookkeeping
//! is left out. Anything private to one player travels in `ViewerState`.

use serde::{Deserialize, Serialize};

use crate::domain::cards::{Card, CardId};
use crate::domain::kick_vote::KickVote;
use crate::domain::player::{ConnectionStatus, Player, PlayerId, ScoreEntry};
use crate::domain::settings::GameSettings;
use crate::domain::state::{
    Game, GameStatus, LastTurnStatus, PileSource, RoundStatus, RoundSummary, TurnPhase,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardView {
    pub id: CardId,
    pub value: Option<i8>,
    pub is_visible: bool,
}

impl From<&Card> for CardView {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id(),
            value: card.public_value(),
            is_visible: card.is_visible(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub connection_status: ConnectionStatus,
    pub score: i32,
    pub scores: Vec<ScoreEntry>,
    /// Column-major.
    pub cards: Vec<Vec<CardView>>,
    pub has_played_last_turn: bool,
    pub wants_replay: bool,
}

impl From<&Player> for PlayerView {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            avatar: player.avatar.clone(),
            connection_status: player.connection_status,
            score: player.score,
            scores: player.score_history().entries().to_vec(),
            cards: player
                .cards
                .columns()
                .iter()
                .map(|column| column.iter().map(CardView::from).collect())
                .collect(),
            has_played_last_turn: player.has_played_last_turn,
            wants_replay: player.wants_replay,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub code: String,
    pub status: GameStatus,
    pub admin_id: PlayerId,
    pub current_player_index: usize,
    pub current_phase: TurnPhase,
    pub round_number: u32,
    pub round_status: RoundStatus,
    pub first_to_finish: Option<PlayerId>,
    pub last_turn_status: Option<LastTurnStatus>,
    pub last_discard_card: Option<CardView>,
    pub previous_round: Option<RoundSummary>,
    /// The pending kick vote, ballots included.
    pub kick_vote: Option<KickVote>,
    pub settings: GameSettings,
    pub players: Vec<PlayerView>,
}

impl From<&Game> for GameView {
    fn from(game: &Game) -> Self {
        Self {
            code: game.code.to_string(),
            status: game.status,
            admin_id: game.admin_id,
            current_player_index: game.current_player_index,
            current_phase: game.phase,
            round_number: game.round.number,
            round_status: game.round.status,
            first_to_finish: game.round.first_to_finish,
            last_turn_status: game.last_turn_status,
            last_discard_card: game.discard_top().map(CardView::from),
            previous_round: game.previous_round.clone(),
            kick_vote: game.kick_vote.clone(),
            settings: game.settings.clone(),
            players: game.players.iter().map(PlayerView::from).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedCardView {
    pub card: CardView,
    pub source: PileSource,
}

/// Viewer-relative context for a specific game snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerState {
    pub player_id: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_card: Option<SelectedCardView>,
}

impl ViewerState {
    /// `None` when `player_id` is not seated in `game`.
    pub fn for_player(game: &Game, player_id: &PlayerId) -> Option<Self> {
        game.player(player_id)?;
        let holds_turn = game
            .current_player()
            .is_some_and(|current| &current.id == player_id);
        let selected_card = game
            .selected_card()
            .filter(|_| holds_turn)
            .map(|held| SelectedCardView {
                card: CardView::from(&held.card),
                source: held.source,
            });
        Some(Self {
            player_id: *player_id,
            selected_card,
        })
    }
}
