//! WebSocket wire format: `{"event": "<name>", "data": <payload>}` frames.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::grid::Position;
use crate::domain::kick_vote::KickVoteStatus;
use crate::domain::player::{PlayerId, PlayerProfile};
use crate::domain::settings::SettingsUpdate;
use crate::domain::state::PileSource;
use crate::errors::ErrorCode;
use crate::protocol::game_state::{GameView, ViewerState};
use crate::sync::Operation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub game_code: String,
    pub player: PlayerProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRequest {
    pub position: Position,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickRequest {
    pub source: PileSource,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all_fields = "camelCase")]
pub enum ClientMsg {
    #[serde(rename = "create-private")]
    CreatePrivate(PlayerProfile),
    #[serde(rename = "find")]
    Find(PlayerProfile),
    #[serde(rename = "join")]
    Join(JoinRequest),
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "settings:update")]
    UpdateSettings(SettingsUpdate),
    #[serde(rename = "play:reveal-card")]
    RevealCard(PositionRequest),
    #[serde(rename = "play:pick-card")]
    PickCard(PickRequest),
    #[serde(rename = "play:replace-card")]
    ReplaceCard(PositionRequest),
    #[serde(rename = "play:discard-selected-card")]
    DiscardSelectedCard {
        #[serde(default)]
        version: Option<u64>,
    },
    #[serde(rename = "play:turn-card")]
    TurnCard(PositionRequest),
    #[serde(rename = "replay")]
    Replay {
        #[serde(default)]
        version: Option<u64>,
    },
    /// Last version the client holds, or `null` on first load.
    #[serde(rename = "get")]
    Get(Option<u64>),
    #[serde(rename = "kick:initiate-vote")]
    InitiateKickVote { target_id: PlayerId },
    #[serde(rename = "kick:vote")]
    KickVote { vote: bool },
    #[serde(rename = "reconnect")]
    Reconnect {
        game_code: String,
        player_id: PlayerId,
    },
    #[serde(rename = "leave")]
    Leave,
    /// Any `username` sent alongside is ignored; chat carries the seat name.
    #[serde(rename = "message")]
    Message { text: String },
}

impl ClientMsg {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreatePrivate(_) => "create-private",
            Self::Find(_) => "find",
            Self::Join(_) => "join",
            Self::Start => "start",
            Self::UpdateSettings(_) => "settings:update",
            Self::RevealCard(_) => "play:reveal-card",
            Self::PickCard(_) => "play:pick-card",
            Self::ReplaceCard(_) => "play:replace-card",
            Self::DiscardSelectedCard { .. } => "play:discard-selected-card",
            Self::TurnCard(_) => "play:turn-card",
            Self::Replay { .. } => "replay",
            Self::Get(_) => "get",
            Self::InitiateKickVote { .. } => "kick:initiate-vote",
            Self::KickVote { .. } => "kick:vote",
            Self::Reconnect { .. } => "reconnect",
            Self::Leave => "leave",
            Self::Message { .. } => "message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub game: GameView,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    pub operation: Operation,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KickVoteView {
    pub id: Uuid,
    pub target_id: PlayerId,
    pub initiator_id: PlayerId,
    pub yes: usize,
    pub required: usize,
    pub status: KickVoteStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemEvent {
    PlayerJoined,
    PlayerLeft,
    PlayerDisconnected,
    PlayerReconnected,
    PlayerKicked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemMessage {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event: SystemEvent,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerNotice {
    pub id: Uuid,
    pub text: String,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMsg {
    #[serde(rename = "game")]
    Game(GameSnapshot),
    #[serde(rename = "game:update")]
    GameUpdate(GameUpdate),
    #[serde(rename = "error:join")]
    JoinError(ErrorPayload),
    #[serde(rename = "error:reconnect")]
    ReconnectError(ErrorPayload),
    #[serde(rename = "error")]
    Error(ErrorPayload),
    #[serde(rename = "kick:vote")]
    KickVote(KickVoteView),
    #[serde(rename = "kick:vote-success")]
    KickVoteSuccess(KickVoteView),
    #[serde(rename = "kick:vote-failed")]
    KickVoteFailed(KickVoteView),
    #[serde(rename = "message")]
    Message(ChatMessage),
    #[serde(rename = "message:system")]
    SystemMessage(SystemMessage),
    #[serde(rename = "message:server")]
    ServerNotice(ServerNotice),
    #[serde(rename = "leave:success")]
    LeaveSuccess,
}
