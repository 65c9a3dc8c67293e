//! Domain-level error type used by the state machine and the session router.
//!
//! Every variant is recoverable. Errors are returned to the originating
//! connection only and never broadcast; each carries the game code and,
//! where one is involved, the player id.

use thiserror::Error;

use crate::domain::code::GameCode;
use crate::domain::player::PlayerId;
use crate::errors::error_code::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("game {code} not found")]
    GameNotFound { code: GameCode },

    #[error("player {player_id} not found in game {code}")]
    PlayerNotFound { code: GameCode, player_id: PlayerId },

    #[error("not allowed in game {code}: {detail}")]
    NotAllowed { code: GameCode, detail: String },

    #[error("invalid turn state in game {code} for player {player_id}: {detail}")]
    InvalidTurnState {
        code: GameCode,
        player_id: PlayerId,
        detail: String,
    },

    #[error("invalid position in game {code} for player {player_id}: {detail}")]
    InvalidPosition {
        code: GameCode,
        player_id: PlayerId,
        detail: String,
    },

    #[error("too few connected players in game {code}")]
    TooFewPlayers { code: GameCode },

    #[error("player {player_id} cannot reconnect to game {code}")]
    CannotReconnect { code: GameCode, player_id: PlayerId },

    #[error("game {code} is full")]
    GameIsFull { code: GameCode },

    #[error("game {code} has already started")]
    GameAlreadyStarted { code: GameCode },

    #[error("a kick vote is already in progress in game {code}")]
    KickVoteInProgress { code: GameCode },

    #[error("no kick vote in progress in game {code}")]
    NoKickVoteInProgress { code: GameCode },

    #[error("player {player_id} already voted in game {code}")]
    PlayerAlreadyVoted { code: GameCode, player_id: PlayerId },

    /// The connection has not created, joined or reconnected to a game.
    #[error("connection is not bound to a game")]
    NotInGame,

    #[error("too many requests")]
    TooManyRequests,

    /// Store or serialization failure; reported to the client generically.
    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl DomainError {
    pub fn not_allowed(code: &GameCode, detail: impl Into<String>) -> Self {
        Self::NotAllowed {
            code: code.clone(),
            detail: detail.into(),
        }
    }

    pub fn invalid_turn(code: &GameCode, player_id: PlayerId, detail: impl Into<String>) -> Self {
        Self::InvalidTurnState {
            code: code.clone(),
            player_id,
            detail: detail.into(),
        }
    }

    pub fn invalid_position(
        code: &GameCode,
        player_id: PlayerId,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidPosition {
            code: code.clone(),
            player_id,
            detail: detail.into(),
        }
    }

    pub fn player_not_found(code: &GameCode, player_id: PlayerId) -> Self {
        Self::PlayerNotFound {
            code: code.clone(),
            player_id,
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::GameNotFound { .. } => ErrorCode::GameNotFound,
            Self::PlayerNotFound { .. } => ErrorCode::PlayerNotFound,
            Self::NotAllowed { .. } => ErrorCode::NotAllowed,
            Self::InvalidTurnState { .. } => ErrorCode::InvalidTurnState,
            Self::InvalidPosition { .. } => ErrorCode::InvalidPosition,
            Self::TooFewPlayers { .. } => ErrorCode::TooFewPlayers,
            Self::CannotReconnect { .. } => ErrorCode::CannotReconnect,
            Self::GameIsFull { .. } => ErrorCode::GameIsFull,
            Self::GameAlreadyStarted { .. } => ErrorCode::GameAlreadyStarted,
            Self::KickVoteInProgress { .. } => ErrorCode::KickVoteInProgress,
            Self::NoKickVoteInProgress { .. } => ErrorCode::NoKickVoteInProgress,
            Self::PlayerAlreadyVoted { .. } => ErrorCode::PlayerAlreadyVoted,
            Self::NotInGame => ErrorCode::NotAllowed,
            Self::TooManyRequests => ErrorCode::TooManyRequests,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Message safe to send to a client. Internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Internal { .. } => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }

    pub fn game_code(&self) -> Option<&GameCode> {
        match self {
            Self::GameNotFound { code }
            | Self::PlayerNotFound { code, .. }
            | Self::NotAllowed { code, .. }
            | Self::InvalidTurnState { code, .. }
            | Self::InvalidPosition { code, .. }
            | Self::TooFewPlayers { code }
            | Self::CannotReconnect { code, .. }
            | Self::GameIsFull { code }
            | Self::GameAlreadyStarted { code }
            | Self::KickVoteInProgress { code }
            | Self::NoKickVoteInProgress { code }
            | Self::PlayerAlreadyVoted { code, .. } => Some(code),
            Self::NotInGame | Self::TooManyRequests | Self::Internal { .. } => None,
        }
    }
}
