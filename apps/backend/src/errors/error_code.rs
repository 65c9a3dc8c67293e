//! Error codes for the game server.
//!
//! All error codes are SCREAMING_SNAKE_CASE and map 1:1 to the strings that
//! appear on the wire (WebSocket `error*` events and HTTP problem details).
//! Add new codes here; never pass ad-hoc strings as error codes.

use core::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Game rules and sessions
    GameNotFound,
    PlayerNotFound,
    NotAllowed,
    InvalidTurnState,
    InvalidPosition,
    TooFewPlayers,
    CannotReconnect,
    GameIsFull,
    GameAlreadyStarted,
    KickVoteInProgress,
    NoKickVoteInProgress,
    PlayerAlreadyVoted,

    // Request handling
    TooManyRequests,
    BadRequest,
    ValidationError,

    // System
    Internal,
    ConfigError,
    StoreUnavailable,
}

impl ErrorCode {
    /// Returns the canonical SCREAMING_SNAKE_CASE string for this error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GameNotFound => "GAME_NOT_FOUND",
            Self::PlayerNotFound => "PLAYER_NOT_FOUND",
            Self::NotAllowed => "NOT_ALLOWED",
            Self::InvalidTurnState => "INVALID_TURN_STATE",
            Self::InvalidPosition => "INVALID_POSITION",
            Self::TooFewPlayers => "TOO_FEW_PLAYERS",
            Self::CannotReconnect => "CANNOT_RECONNECT",
            Self::GameIsFull => "GAME_IS_FULL",
            Self::GameAlreadyStarted => "GAME_ALREADY_STARTED",
            Self::KickVoteInProgress => "KICK_VOTE_IN_PROGRESS",
            Self::NoKickVoteInProgress => "NO_KICK_VOTE_IN_PROGRESS",
            Self::PlayerAlreadyVoted => "PLAYER_ALREADY_VOTED",

            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::BadRequest => "BAD_REQUEST",
            Self::ValidationError => "VALIDATION_ERROR",

            Self::Internal => "INTERNAL",
            Self::ConfigError => "CONFIG_ERROR",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
