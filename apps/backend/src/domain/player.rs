//! Session participants.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::grid::Grid;

pub type PlayerId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Leaving,
}

/// One round's result in a player's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreEntry {
    Points(i32),
    /// The player sat the round out (disconnected at round end).
    Skipped,
}

const SKIP_MARKER: &str = "-";

impl Serialize for ScoreEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScoreEntry::Points(points) => serializer.serialize_i32(*points),
            ScoreEntry::Skipped => serializer.serialize_str(SKIP_MARKER),
        }
    }
}

impl<'de> Deserialize<'de> for ScoreEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl Visitor<'_> for EntryVisitor {
            type Value = ScoreEntry;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "an integer or \"{SKIP_MARKER}\"")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ScoreEntry, E> {
                i32::try_from(v)
                    .map(ScoreEntry::Points)
                    .map_err(|_| E::custom("score out of range"))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ScoreEntry, E> {
                i32::try_from(v)
                    .map(ScoreEntry::Points)
                    .map_err(|_| E::custom("score out of range"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ScoreEntry, E> {
                if v == SKIP_MARKER {
                    Ok(ScoreEntry::Skipped)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(EntryVisitor)
    }
}

/// Append-only per-round history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreHistory(Vec<ScoreEntry>);

impl ScoreHistory {
    pub fn push(&mut self, entry: ScoreEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[ScoreEntry] {
        &self.0
    }

    pub fn total(&self) -> i32 {
        self.0
            .iter()
            .map(|entry| match entry {
                ScoreEntry::Points(p) => *p,
                ScoreEntry::Skipped => 0,
            })
            .sum()
    }
}

/// Identity supplied by the client when creating or joining a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub username: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub connection_status: ConnectionStatus,
    pub score: i32,
    score_history: ScoreHistory,
    pub cards: Grid,
    /// Set once the player has taken their final turn of a closing round.
    pub has_played_last_turn: bool,
    pub wants_replay: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub disconnected_at: Option<OffsetDateTime>,
}

impl Player {
    pub fn new(profile: PlayerProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: profile.username,
            avatar: profile.avatar,
            connection_status: ConnectionStatus::Connected,
            score: 0,
            score_history: ScoreHistory::default(),
            cards: Grid::default(),
            has_played_last_turn: false,
            wants_replay: false,
            disconnected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    pub fn score_history(&self) -> &ScoreHistory {
        &self.score_history
    }

    /// Record a round result and refresh the cumulative score.
    pub fn record_round(&mut self, entry: ScoreEntry) {
        self.score_history.push(entry);
        self.score = self.score_history.total();
    }

    pub fn mark_connected(&mut self) {
        self.connection_status = ConnectionStatus::Connected;
        self.disconnected_at = None;
    }

    pub fn mark_disconnected(&mut self, at: OffsetDateTime) {
        self.connection_status = ConnectionStatus::Disconnected;
        self.disconnected_at = Some(at);
    }

    /// Clear per-game state for a replay; the identity is kept.
    pub fn reset_for_replay(&mut self) {
        self.score = 0;
        self.score_history = ScoreHistory::default();
        self.cards = Grid::default();
        self.has_played_last_turn = false;
        self.wants_replay = false;
    }
}
