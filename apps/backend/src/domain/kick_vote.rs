//! Quorum vote for removing an unresponsive player.
//!
//! Eligible voters are the connected players other than the target, counted
//! at every tally. The vote succeeds on a strict majority of yes votes and
//! fails as soon as a majority is no longer reachable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::player::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KickVoteStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickVote {
    pub id: Uuid,
    pub target_id: PlayerId,
    pub initiator_id: PlayerId,
    pub votes: BTreeMap<PlayerId, bool>,
    pub status: KickVoteStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
}

impl KickVote {
    /// Open a vote; the initiator's yes is recorded immediately.
    pub fn open(target_id: PlayerId, initiator_id: PlayerId, deadline: OffsetDateTime) -> Self {
        let mut votes = BTreeMap::new();
        votes.insert(initiator_id, true);
        Self {
            id: Uuid::new_v4(),
            target_id,
            initiator_id,
            votes,
            status: KickVoteStatus::Pending,
            deadline,
        }
    }

    pub fn has_voted(&self, player_id: &PlayerId) -> bool {
        self.votes.contains_key(player_id)
    }

    pub fn cast(&mut self, player_id: PlayerId, choice: bool) {
        self.votes.insert(player_id, choice);
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.deadline
    }

    /// Re-evaluate against the current eligible voters and update `status`.
    /// Ballots from players no longer eligible are ignored.
    pub fn tally(&mut self, eligible: &[PlayerId]) -> KickVoteStatus {
        let total = eligible.len();
        let required = total / 2 + 1;
        let (mut yes, mut no) = (0usize, 0usize);
        for voter in eligible {
            match self.votes.get(voter) {
                Some(true) => yes += 1,
                Some(false) => no += 1,
                None => {}
            }
        }
        let outstanding = total - yes - no;

        self.status = if total > 0 && yes >= required {
            KickVoteStatus::Success
        } else if yes + outstanding < required {
            KickVoteStatus::Failed
        } else {
            KickVoteStatus::Pending
        };
        self.status
    }
}
