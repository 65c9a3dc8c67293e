use rand::Rng;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::domain::code::GameCode;
use crate::domain::kick_vote::{KickVote, KickVoteStatus};
use crate::domain::player::{Player, PlayerId};
use crate::domain::state::Game;
use crate::errors::domain::DomainError;
use crate::services::session_router::{ConnId, SessionRouter};
use crate::ws::protocol::{KickVoteView, ServerMsg, SystemEvent};

/// Where a kick vote stands after a tally.
#[derive(Debug)]
pub(super) enum VoteState {
    Pending(KickVote),
    Succeeded { vote: KickVote, kicked: Player },
    Failed(KickVote),
}

fn eligible_voters(game: &Game, target_id: &PlayerId) -> Vec<PlayerId> {
    game.connected_ids()
        .into_iter()
        .filter(|id| id != target_id)
        .collect()
}

/// Take the pending vote off the game if its deadline has passed.
fn take_lapsed(game: &mut Game, now: OffsetDateTime) -> Option<KickVote> {
    if !game.kick_vote.as_ref().is_some_and(|vote| vote.is_expired(now)) {
        return None;
    }
    game.kick_vote.take().map(|mut vote| {
        vote.status = KickVoteStatus::Failed;
        vote
    })
}

/// Re-tally the pending vote against the currently connected players. A
/// resolved vote is taken off the game; a successful one removes its target.
/// A vote past its deadline fails whatever the ballots say.
pub(super) fn settle<R: Rng + ?Sized>(
    game: &mut Game,
    rng: &mut R,
) -> Result<Option<VoteState>, DomainError> {
    if let Some(lapsed) = take_lapsed(game, OffsetDateTime::now_utc()) {
        return Ok(Some(VoteState::Failed(lapsed)));
    }
    let Some(target_id) = game.kick_vote.as_ref().map(|vote| vote.target_id) else {
        return Ok(None);
    };
    let eligible = eligible_voters(game, &target_id);
    let Some(mut vote) = game.kick_vote.take() else {
        return Ok(None);
    };

    match vote.tally(&eligible) {
        KickVoteStatus::Pending => {
            game.kick_vote = Some(vote.clone());
            Ok(Some(VoteState::Pending(vote)))
        }
        KickVoteStatus::Failed => Ok(Some(VoteState::Failed(vote))),
        KickVoteStatus::Success => {
            let kicked = game.remove_player(&target_id, rng)?;
            Ok(Some(VoteState::Succeeded { vote, kicked }))
        }
    }
}

fn view(vote: &KickVote, game: &Game) -> KickVoteView {
    let eligible = eligible_voters(game, &vote.target_id);
    KickVoteView {
        id: vote.id,
        target_id: vote.target_id,
        initiator_id: vote.initiator_id,
        yes: eligible
            .iter()
            .filter(|id| vote.votes.get(*id).copied().unwrap_or(false))
            .count(),
        required: eligible.len() / 2 + 1,
        status: vote.status,
        deadline: vote.deadline,
    }
}

impl SessionRouter {
    pub(super) async fn initiate_kick_vote(
        &self,
        conn: ConnId,
        target_id: PlayerId,
    ) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let initiator = binding.player_id;
        let now = OffsetDateTime::now_utc();
        let deadline = now + self.config.kick_vote_timeout;

        let committed = self
            .mutate(&binding.code, |game| {
                let lapsed = take_lapsed(game, now);
                if game.kick_vote.is_some() {
                    return Err(DomainError::KickVoteInProgress {
                        code: game.code.clone(),
                    });
                }
                game.player_index(&initiator)?;
                game.player_index(&target_id)?;
                if target_id == initiator {
                    return Err(DomainError::not_allowed(
                        &game.code,
                        "cannot start a kick vote against yourself",
                    ));
                }
                game.kick_vote = Some(KickVote::open(target_id, initiator, deadline));
                Ok((lapsed, settle(game, &mut rand::rng())?))
            })
            .await?;
        let (lapsed, state) = committed.value;

        info!(
            game_code = %binding.code,
            player_id = %initiator,
            target_id = %target_id,
            "kick vote opened"
        );
        if let Some(commit) = &committed.commit {
            self.publish(&committed.game, commit, Some((conn, initiator)));
        }
        if let Some(VoteState::Pending(vote)) = &state {
            self.schedule_kick_vote_expiry(binding.code.clone(), vote.id);
        }
        self.announce_vote(&committed.game, lapsed.map(VoteState::Failed));
        self.announce_vote(&committed.game, state);
        Ok(())
    }

    pub(super) async fn cast_kick_vote(
        &self,
        conn: ConnId,
        choice: bool,
    ) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let voter = binding.player_id;

        let committed = self
            .mutate(&binding.code, |game| {
                game.player_index(&voter)?;
                if let Some(lapsed) = take_lapsed(game, OffsetDateTime::now_utc()) {
                    return Ok(Some(VoteState::Failed(lapsed)));
                }
                let code = game.code.clone();
                let vote = game
                    .kick_vote
                    .as_mut()
                    .ok_or_else(|| DomainError::NoKickVoteInProgress { code: code.clone() })?;
                if vote.target_id == voter {
                    return Err(DomainError::not_allowed(
                        &code,
                        "the target of a kick vote cannot vote",
                    ));
                }
                if vote.has_voted(&voter) {
                    return Err(DomainError::PlayerAlreadyVoted {
                        code,
                        player_id: voter,
                    });
                }
                vote.cast(voter, choice);
                settle(game, &mut rand::rng())
            })
            .await?;

        if let Some(commit) = &committed.commit {
            self.publish(&committed.game, commit, Some((conn, voter)));
        }
        self.announce_vote(&committed.game, committed.value);
        Ok(())
    }

    fn schedule_kick_vote_expiry(&self, code: GameCode, vote_id: Uuid) {
        let router = self.clone();
        let timeout = self.config.kick_vote_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            router.expire_kick_vote(code, vote_id).await;
        });
    }

    /// Fail the vote `vote_id` if it is still pending.
    pub(super) async fn expire_kick_vote(&self, code: GameCode, vote_id: Uuid) {
        let result = self
            .mutate(&code, |game| {
                if game.kick_vote.as_ref().is_some_and(|vote| vote.id == vote_id) {
                    Ok(game.kick_vote.take().map(|mut vote| {
                        vote.status = KickVoteStatus::Failed;
                        VoteState::Failed(vote)
                    }))
                } else {
                    Ok(None)
                }
            })
            .await;

        match result {
            Ok(committed) => {
                if let Some(commit) = &committed.commit {
                    info!(game_code = %code, vote_id = %vote_id, "kick vote expired");
                    self.publish(&committed.game, commit, None);
                }
                self.announce_vote(&committed.game, committed.value);
            }
            // The game is gone; nothing left to expire.
            Err(DomainError::GameNotFound { .. }) => {}
            Err(err) => {
                error!(game_code = %code, error = %err, "failed to expire kick vote");
            }
        }
    }

    /// Tell the room where a vote stands. A kicked player is detached from
    /// the room after hearing the outcome.
    pub(super) fn announce_vote(&self, game: &Game, state: Option<VoteState>) {
        let Some(state) = state else {
            return;
        };
        match state {
            VoteState::Pending(vote) => {
                self.send_room(&game.code, None, ServerMsg::KickVote(view(&vote, game)));
            }
            VoteState::Failed(vote) => {
                self.send_room(
                    &game.code,
                    None,
                    ServerMsg::KickVoteFailed(view(&vote, game)),
                );
            }
            VoteState::Succeeded { vote, kicked } => {
                info!(
                    game_code = %game.code,
                    player_id = %kicked.id,
                    "player kicked by vote"
                );
                self.send_room(
                    &game.code,
                    None,
                    ServerMsg::KickVoteSuccess(view(&vote, game)),
                );
                self.detach_player(&game.code, &kicked.id);
                self.system(&game.code, SystemEvent::PlayerKicked, &kicked.name);
            }
        }
    }
}
