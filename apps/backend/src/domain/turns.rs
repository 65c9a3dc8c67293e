use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::grid::Position;
use crate::domain::player::PlayerId;
use crate::domain::settings::MIN_PLAYERS;
use crate::domain::state::{
    Game, GameStatus, HeldCard, LastTurnStatus, PileSource, RoundStatus, TurnPhase,
};
use crate::errors::domain::DomainError;

/// A play action sent by the player whose turn it is (or, for
/// `RevealCard`, any player during the initial reveal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayAction {
    RevealCard(Position),
    PickCard(PileSource),
    ReplaceCard(Position),
    DiscardSelectedCard,
    TurnCard(Position),
}

/// What an accepted play changed beyond the acting player's grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    pub turn_ended: bool,
    pub round_ended: bool,
    pub game_finished: bool,
}

impl Game {
    /// Validate and apply a play action.
    pub fn play<R: Rng + ?Sized>(
        &mut self,
        player_id: &PlayerId,
        action: PlayAction,
        rng: &mut R,
    ) -> Result<TurnOutcome, DomainError> {
        self.require_playable()?;
        self.player_index(player_id)?;
        let round_before = self.round.number;

        match action {
            PlayAction::RevealCard(pos) => self.reveal_card(player_id, pos)?,
            PlayAction::PickCard(source) => self.pick_card(player_id, source, rng)?,
            PlayAction::ReplaceCard(pos) => self.replace_card(player_id, pos, rng)?,
            PlayAction::DiscardSelectedCard => self.discard_selected_card(player_id)?,
            PlayAction::TurnCard(pos) => self.turn_card(player_id, pos, rng)?,
        }

        Ok(TurnOutcome {
            turn_ended: matches!(
                action,
                PlayAction::ReplaceCard(_) | PlayAction::TurnCard(_)
            ),
            round_ended: self.round.number != round_before || self.status == GameStatus::Finished,
            game_finished: self.status == GameStatus::Finished,
        })
    }

    fn require_playable(&self) -> Result<(), DomainError> {
        if self.status != GameStatus::Playing {
            return Err(DomainError::not_allowed(
                &self.code,
                "the game is not in progress",
            ));
        }
        if self.connected_count() < MIN_PLAYERS {
            return Err(DomainError::TooFewPlayers {
                code: self.code.clone(),
            });
        }
        Ok(())
    }

    fn require_turn(&self, player_id: &PlayerId, allowed: &[TurnPhase]) -> Result<(), DomainError> {
        let current = self.players.get(self.current_player_index).map(|p| p.id);
        if self.phase == TurnPhase::InitialReveal || current.as_ref() != Some(player_id) {
            return Err(DomainError::invalid_turn(
                &self.code,
                *player_id,
                "it is not your turn",
            ));
        }
        if !allowed.contains(&self.phase) {
            return Err(DomainError::invalid_turn(
                &self.code,
                *player_id,
                format!("action not allowed during {:?}", self.phase),
            ));
        }
        Ok(())
    }

    fn reveal_card(&mut self, player_id: &PlayerId, pos: Position) -> Result<(), DomainError> {
        if self.phase != TurnPhase::InitialReveal {
            return Err(DomainError::invalid_turn(
                &self.code,
                *player_id,
                "initial reveal is over",
            ));
        }
        let limit = self.settings.initial_turned_count as usize;
        let code = self.code.clone();
        let player = self.player_mut(player_id)?;
        if player.cards.visible_count() >= limit {
            return Err(DomainError::invalid_turn(
                &code,
                *player_id,
                "all initial cards already revealed",
            ));
        }
        match player.cards.get(pos) {
            None => {
                return Err(DomainError::invalid_position(
                    &code,
                    *player_id,
                    "no card at this position",
                ))
            }
            Some(card) if card.is_visible() => {
                return Err(DomainError::invalid_position(
                    &code,
                    *player_id,
                    "card is already visible",
                ))
            }
            Some(_) => {}
        }
        player.cards.turn(pos);
        self.complete_initial_reveal_if_ready();
        Ok(())
    }

    fn pick_card<R: Rng + ?Sized>(
        &mut self,
        player_id: &PlayerId,
        source: PileSource,
        rng: &mut R,
    ) -> Result<(), DomainError> {
        self.require_turn(player_id, &[TurnPhase::AwaitingPickOrReveal])?;
        let card = match source {
            PileSource::DiscardPile => self.discard_pile.pop(),
            PileSource::DrawPile => {
                if self.draw_pile.is_empty() {
                    self.reshuffle_discard_into_draw(rng);
                }
                self.draw_pile.pop()
            }
        };
        let Some(card) = card else {
            return Err(DomainError::invalid_turn(
                &self.code,
                *player_id,
                "the pile is empty",
            ));
        };
        self.selected_card = Some(HeldCard {
            card: card.into_visible(),
            source,
        });
        self.phase = match source {
            PileSource::DrawPile => TurnPhase::AwaitingReplaceOrDiscard,
            PileSource::DiscardPile => TurnPhase::AwaitingReplace,
        };
        Ok(())
    }

    /// Everything but the top of the discard pile becomes the new draw pile.
    fn reshuffle_discard_into_draw<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let Some(top) = self.discard_pile.pop() else {
            return;
        };
        let mut recycled = std::mem::take(&mut self.discard_pile);
        recycled.shuffle(rng);
        self.draw_pile = recycled;
        self.discard_pile.push(top);
        tracing::debug!(
            game = %self.code,
            cards = self.draw_pile.len(),
            "reshuffled discard pile into draw pile"
        );
    }

    fn replace_card<R: Rng + ?Sized>(
        &mut self,
        player_id: &PlayerId,
        pos: Position,
        rng: &mut R,
    ) -> Result<(), DomainError> {
        self.require_turn(
            player_id,
            &[TurnPhase::AwaitingReplaceOrDiscard, TurnPhase::AwaitingReplace],
        )?;
        let idx = self.current_player_index;
        if !self.players[idx].cards.contains(pos) {
            return Err(DomainError::invalid_position(
                &self.code,
                *player_id,
                "no card at this position",
            ));
        }
        let Some(held) = self.selected_card.take() else {
            return Err(DomainError::internal("replace without a selected card"));
        };
        if let Some(old) = self.players[idx].cards.replace(pos, held.card) {
            self.discard_pile.push(old.into_visible());
        }
        self.finish_turn(LastTurnStatus::Replaced, rng);
        Ok(())
    }

    fn discard_selected_card(&mut self, player_id: &PlayerId) -> Result<(), DomainError> {
        self.require_turn(player_id, &[TurnPhase::AwaitingReplaceOrDiscard])?;
        if self.players[self.current_player_index]
            .cards
            .hidden_positions()
            .is_empty()
        {
            return Err(DomainError::invalid_turn(
                &self.code,
                *player_id,
                "no hidden card left to turn; replace instead",
            ));
        }
        self.drop_selected_card();
        self.phase = TurnPhase::AwaitingTurnCard;
        Ok(())
    }

    fn turn_card<R: Rng + ?Sized>(
        &mut self,
        player_id: &PlayerId,
        pos: Position,
        rng: &mut R,
    ) -> Result<(), DomainError> {
        self.require_turn(player_id, &[TurnPhase::AwaitingTurnCard])?;
        let idx = self.current_player_index;
        match self.players[idx].cards.get(pos) {
            None => {
                return Err(DomainError::invalid_position(
                    &self.code,
                    *player_id,
                    "no card at this position",
                ))
            }
            Some(card) if card.is_visible() => {
                return Err(DomainError::invalid_position(
                    &self.code,
                    *player_id,
                    "card is already visible",
                ))
            }
            Some(_) => {}
        }
        self.players[idx].cards.turn(pos);
        self.finish_turn(LastTurnStatus::DiscardedAndTurned, rng);
        Ok(())
    }

    /// Clear matching lines, track round closure, then hand the turn on.
    fn finish_turn<R: Rng + ?Sized>(&mut self, status: LastTurnStatus, rng: &mut R) {
        self.phase = TurnPhase::TurnResolved;
        self.last_turn_status = Some(status);

        let idx = self.current_player_index;
        let cleared = self.players[idx].cards.clear_matching(&self.settings);
        self.discard_pile
            .extend(cleared.into_iter().map(|card| card.into_visible()));

        let round_status = self.round.status;
        let mover = &mut self.players[idx];
        match round_status {
            RoundStatus::Normal if mover.cards.all_visible() => {
                self.round.status = RoundStatus::LastLap;
                self.round.first_to_finish = Some(mover.id);
                mover.has_played_last_turn = true;
                tracing::debug!(game = %self.code, player = %mover.id, "last lap started");
            }
            RoundStatus::LastLap => mover.has_played_last_turn = true,
            _ => {}
        }

        self.advance_turn_from(idx, rng);
    }

    /// Move the turn to the next eligible player after `from`, wrapping, with
    /// `from` itself checked last. Ends the round when a last lap has nobody
    /// left to play.
    pub(crate) fn advance_turn_from<R: Rng + ?Sized>(&mut self, from: usize, rng: &mut R) {
        let n = self.players.len();
        if n == 0 {
            return;
        }
        let last_lap = self.round.status == RoundStatus::LastLap;
        let next = (1..=n).map(|step| (from + step) % n).find(|&i| {
            let p = &self.players[i];
            p.is_connected() && !(last_lap && p.has_played_last_turn)
        });

        match next {
            Some(i) => {
                self.current_player_index = i;
                self.phase = TurnPhase::AwaitingPickOrReveal;
            }
            None if last_lap => self.end_round(rng),
            None => {
                // Nobody connected; the turn stays put until someone returns.
                self.current_player_index = from % n;
                self.phase = TurnPhase::AwaitingPickOrReveal;
            }
        }
    }

    /// After a reconnect, make sure the turn sits with a connected player.
    pub(crate) fn normalize_current_player(&mut self) {
        if self.phase == TurnPhase::InitialReveal {
            return;
        }
        let n = self.players.len();
        if n == 0 {
            return;
        }
        let idx = self.current_player_index % n;
        if self.players[idx].is_connected() {
            return;
        }
        let last_lap = self.round.status == RoundStatus::LastLap;
        if let Some(i) = (1..=n).map(|step| (idx + step) % n).find(|&i| {
            let p = &self.players[i];
            p.is_connected() && !(last_lap && p.has_played_last_turn)
        }) {
            self.current_player_index = i;
            self.phase = TurnPhase::AwaitingPickOrReveal;
        }
    }

    /// Once every connected player has revealed their initial cards, fill in
    /// for disconnected players and pick the starter.
    pub(crate) fn complete_initial_reveal_if_ready(&mut self) {
        let limit = self.settings.initial_turned_count as usize;
        let ready = self
            .players
            .iter()
            .filter(|p| p.is_connected())
            .all(|p| p.cards.visible_count() >= limit);
        if !ready || self.connected_count() == 0 {
            return;
        }

        for player in self.players.iter_mut().filter(|p| !p.is_connected()) {
            let missing = limit.saturating_sub(player.cards.visible_count());
            for pos in player.cards.hidden_positions().into_iter().take(missing) {
                player.cards.turn(pos);
            }
        }

        self.current_player_index = self.choose_starter();
        self.phase = TurnPhase::AwaitingPickOrReveal;
        tracing::debug!(
            game = %self.code,
            round = self.round.number,
            starter = %self.players[self.current_player_index].id,
            "initial reveal complete"
        );
    }

    /// The designated starter from the previous round if still seated and
    /// connected, otherwise the connected player with the highest revealed
    /// sum. Ties go to the earliest joiner.
    fn choose_starter(&self) -> usize {
        if let Some(starter) = self.round.next_starter {
            if let Some(i) = self
                .players
                .iter()
                .position(|p| p.id == starter && p.is_connected())
            {
                return i;
            }
        }
        let mut best: Option<(usize, i32)> = None;
        for (i, player) in self.players.iter().enumerate() {
            if !player.is_connected() {
                continue;
            }
            let sum = player.cards.visible_sum();
            match best {
                Some((_, top)) if sum <= top => {}
                _ => best = Some((i, sum)),
            }
        }
        best.map(|(i, _)| i).unwrap_or(0)
    }
}
