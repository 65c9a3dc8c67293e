use rand::Rng;

use crate::domain::cards::shuffled_deck;
use crate::domain::grid::Grid;
use crate::domain::player::{PlayerId, ScoreEntry};
use crate::domain::state::{
    Game, GameStatus, PlayerRoundScore, RoundState, RoundStatus, RoundSummary, TurnPhase,
};

impl Game {
    /// Deal a fresh round: shuffle, deal every grid face down, open the
    /// discard pile with one card.
    pub(crate) fn start_round<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut deck = shuffled_deck(rng);
        for player in &mut self.players {
            player.cards = Grid::deal(&mut deck, &self.settings);
            player.has_played_last_turn = false;
        }
        self.discard_pile.clear();
        if let Some(first) = deck.pop() {
            self.discard_pile.push(first.into_visible());
        }
        self.draw_pile = deck;
        self.selected_card = None;
        self.phase = TurnPhase::InitialReveal;
        self.round = RoundState {
            number: self.round.number + 1,
            status: RoundStatus::Normal,
            first_to_finish: None,
            next_starter: self.round.next_starter,
        };
    }

    /// Reveal and clear every grid, score the round and either finish the
    /// game or deal the next round.
    pub(crate) fn end_round<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for player in &mut self.players {
            player.cards.reveal_all();
            let cleared = player.cards.clear_matching(&self.settings);
            self.discard_pile.extend(cleared);
        }

        let raw: Vec<Option<i32>> = self
            .players
            .iter()
            .map(|p| p.is_connected().then(|| p.cards.visible_sum()))
            .collect();
        let entries = round_entries(
            &raw,
            self.players.iter().map(|p| p.id),
            self.round.first_to_finish,
            |score| self.settings.apply_first_player_penalty(score),
        );

        let mut scores = Vec::with_capacity(self.players.len());
        for (player, entry) in self.players.iter_mut().zip(entries.iter().copied()) {
            player.record_round(entry);
            scores.push(PlayerRoundScore {
                player_id: player.id,
                score: entry,
            });
        }

        self.previous_round = Some(RoundSummary {
            number: self.round.number,
            first_to_finish: self.round.first_to_finish,
            scores,
        });
        tracing::info!(
            game = %self.code,
            round = self.round.number,
            "round scored"
        );

        let limit = self.settings.score_to_end_game;
        if self.players.iter().any(|p| p.score >= limit) {
            self.status = GameStatus::Finished;
            self.round.status = RoundStatus::Over;
            self.phase = TurnPhase::TurnResolved;
            self.selected_card = None;
            tracing::info!(game = %self.code, "game finished");
            return;
        }

        let ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
        self.round.next_starter = lowest_scorer(&ids, &entries);
        self.start_round(rng);
    }

    /// Players sharing the lowest total once the game is finished.
    pub fn winners(&self) -> Vec<PlayerId> {
        if self.status != GameStatus::Finished {
            return Vec::new();
        }
        let Some(best) = self.players.iter().map(|p| p.score).min() else {
            return Vec::new();
        };
        self.players
            .iter()
            .filter(|p| p.score == best)
            .map(|p| p.id)
            .collect()
    }
}

/// Turn raw grid sums into round entries. `None` marks a player who sat the
/// round out. The finisher is penalised when their score is positive and
/// not strictly lower than every other scored player.
fn round_entries(
    raw: &[Option<i32>],
    ids: impl Iterator<Item = PlayerId>,
    finisher: Option<PlayerId>,
    penalty: impl Fn(i32) -> i32,
) -> Vec<ScoreEntry> {
    let ids: Vec<PlayerId> = ids.collect();
    let finisher_idx = finisher.and_then(|f| ids.iter().position(|id| *id == f));

    raw.iter()
        .enumerate()
        .map(|(i, score)| match score {
            None => ScoreEntry::Skipped,
            Some(score) if Some(i) == finisher_idx => {
                let strictly_lowest = raw
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .filter_map(|(_, other)| *other)
                    .all(|other| *score < other);
                if *score > 0 && !strictly_lowest {
                    ScoreEntry::Points(penalty(*score))
                } else {
                    ScoreEntry::Points(*score)
                }
            }
            Some(score) => ScoreEntry::Points(*score),
        })
        .collect()
}

/// Lowest round scorer; ties go to the earliest joiner.
fn lowest_scorer(ids: &[PlayerId], entries: &[ScoreEntry]) -> Option<PlayerId> {
    let mut best: Option<(PlayerId, i32)> = None;
    for (id, entry) in ids.iter().zip(entries) {
        let ScoreEntry::Points(points) = entry else {
            continue;
        };
        match best {
            Some((_, low)) if *points >= low => {}
            _ => best = Some((*id, *points)),
        }
    }
    best.map(|(id, _)| id)
}
