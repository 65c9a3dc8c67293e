//! Property tests for the diff protocol (pure domain, no I/O).
//!
//! Properties tested:
//! - A replica fed every committed operation in order matches a fresh
//!   snapshot at the same version
//! - Versions advance by exactly one per committed mutation
//! - Rejected actions leave the game untouched

use std::env;

use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use time::OffsetDateTime;

use crate::domain::grid::Position;
use crate::domain::state::{Game, PileSource};
use crate::domain::test_helpers::{lobby_with, profile};
use crate::domain::turns::PlayAction;
use crate::protocol::game_state::GameView;
use crate::sync::operation::Operation;
use crate::sync::replica::Replica;

fn proptest_config() -> ProptestConfig {
    let cases = env::var("PROPTEST_CASES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(32);

    ProptestConfig {
        cases,
        ..ProptestConfig::default()
    }
}

#[derive(Debug, Clone)]
enum Step {
    Reveal { seat: usize, column: usize, row: usize },
    Pick(PileSource),
    Replace { column: usize, row: usize },
    Discard,
    Turn { column: usize, row: usize },
    Disconnect(usize),
    Reconnect(usize),
    Leave(usize),
    Join,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..5usize, 0..4usize, 0..3usize)
            .prop_map(|(seat, column, row)| Step::Reveal { seat, column, row }),
        4 => prop_oneof![Just(PileSource::DrawPile), Just(PileSource::DiscardPile)]
            .prop_map(Step::Pick),
        3 => (0..4usize, 0..3usize).prop_map(|(column, row)| Step::Replace { column, row }),
        2 => Just(Step::Discard),
        3 => (0..4usize, 0..3usize).prop_map(|(column, row)| Step::Turn { column, row }),
        1 => (0..5usize).prop_map(Step::Disconnect),
        1 => (0..5usize).prop_map(Step::Reconnect),
        1 => (0..5usize).prop_map(Step::Leave),
        1 => Just(Step::Join),
    ]
}

fn apply_step(game: &mut Game, step: &Step, rng: &mut ChaCha8Rng) {
    let seat_id = |game: &Game, seat: usize| {
        let n = game.players.len().max(1);
        game.players.get(seat % n).map(|p| p.id)
    };
    let current = game.players.get(game.current_player_index).map(|p| p.id);

    let _ = match step {
        Step::Reveal { seat, column, row } => match seat_id(game, *seat) {
            Some(id) => game
                .play(&id, PlayAction::RevealCard(Position::new(*column, *row)), rng)
                .map(|_| ()),
            None => Ok(()),
        },
        Step::Pick(source) => match current {
            Some(id) => game.play(&id, PlayAction::PickCard(*source), rng).map(|_| ()),
            None => Ok(()),
        },
        Step::Replace { column, row } => match current {
            Some(id) => game
                .play(&id, PlayAction::ReplaceCard(Position::new(*column, *row)), rng)
                .map(|_| ()),
            None => Ok(()),
        },
        Step::Discard => match current {
            Some(id) => game
                .play(&id, PlayAction::DiscardSelectedCard, rng)
                .map(|_| ()),
            None => Ok(()),
        },
        Step::Turn { column, row } => match current {
            Some(id) => game
                .play(&id, PlayAction::TurnCard(Position::new(*column, *row)), rng)
                .map(|_| ()),
            None => Ok(()),
        },
        Step::Disconnect(seat) => match seat_id(game, *seat) {
            Some(id) => game.mark_disconnected(&id, OffsetDateTime::now_utc(), rng),
            None => Ok(()),
        },
        Step::Reconnect(seat) => match seat_id(game, *seat) {
            Some(id) => game.mark_reconnected(&id),
            None => Ok(()),
        },
        Step::Leave(seat) => match seat_id(game, *seat) {
            Some(id) => game.remove_player(&id, rng).map(|_| ()),
            None => Ok(()),
        },
        Step::Join => game.add_player(profile("late")).map(|_| ()),
    };
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Property: replicas converge on the authoritative state
    #[test]
    fn prop_replica_converges(
        seed in any::<u64>(),
        players in 2..5usize,
        steps in prop::collection::vec(step(), 1..150),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut game = lobby_with(players);
        let admin = game.admin_id;
        game.start(&admin, &mut rng).unwrap();

        let mut replica = Replica::from_snapshot(&GameView::from(&game), game.version).unwrap();

        for step in &steps {
            let before = game.clone();
            let mut candidate = game.clone();
            apply_step(&mut candidate, step, &mut rng);

            if candidate.same_state_as(&before) {
                continue;
            }
            candidate.version = before.version + 1;

            let op = Operation::between(&GameView::from(&before), &GameView::from(&candidate)).unwrap();
            replica.apply(&op, candidate.version).unwrap();
            game = candidate;

            let fresh = Replica::from_snapshot(&GameView::from(&game), game.version).unwrap();
            prop_assert_eq!(replica.state(), fresh.state(), "diverged after {:?}", step);
        }
        prop_assert_eq!(replica.version(), game.version);
    }

    /// Property: a rejected action never mutates the game
    #[test]
    fn prop_rejected_actions_are_atomic(
        seed in any::<u64>(),
        steps in prop::collection::vec(step(), 1..80),
    ) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut game = lobby_with(3);
        let admin = game.admin_id;
        game.start(&admin, &mut rng).unwrap();

        for step in &steps {
            let current = game.players.get(game.current_player_index).map(|p| p.id);
            let action = match step {
                Step::Pick(source) => PlayAction::PickCard(*source),
                Step::Discard => PlayAction::DiscardSelectedCard,
                Step::Replace { column, row } => PlayAction::ReplaceCard(Position::new(*column, *row)),
                Step::Turn { column, row } => PlayAction::TurnCard(Position::new(*column, *row)),
                _ => {
                    apply_step(&mut game, step, &mut rng);
                    continue;
                }
            };
            let Some(id) = current else { continue };
            let before = game.clone();
            if game.play(&id, action, &mut rng).is_err() {
                prop_assert_eq!(&game, &before);
            }
        }
    }
}
