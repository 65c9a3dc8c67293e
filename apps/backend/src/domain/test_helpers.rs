//! Builders for domain unit tests.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::domain::cards::Card;
use crate::domain::code::GameCode;
use crate::domain::grid::{Grid, Position};
use crate::domain::player::{PlayerId, PlayerProfile};
use crate::domain::state::{Game, TurnPhase};
use crate::domain::turns::PlayAction;

pub fn profile(name: &str) -> PlayerProfile {
    PlayerProfile {
        username: name.to_string(),
        avatar: "bee".to_string(),
    }
}

pub fn rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Public lobby with `n` connected players; the first is admin.
pub fn lobby_with(n: usize) -> Game {
    let mut game = Game::new(GameCode::from("TESTGAME"), profile("p0"), false);
    for i in 1..n {
        game.add_player(profile(&format!("p{i}")))
            .expect("lobby has room");
    }
    game
}

/// Hidden grid from column-major values.
pub fn grid(columns: &[&[i8]]) -> Grid {
    let mut id = 1000;
    Grid::from_columns(
        columns
            .iter()
            .map(|col| {
                col.iter()
                    .map(|v| {
                        id += 1;
                        Card::hidden(id, *v)
                    })
                    .collect()
            })
            .collect(),
    )
}

/// Started game whose grids are replaced by `grids` (one per player).
pub fn started_with(grids: Vec<Grid>) -> Game {
    let mut game = lobby_with(grids.len());
    let admin = game.admin_id;
    game.start(&admin, &mut rng(7)).expect("start");
    for (player, grid) in game.players.iter_mut().zip(grids) {
        player.cards = grid;
    }
    game
}

/// Reveal the given positions for every player in join order.
pub fn reveal_all(game: &mut Game, positions: &[Position]) {
    let ids: Vec<PlayerId> = game.players.iter().map(|p| p.id).collect();
    for id in ids {
        for pos in positions {
            game.play(&id, PlayAction::RevealCard(*pos), &mut rng(1))
                .expect("reveal");
        }
    }
    assert_ne!(game.phase, TurnPhase::InitialReveal);
}

pub fn current_id(game: &Game) -> PlayerId {
    game.players[game.current_player_index].id
}

pub const TOP_LEFT: Position = Position::new(0, 0);
pub const TOP_SECOND: Position = Position::new(1, 0);
