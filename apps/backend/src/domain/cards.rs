//! Card values, the one-way visibility flip, and deck construction.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub type CardId = u16;

/// (value, copies) for a full deck.
const DECK_COMPOSITION: [(i8, u8); 15] = [
    (-2, 5),
    (-1, 10),
    (0, 15),
    (1, 10),
    (2, 10),
    (3, 10),
    (4, 10),
    (5, 10),
    (6, 10),
    (7, 10),
    (8, 10),
    (9, 10),
    (10, 10),
    (11, 10),
    (12, 10),
];

pub const DECK_SIZE: usize = 150;

/// A single card. The value never changes; visibility only ever goes from
/// hidden to visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    id: CardId,
    value: i8,
    #[serde(rename = "isVisible")]
    visible: bool,
}

impl Card {
    pub fn hidden(id: CardId, value: i8) -> Self {
        Self {
            id,
            value,
            visible: false,
        }
    }

    pub fn id(&self) -> CardId {
        self.id
    }

    pub fn value(&self) -> i8 {
        self.value
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Flip the card face up. Idempotent.
    pub fn turn_visible(&mut self) {
        self.visible = true;
    }

    /// Consume the card and return it face up.
    pub fn into_visible(mut self) -> Self {
        self.visible = true;
        self
    }

    /// Value as seen by clients: hidden cards carry no value.
    pub fn public_value(&self) -> Option<i8> {
        self.visible.then_some(self.value)
    }
}

/// Build an unshuffled full deck, every card hidden.
pub fn full_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    let mut next_id: CardId = 0;
    for (value, copies) in DECK_COMPOSITION {
        for _ in 0..copies {
            deck.push(Card::hidden(next_id, value));
            next_id += 1;
        }
    }
    deck
}

pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = full_deck();
    deck.shuffle(rng);
    deck
}
