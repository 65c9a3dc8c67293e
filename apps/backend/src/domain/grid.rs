//! A player's card grid, stored column-major (`columns[column][row]`).

use serde::{Deserialize, Serialize};

use crate::domain::cards::Card;
use crate::domain::settings::GameSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub column: usize,
    pub row: usize,
}

impl Position {
    pub const fn new(column: usize, row: usize) -> Self {
        Self { column, row }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    columns: Vec<Vec<Card>>,
}

impl Grid {
    /// Deal a grid off the end of `deck`. The caller guarantees the deck is
    /// large enough (enforced by settings validation).
    pub fn deal(deck: &mut Vec<Card>, settings: &GameSettings) -> Self {
        let rows = settings.card_per_column as usize;
        let columns = (0..settings.card_per_row)
            .map(|_| {
                let split = deck.len().saturating_sub(rows);
                deck.split_off(split)
            })
            .collect();
        Self { columns }
    }

    #[cfg(test)]
    pub(crate) fn from_columns(columns: Vec<Vec<Card>>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Vec<Card>] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(Vec::is_empty)
    }

    pub fn get(&self, pos: Position) -> Option<&Card> {
        self.columns.get(pos.column)?.get(pos.row)
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.get(pos).is_some()
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.columns.iter().flatten()
    }

    pub fn visible_count(&self) -> usize {
        self.cards().filter(|c| c.is_visible()).count()
    }

    pub fn all_visible(&self) -> bool {
        self.cards().all(Card::is_visible)
    }

    /// Sum of the visible cards only.
    pub fn visible_sum(&self) -> i32 {
        self.cards()
            .filter(|c| c.is_visible())
            .map(|c| c.value() as i32)
            .sum()
    }

    /// Hidden positions in column-major order.
    pub fn hidden_positions(&self) -> Vec<Position> {
        self.columns
            .iter()
            .enumerate()
            .flat_map(|(c, column)| {
                column
                    .iter()
                    .enumerate()
                    .filter(|(_, card)| !card.is_visible())
                    .map(move |(r, _)| Position::new(c, r))
            })
            .collect()
    }

    /// Turn the card at `pos` face up. Returns false when out of range.
    pub fn turn(&mut self, pos: Position) -> bool {
        match self
            .columns
            .get_mut(pos.column)
            .and_then(|col| col.get_mut(pos.row))
        {
            Some(card) => {
                card.turn_visible();
                true
            }
            None => false,
        }
    }

    /// Swap `card` in at `pos` face up and return the previous card.
    pub fn replace(&mut self, pos: Position, card: Card) -> Option<Card> {
        let slot = self.columns.get_mut(pos.column)?.get_mut(pos.row)?;
        Some(std::mem::replace(slot, card.into_visible()))
    }

    pub fn reveal_all(&mut self) {
        self.columns
            .iter_mut()
            .flatten()
            .for_each(Card::turn_visible);
    }

    /// Remove complete columns and rows of equal visible values. Columns are
    /// evaluated first; rows are evaluated on what remains. Returns the
    /// removed cards in removal order.
    pub fn clear_matching(&mut self, settings: &GameSettings) -> Vec<Card> {
        let mut removed = Vec::new();
        if settings.allow_skyjo_for_column {
            removed.extend(self.clear_columns());
        }
        if settings.allow_skyjo_for_row {
            removed.extend(self.clear_rows());
        }
        removed
    }

    fn clear_columns(&mut self) -> Vec<Card> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.columns.len());
        for column in self.columns.drain(..) {
            if column.len() > 1 && uniform_visible(column.iter()) {
                removed.extend(column);
            } else {
                kept.push(column);
            }
        }
        self.columns = kept;
        removed
    }

    fn clear_rows(&mut self) -> Vec<Card> {
        let mut removed = Vec::new();
        if self.columns.len() < 2 {
            return removed;
        }
        let rows = self.columns.iter().map(Vec::len).min().unwrap_or(0);
        // Walk backwards so removals do not shift rows still to be checked.
        for row in (0..rows).rev() {
            if uniform_visible(self.columns.iter().map(|col| &col[row])) {
                let mut cleared: Vec<Card> =
                    self.columns.iter_mut().map(|col| col.remove(row)).collect();
                removed.append(&mut cleared);
            }
        }
        self.columns.retain(|col| !col.is_empty());
        removed
    }
}

fn uniform_visible<'a>(mut cards: impl Iterator<Item = &'a Card>) -> bool {
    let Some(first) = cards.next() else {
        return false;
    };
    first.is_visible() && cards.all(|c| c.is_visible() && c.value() == first.value())
}
