use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::code::GameCode;
use crate::domain::state::Game;
use crate::store::{GameLock, GameStore, StoreError};

/// Single-process store: games in a `DashMap`, one async mutex per code.
#[derive(Default)]
pub struct MemoryGameStore {
    games: DashMap<GameCode, Game>,
    locks: DashMap<GameCode, Arc<Mutex<()>>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, code: &GameCode) -> Arc<Mutex<()>> {
        self.locks
            .entry(code.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn lock(&self, code: &GameCode) -> Result<GameLock, StoreError> {
        let guard = self.mutex_for(code).lock_owned().await;
        Ok(GameLock {
            code: code.clone(),
            token: Uuid::new_v4(),
            guard: Some(guard),
        })
    }

    /// Releases the guard, then drops the code's mutex once nobody holds or
    /// waits on it.
    async fn unlock(&self, lock: GameLock) -> Result<(), StoreError> {
        let code = lock.code.clone();
        drop(lock);
        self.locks
            .remove_if(&code, |_, mutex| Arc::strong_count(mutex) == 1);
        Ok(())
    }

    async fn load(&self, code: &GameCode) -> Result<Option<Game>, StoreError> {
        Ok(self.games.get(code).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, game: &Game) -> Result<(), StoreError> {
        match self.games.entry(game.code.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists {
                code: game.code.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(game.clone());
                Ok(())
            }
        }
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        game: &Game,
    ) -> Result<(), StoreError> {
        let Some(mut stored) = self.games.get_mut(&game.code) else {
            return Err(StoreError::NotFound {
                code: game.code.clone(),
            });
        };
        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                code: game.code.clone(),
                expected: expected_version,
                found: Some(stored.version),
            });
        }
        *stored = game.clone();
        Ok(())
    }

    async fn remove(&self, code: &GameCode) -> Result<(), StoreError> {
        self.games.remove(code);
        self.locks.remove(code);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Game>, StoreError> {
        Ok(self.games.iter().map(|entry| entry.value().clone()).collect())
    }
}
