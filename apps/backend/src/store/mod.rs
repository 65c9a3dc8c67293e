//! Shared game-state storage with a per-game lock.
//!
//! Every mutation follows lock → load → mutate → `compare_and_swap` →
//! unlock. The lock serialises writers inside and across processes; the
//! version check on write catches anything that slipped past an expired
//! lock.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::domain::code::GameCode;
use crate::domain::state::Game;
use crate::errors::domain::DomainError;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryGameStore;
pub use redis_store::RedisGameStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("game {code} already exists")]
    AlreadyExists { code: GameCode },
    #[error("game {code} not found")]
    NotFound { code: GameCode },
    #[error("version conflict on {code}: expected {expected}, found {found:?}")]
    Conflict {
        code: GameCode,
        expected: u64,
        found: Option<u64>,
    },
    #[error("timed out waiting for the lock on {code}")]
    LockTimeout { code: GameCode },
    #[error("failed to encode or decode game state: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("store unavailable: {detail}")]
    Unavailable {
        detail: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { code } => DomainError::GameNotFound { code },
            other => DomainError::internal(other.to_string()),
        }
    }
}

/// Proof of holding the per-game lock. Hand it back to `unlock`.
#[derive(Debug)]
pub struct GameLock {
    pub code: GameCode,
    pub token: Uuid,
    pub(crate) guard: Option<OwnedMutexGuard<()>>,
}

impl GameLock {
    pub(crate) fn remote(code: GameCode, token: Uuid) -> Self {
        Self {
            code,
            token,
            guard: None,
        }
    }
}

#[async_trait]
pub trait GameStore: Send + Sync {
    /// Wait for exclusive access to `code`.
    async fn lock(&self, code: &GameCode) -> Result<GameLock, StoreError>;

    async fn unlock(&self, lock: GameLock) -> Result<(), StoreError>;

    async fn load(&self, code: &GameCode) -> Result<Option<Game>, StoreError>;

    /// Store a brand-new game; fails if the code is taken.
    async fn insert(&self, game: &Game) -> Result<(), StoreError>;

    /// Replace the stored game only if its version is still `expected_version`.
    async fn compare_and_swap(&self, expected_version: u64, game: &Game)
        -> Result<(), StoreError>;

    async fn remove(&self, code: &GameCode) -> Result<(), StoreError>;

    /// Every stored game. Read-only; never takes a lock.
    async fn list(&self) -> Result<Vec<Game>, StoreError>;
}
