use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::domain::code::GameCode;
use crate::domain::state::Game;
use crate::errors::domain::DomainError;
use crate::services::session_router::SessionRouter;
use crate::store::StoreError;
use crate::sync::{self, Commit};

const COMMIT_ATTEMPTS: u32 = 3;

/// Result of a locked mutation.
pub(super) struct Committed<T> {
    pub value: T,
    /// The game as stored after the mutation (or as loaded, if unchanged).
    pub game: Game,
    /// `None` when the mutation changed nothing and was not written.
    pub commit: Option<Commit>,
}

impl SessionRouter {
    /// Lock `code`, apply `apply` to a copy of the stored game and write it
    /// back with the next version. `apply` runs against a fresh copy on each
    /// attempt, so an `Err` leaves the stored game untouched.
    ///
    /// A game left without players is deleted instead of written.
    pub(super) async fn mutate<T, F>(
        &self,
        code: &GameCode,
        mut apply: F,
    ) -> Result<Committed<T>, DomainError>
    where
        T: Send,
        F: FnMut(&mut Game) -> Result<T, DomainError> + Send,
    {
        let mut attempt = 1;
        loop {
            let lock = self.store.lock(code).await?;
            let result = self.apply_locked(code, &mut apply).await;
            if let Err(err) = self.store.unlock(lock).await {
                warn!(game_code = %code, error = %err, "failed to release game lock");
            }

            match result {
                Err(MutateError::Store(StoreError::Conflict {
                    expected, found, ..
                })) if attempt < COMMIT_ATTEMPTS => {
                    debug!(
                        game_code = %code,
                        expected,
                        found = ?found,
                        attempt,
                        "version conflict, retrying"
                    );
                    attempt += 1;
                }
                Err(MutateError::Store(err)) => return Err(err.into()),
                Err(MutateError::Rejected(err)) => return Err(err),
                Ok(committed) => return Ok(committed),
            }
        }
    }

    async fn apply_locked<T, F>(
        &self,
        code: &GameCode,
        apply: &mut F,
    ) -> Result<Committed<T>, MutateError>
    where
        T: Send,
        F: FnMut(&mut Game) -> Result<T, DomainError> + Send,
    {
        let before = self
            .store
            .load(code)
            .await?
            .ok_or_else(|| DomainError::GameNotFound { code: code.clone() })?;
        let mut after = before.clone();
        let value = apply(&mut after)?;

        let commit = sync::stamp(&before, &mut after, OffsetDateTime::now_utc())
            .map_err(|err| DomainError::internal(format!("failed to diff game state: {err}")))?;
        if commit.is_some() {
            if after.players.is_empty() {
                self.store.remove(code).await?;
                debug!(game_code = %code, "removed empty game");
            } else {
                self.store.compare_and_swap(before.version, &after).await?;
            }
        }

        Ok(Committed {
            value,
            game: after,
            commit,
        })
    }
}

enum MutateError {
    Store(StoreError),
    Rejected(DomainError),
}

impl From<StoreError> for MutateError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<DomainError> for MutateError {
    fn from(err: DomainError) -> Self {
        Self::Rejected(err)
    }
}
