use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::code::GameCode;
use crate::domain::state::Game;
use crate::store::{GameLock, GameStore, StoreError};

const GAME_INDEX_KEY: &str = "games";
const LOCK_TTL_MS: u64 = 5_000;
const LOCK_WAIT: Duration = Duration::from_secs(5);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(15);

/// Deletes the lock only if it still holds our token.
const RELEASE_LOCK: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Returns -1 when the game is gone, 0 on a version mismatch, 1 on write.
const COMPARE_AND_SWAP: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local stored = cjson.decode(current)
if tonumber(stored['version']) ~= tonumber(ARGV[1]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2])
return 1
";

/// Multi-process store backed by Redis. Games are JSON blobs under
/// `game:{code}`; locks are `lock:{code}` keys with a random token and a
/// TTL so a crashed holder cannot wedge the room.
pub struct RedisGameStore {
    conn: ConnectionManager,
    release: Script,
    cas: Script,
}

fn game_key(code: &GameCode) -> String {
    format!("game:{code}")
}

fn lock_key(code: &GameCode) -> String {
    format!("lock:{code}")
}

fn unavailable(detail: &str, err: redis::RedisError) -> StoreError {
    StoreError::Unavailable {
        detail: detail.to_string(),
        source: Box::new(err),
    }
}

impl RedisGameStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client =
            Client::open(redis_url).map_err(|err| unavailable("invalid REDIS_URL", err))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|err| unavailable("unable to initialize Redis connection manager", err))?;
        Ok(Self {
            conn,
            release: Script::new(RELEASE_LOCK),
            cas: Script::new(COMPARE_AND_SWAP),
        })
    }
}

#[async_trait]
impl GameStore for RedisGameStore {
    async fn lock(&self, code: &GameCode) -> Result<GameLock, StoreError> {
        let key = lock_key(code);
        let token = Uuid::new_v4();
        let started = Instant::now();
        let mut conn = self.conn.clone();

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(token.to_string())
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL_MS)
                .query_async(&mut conn)
                .await
                .map_err(|err| unavailable("failed to acquire game lock", err))?;
            if acquired.is_some() {
                return Ok(GameLock::remote(code.clone(), token));
            }
            if started.elapsed() >= LOCK_WAIT {
                warn!(game_code = %code, "gave up waiting for game lock");
                return Err(StoreError::LockTimeout { code: code.clone() });
            }
            sleep(LOCK_RETRY_DELAY).await;
        }
    }

    async fn unlock(&self, lock: GameLock) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let released: i64 = self
            .release
            .key(lock_key(&lock.code))
            .arg(lock.token.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to release game lock", err))?;
        if released == 0 {
            // The TTL ran out and someone else may hold it now.
            debug!(game_code = %lock.code, "lock already expired on release");
        }
        Ok(())
    }

    async fn load(&self, code: &GameCode) -> Result<Option<Game>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(game_key(code))
            .query_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to load game", err))?;
        raw.map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn insert(&self, game: &Game) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(game)?;
        let mut conn = self.conn.clone();
        let created: bool = redis::cmd("SETNX")
            .arg(game_key(&game.code))
            .arg(encoded)
            .query_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to store game", err))?;
        if !created {
            return Err(StoreError::AlreadyExists {
                code: game.code.clone(),
            });
        }
        let _: i64 = redis::cmd("SADD")
            .arg(GAME_INDEX_KEY)
            .arg(game.code.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to index game", err))?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        game: &Game,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(game)?;
        let mut conn = self.conn.clone();
        let outcome: i64 = self
            .cas
            .key(game_key(&game.code))
            .arg(expected_version)
            .arg(encoded)
            .invoke_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to write game", err))?;
        match outcome {
            1 => Ok(()),
            -1 => Err(StoreError::NotFound {
                code: game.code.clone(),
            }),
            _ => Err(StoreError::Conflict {
                code: game.code.clone(),
                expected: expected_version,
                found: None,
            }),
        }
    }

    async fn remove(&self, code: &GameCode) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(game_key(code))
            .query_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to delete game", err))?;
        let _: i64 = redis::cmd("SREM")
            .arg(GAME_INDEX_KEY)
            .arg(code.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to unindex game", err))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Game>, StoreError> {
        let mut conn = self.conn.clone();
        let codes: Vec<String> = redis::cmd("SMEMBERS")
            .arg(GAME_INDEX_KEY)
            .query_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to list games", err))?;
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = codes
            .iter()
            .map(|code| game_key(&GameCode::from(code.as_str())))
            .collect();
        let blobs: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(|err| unavailable("failed to load games", err))?;

        let mut games = Vec::with_capacity(blobs.len());
        for blob in blobs.into_iter().flatten() {
            match serde_json::from_str::<Game>(&blob) {
                Ok(game) => games.push(game),
                Err(err) => warn!(error = %err, "skipping undecodable game"),
            }
        }
        Ok(games)
    }
}
