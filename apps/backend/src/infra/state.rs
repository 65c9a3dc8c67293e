use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::services::session_router::{SessionRegistry, SessionRouter};
use crate::state::app_state::AppState;
use crate::store::{GameStore, MemoryGameStore, RedisGameStore};
use crate::ws::broker::RealtimeBroker;
use crate::ws::hub::RoomHub;

/// Builder for creating AppState instances (used in both tests and main)
pub struct StateBuilder {
    config: ServerConfig,
    store: Option<Arc<dyn GameStore>>,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            store: None,
        }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `store` instead of the one the config selects.
    pub fn with_store(mut self, store: Arc<dyn GameStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(self) -> Result<AppState, AppError> {
        let hub = Arc::new(RoomHub::new());

        let store: Arc<dyn GameStore> = match (self.store, &self.config.redis_url) {
            (Some(store), _) => store,
            (None, Some(url)) => {
                let store = RedisGameStore::connect(url).await.map_err(|err| {
                    AppError::config(format!("Unable to connect the Redis game store: {err}"), err)
                })?;
                let broker = RealtimeBroker::connect(url, &hub).await?;
                hub.attach_broker(broker);
                info!(instance_id = %hub.instance_id(), "using Redis game store");
                Arc::new(store)
            }
            (None, None) => {
                info!("REDIS_URL not set, using in-memory game store");
                Arc::new(MemoryGameStore::new())
            }
        };

        let router = SessionRouter::new(
            store,
            Arc::new(SessionRegistry::default()),
            hub.clone(),
            self.config.router,
        );
        Ok(AppState::new(router, hub, self.config))
    }
}

impl Default for StateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_state() -> StateBuilder {
    StateBuilder::new()
}
