use std::sync::Arc;

use crate::config::ServerConfig;
use crate::services::session_router::SessionRouter;
use crate::store::GameStore;
use crate::ws::hub::RoomHub;

/// Application state shared by every worker.
#[derive(Clone)]
pub struct AppState {
    router: SessionRouter,
    hub: Arc<RoomHub>,
    config: ServerConfig,
}

impl AppState {
    pub fn new(router: SessionRouter, hub: Arc<RoomHub>, config: ServerConfig) -> Self {
        Self {
            router,
            hub,
            config,
        }
    }

    pub fn router(&self) -> &SessionRouter {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        self.router.store()
    }

    pub fn hub(&self) -> Arc<RoomHub> {
        self.hub.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}
