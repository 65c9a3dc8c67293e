//! Session router: binds connections to players and funnels client events
//! into the game aggregate.
//!
//! Every mutation goes through [`SessionRouter::mutate`], which holds the
//! per-game lock only for load → apply → stamp → write. Deliveries happen
//! after the lock is released. Errors go back to the originating connection
//! only.

mod commit;
mod kick;
mod membership;
pub mod outbox;
mod play;
pub mod registry;

#[cfg(test)]
mod tests_router;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::domain::code::GameCode;
use crate::domain::player::PlayerId;
use crate::domain::state::Game;
use crate::domain::turns::PlayAction;
use crate::errors::domain::DomainError;
use crate::protocol::game_state::{GameView, ViewerState};
use crate::store::GameStore;
use crate::sync::Commit;
use crate::ws::protocol::{
    ClientMsg, ErrorPayload, GameSnapshot, GameUpdate, ServerMsg, ServerNotice, SystemEvent,
    SystemMessage,
};
#[cfg(test)]
pub use outbox::RecordingOutbox;
pub use outbox::{ConnId, Delivery, Outbox, Target};
pub use registry::{Binding, SessionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// How long a disconnected player keeps their seat.
    pub reconnect_grace: Duration,
    pub kick_vote_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(60),
            kick_vote_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct SessionRouter {
    store: Arc<dyn GameStore>,
    sessions: Arc<SessionRegistry>,
    outbox: Arc<dyn Outbox>,
    config: RouterConfig,
}

impl SessionRouter {
    pub fn new(
        store: Arc<dyn GameStore>,
        sessions: Arc<SessionRegistry>,
        outbox: Arc<dyn Outbox>,
        config: RouterConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            outbox,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Handle one inbound event. Failures are reported to `conn` on the
    /// error channel that matches the event.
    pub async fn handle(&self, conn: ConnId, msg: ClientMsg) {
        let event = msg.name();
        let channel: fn(ErrorPayload) -> ServerMsg = match &msg {
            ClientMsg::CreatePrivate(_) | ClientMsg::Find(_) | ClientMsg::Join(_) => {
                ServerMsg::JoinError
            }
            ClientMsg::Reconnect { .. } => ServerMsg::ReconnectError,
            _ => ServerMsg::Error,
        };

        let result = match msg {
            ClientMsg::CreatePrivate(profile) => self.create(conn, profile, true).await,
            ClientMsg::Find(profile) => self.find(conn, profile).await,
            ClientMsg::Join(request) => self.join(conn, request).await,
            ClientMsg::Start => self.start(conn).await,
            ClientMsg::UpdateSettings(update) => self.update_settings(conn, update).await,
            ClientMsg::RevealCard(req) => {
                self.play(conn, PlayAction::RevealCard(req.position), req.version)
                    .await
            }
            ClientMsg::PickCard(req) => {
                self.play(conn, PlayAction::PickCard(req.source), req.version)
                    .await
            }
            ClientMsg::ReplaceCard(req) => {
                self.play(conn, PlayAction::ReplaceCard(req.position), req.version)
                    .await
            }
            ClientMsg::DiscardSelectedCard { version } => {
                self.play(conn, PlayAction::DiscardSelectedCard, version)
                    .await
            }
            ClientMsg::TurnCard(req) => {
                self.play(conn, PlayAction::TurnCard(req.position), req.version)
                    .await
            }
            ClientMsg::Replay { version } => self.replay(conn, version).await,
            ClientMsg::Get(version) => self.get(conn, version).await,
            ClientMsg::InitiateKickVote { target_id } => {
                self.initiate_kick_vote(conn, target_id).await
            }
            ClientMsg::KickVote { vote } => self.cast_kick_vote(conn, vote).await,
            ClientMsg::Reconnect {
                game_code,
                player_id,
            } => {
                self.reconnect(conn, GameCode::from(game_code), player_id)
                    .await
            }
            ClientMsg::Leave => self.leave(conn).await,
            ClientMsg::Message { text, .. } => self.chat(conn, text).await,
        };

        if let Err(err) = result {
            self.reject(conn, event, &err, channel);
        }
    }

    /// Transport-level close. The seat is kept for the grace period.
    pub async fn connection_closed(&self, conn: ConnId) {
        if let Err(err) = self.disconnect(conn).await {
            error!(conn_id = %conn, error = %err, "failed to record disconnect");
        }
    }

    fn reject(
        &self,
        conn: ConnId,
        event: &'static str,
        err: &DomainError,
        channel: fn(ErrorPayload) -> ServerMsg,
    ) {
        let game_code = err.game_code().map(GameCode::as_str).unwrap_or_default();
        match err {
            DomainError::Internal { detail } => {
                error!(conn_id = %conn, event, game_code, detail = %detail, "event failed");
            }
            _ => debug!(conn_id = %conn, event, game_code, error = %err, "event rejected"),
        }
        self.send(
            conn,
            channel(ErrorPayload {
                code: err.code(),
                message: err.client_message(),
            }),
        );
    }

    fn bound(&self, conn: ConnId) -> Result<Binding, DomainError> {
        self.sessions.binding(conn).ok_or(DomainError::NotInGame)
    }

    fn send(&self, conn: ConnId, msg: ServerMsg) {
        self.outbox.deliver(Delivery::to_connection(conn, msg));
    }

    fn send_room(&self, code: &GameCode, except: Option<ConnId>, msg: ServerMsg) {
        self.outbox.deliver(Delivery::to_room(code, except, msg));
    }

    fn send_snapshot(&self, conn: ConnId, game: &Game, player_id: &PlayerId) {
        self.send(
            conn,
            ServerMsg::Game(GameSnapshot {
                game: GameView::from(game),
                version: game.version,
                viewer: ViewerState::for_player(game, player_id),
            }),
        );
    }

    /// Fan a commit out to the room. The originator, if any, gets its own
    /// echo carrying the private viewer block.
    fn publish(&self, game: &Game, commit: &Commit, origin: Option<(ConnId, PlayerId)>) {
        info!(
            game_code = %game.code,
            version = commit.version,
            "committed game update"
        );
        let update = |viewer| {
            ServerMsg::GameUpdate(GameUpdate {
                operation: commit.operation.clone(),
                version: commit.version,
                viewer,
            })
        };
        self.send_room(&game.code, origin.map(|(conn, _)| conn), update(None));
        if let Some((conn, player_id)) = origin {
            self.send(conn, update(ViewerState::for_player(game, &player_id)));
        }
    }

    /// Like [`Self::publish`] for a connection that was just handed a full
    /// snapshot at this version.
    fn publish_to_others(&self, game: &Game, commit: &Commit, conn: ConnId) {
        self.send_room(
            &game.code,
            Some(conn),
            ServerMsg::GameUpdate(GameUpdate {
                operation: commit.operation.clone(),
                version: commit.version,
                viewer: None,
            }),
        );
    }

    fn system(&self, code: &GameCode, event: SystemEvent, username: &str) {
        self.send_room(
            code,
            None,
            ServerMsg::SystemMessage(SystemMessage {
                id: uuid::Uuid::new_v4(),
                event,
                username: username.to_string(),
            }),
        );
    }

    fn notice(&self, code: &GameCode, text: &str) {
        self.send_room(
            code,
            None,
            ServerMsg::ServerNotice(ServerNotice {
                id: uuid::Uuid::new_v4(),
                text: text.to_string(),
            }),
        );
    }
}
