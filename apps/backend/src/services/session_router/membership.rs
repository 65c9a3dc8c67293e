use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::domain::code::GameCode;
use crate::domain::player::{Player, PlayerId, PlayerProfile};
use crate::domain::settings::MIN_PLAYERS;
use crate::domain::state::{Game, GameStatus};
use crate::errors::domain::DomainError;
use crate::services::session_router::commit::Committed;
use crate::services::session_router::kick::{self, VoteState};
use crate::services::session_router::{Binding, ConnId, SessionRouter};
use crate::store::StoreError;
use crate::ws::protocol::{JoinRequest, ServerMsg, ServerNotice, SystemEvent};

const CODE_ATTEMPTS: usize = 5;

type Removal = (Player, Option<VoteState>);

impl SessionRouter {
    pub(super) async fn create(
        &self,
        conn: ConnId,
        profile: PlayerProfile,
        private: bool,
    ) -> Result<(), DomainError> {
        self.leave_current(conn).await?;
        self.create_game(conn, profile, private).await
    }

    async fn create_game(
        &self,
        conn: ConnId,
        profile: PlayerProfile,
        private: bool,
    ) -> Result<(), DomainError> {
        for _ in 0..CODE_ATTEMPTS {
            let game = Game::new(GameCode::generate(), profile.clone(), private);
            match self.store.insert(&game).await {
                Ok(()) => {
                    info!(
                        game_code = %game.code,
                        player_id = %game.admin_id,
                        conn_id = %conn,
                        private,
                        "game created"
                    );
                    self.seat(conn, &game, game.admin_id);
                    return Ok(());
                }
                Err(StoreError::AlreadyExists { code }) => {
                    debug!(game_code = %code, "game code collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(DomainError::internal("could not allocate a free game code"))
    }

    /// Join the oldest public lobby with a free seat, or open a new one.
    pub(super) async fn find(
        &self,
        conn: ConnId,
        profile: PlayerProfile,
    ) -> Result<(), DomainError> {
        self.leave_current(conn).await?;

        let mut open: Vec<Game> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|game| {
                game.status == GameStatus::Lobby && !game.settings.private && !game.is_full()
            })
            .collect();
        open.sort_by_key(|game| game.created_at);

        for game in open {
            match self.join_game(conn, &game.code, profile.clone()).await {
                Ok(()) => return Ok(()),
                // Filled up or started since it was listed.
                Err(
                    DomainError::GameIsFull { .. }
                    | DomainError::GameAlreadyStarted { .. }
                    | DomainError::GameNotFound { .. },
                ) => continue,
                Err(err) => return Err(err),
            }
        }
        self.create_game(conn, profile, false).await
    }

    pub(super) async fn join(
        &self,
        conn: ConnId,
        request: JoinRequest,
    ) -> Result<(), DomainError> {
        self.leave_current(conn).await?;
        let code = GameCode::from(request.game_code.trim().to_uppercase());
        self.join_game(conn, &code, request.player).await
    }

    async fn join_game(
        &self,
        conn: ConnId,
        code: &GameCode,
        profile: PlayerProfile,
    ) -> Result<(), DomainError> {
        let committed = self
            .mutate(code, |game| game.add_player(profile.clone()))
            .await?;
        let player_id = committed.value;

        info!(game_code = %code, player_id = %player_id, conn_id = %conn, "player joined");
        self.seat(conn, &committed.game, player_id);
        if let Some(commit) = &committed.commit {
            self.publish_to_others(&committed.game, commit, conn);
        }
        self.system(code, SystemEvent::PlayerJoined, &profile.username);
        Ok(())
    }

    /// Bind `conn` to a seat, put it in the room and hand it the full state.
    fn seat(&self, conn: ConnId, game: &Game, player_id: PlayerId) {
        let previous = self.sessions.bind(
            conn,
            Binding {
                code: game.code.clone(),
                player_id,
            },
        );
        if let Some(old) = previous {
            info!(
                game_code = %game.code,
                player_id = %player_id,
                conn_id = %old,
                "seat taken over by a new connection"
            );
            self.outbox.leave_room(&game.code, old);
            self.send(
                old,
                ServerMsg::ServerNotice(ServerNotice {
                    id: uuid::Uuid::new_v4(),
                    text: "This seat was resumed from another connection".to_string(),
                }),
            );
        }
        self.outbox.join_room(&game.code, conn);
        self.send_snapshot(conn, game, &player_id);
    }

    pub(super) async fn leave(&self, conn: ConnId) -> Result<(), DomainError> {
        self.leave_current(conn).await?;
        self.send(conn, ServerMsg::LeaveSuccess);
        Ok(())
    }

    /// Give up whatever seat `conn` holds, if any.
    async fn leave_current(&self, conn: ConnId) -> Result<(), DomainError> {
        let Some(binding) = self.sessions.unbind(conn) else {
            return Ok(());
        };
        self.outbox.leave_room(&binding.code, conn);

        let player_id = binding.player_id;
        let result = self
            .mutate(&binding.code, |game| {
                let removed = game.remove_player(&player_id, &mut rand::rng())?;
                let vote = kick::settle(game, &mut rand::rng())?;
                Ok((removed, vote))
            })
            .await;
        match result {
            Ok(committed) => {
                self.announce_removal(committed, SystemEvent::PlayerLeft);
                Ok(())
            }
            // Already gone (kicked, expired or the game was deleted).
            Err(DomainError::GameNotFound { .. } | DomainError::PlayerNotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn announce_removal(&self, committed: Committed<Removal>, event: SystemEvent) {
        let Committed {
            value: (removed, vote),
            game,
            commit,
        } = committed;
        info!(
            game_code = %game.code,
            player_id = %removed.id,
            remaining = game.players.len(),
            "player removed"
        );
        if let Some(commit) = &commit {
            self.publish(&game, commit, None);
        }
        self.system(&game.code, event, &removed.name);
        self.announce_vote(&game, vote);
        if game.status == GameStatus::Stopped && !game.players.is_empty() {
            self.notice(&game.code, "Not enough players left, the game is stopped");
        }
    }

    /// Unbind a removed player's live connection, if it is on this process.
    pub(super) fn detach_player(&self, code: &GameCode, player_id: &PlayerId) {
        let Some(conn) = self.sessions.connection_of(player_id) else {
            return;
        };
        self.sessions.unbind(conn);
        self.outbox.leave_room(code, conn);
        self.send(conn, ServerMsg::LeaveSuccess);
    }

    pub(super) async fn disconnect(&self, conn: ConnId) -> Result<(), DomainError> {
        let Some(Binding { code, player_id }) = self.sessions.unbind(conn) else {
            return Ok(());
        };
        self.outbox.leave_room(&code, conn);

        let now = OffsetDateTime::now_utc();
        let result = self
            .mutate(&code, |game| {
                game.mark_disconnected(&player_id, now, &mut rand::rng())?;
                let stamp = game.player(&player_id).and_then(|p| p.disconnected_at);
                let vote = kick::settle(game, &mut rand::rng())?;
                Ok((stamp, vote))
            })
            .await;
        let committed = match result {
            Ok(committed) => committed,
            Err(DomainError::GameNotFound { .. } | DomainError::PlayerNotFound { .. }) => {
                return Ok(())
            }
            Err(err) => return Err(err),
        };
        let Committed {
            value: (stamp, vote),
            game,
            commit,
        } = committed;

        info!(game_code = %code, player_id = %player_id, conn_id = %conn, "player disconnected");
        if let Some(commit) = &commit {
            self.publish(&game, commit, None);
        }
        if let Some(player) = game.player(&player_id) {
            self.system(&code, SystemEvent::PlayerDisconnected, &player.name);
        }
        self.announce_vote(&game, vote);
        if game.status == GameStatus::Playing && game.connected_count() < MIN_PLAYERS {
            self.notice(&code, "Waiting for players to reconnect");
        }
        if let Some(stamp) = stamp {
            self.schedule_grace_expiry(code, player_id, stamp);
        }
        Ok(())
    }

    fn schedule_grace_expiry(&self, code: GameCode, player_id: PlayerId, stamp: OffsetDateTime) {
        let router = self.clone();
        let grace = self.config.reconnect_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            router.expire_grace(code, player_id, stamp).await;
        });
    }

    /// Remove `player_id` if they are still disconnected since `stamp`.
    pub(super) async fn expire_grace(
        &self,
        code: GameCode,
        player_id: PlayerId,
        stamp: OffsetDateTime,
    ) {
        let result = self
            .mutate(&code, |game| {
                let expired = game
                    .player(&player_id)
                    .is_some_and(|p| !p.is_connected() && p.disconnected_at == Some(stamp));
                if !expired {
                    return Ok(None);
                }
                let removed = game.remove_player(&player_id, &mut rand::rng())?;
                let vote = kick::settle(game, &mut rand::rng())?;
                Ok(Some((removed, vote)))
            })
            .await;

        match result {
            Ok(Committed {
                value: Some(removal),
                game,
                commit,
            }) => {
                info!(game_code = %code, player_id = %player_id, "reconnect grace expired");
                self.announce_removal(
                    Committed {
                        value: removal,
                        game,
                        commit,
                    },
                    SystemEvent::PlayerLeft,
                );
            }
            Ok(_) | Err(DomainError::GameNotFound { .. }) => {}
            Err(err) => {
                warn!(
                    game_code = %code,
                    player_id = %player_id,
                    error = %err,
                    "failed to expire reconnect grace"
                );
            }
        }
    }

    pub(super) async fn reconnect(
        &self,
        conn: ConnId,
        code: GameCode,
        player_id: PlayerId,
    ) -> Result<(), DomainError> {
        let code = GameCode::from(code.as_str().trim().to_uppercase());
        if let Some(current) = self.sessions.binding(conn) {
            if current.code != code || current.player_id != player_id {
                self.leave_current(conn).await?;
            }
        }

        let committed = self
            .mutate(&code, |game| game.mark_reconnected(&player_id))
            .await
            .map_err(|err| match err {
                DomainError::GameNotFound { code } => {
                    DomainError::CannotReconnect { code, player_id }
                }
                other => other,
            })?;

        info!(game_code = %code, player_id = %player_id, conn_id = %conn, "player reconnected");
        self.seat(conn, &committed.game, player_id);
        if let Some(commit) = &committed.commit {
            self.publish_to_others(&committed.game, commit, conn);
            if let Some(player) = committed.game.player(&player_id) {
                self.system(&code, SystemEvent::PlayerReconnected, &player.name);
            }
        }
        Ok(())
    }
}
