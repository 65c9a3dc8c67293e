use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::player::PlayerId;
use crate::domain::settings::SettingsUpdate;
use crate::domain::turns::PlayAction;
use crate::errors::domain::DomainError;
use crate::services::session_router::commit::Committed;
use crate::services::session_router::{ConnId, SessionRouter};
use crate::ws::protocol::{ChatMessage, ServerMsg};

const MAX_CHAT_LEN: usize = 500;

impl SessionRouter {
    pub(super) async fn play(
        &self,
        conn: ConnId,
        action: PlayAction,
        client_version: Option<u64>,
    ) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let player_id = binding.player_id;

        let committed = self
            .mutate(&binding.code, |game| {
                if let Some(seen) = client_version.filter(|seen| *seen != game.version) {
                    // Authoritative anyway; the reply carries the real version.
                    debug!(
                        game_code = %game.code,
                        player_id = %player_id,
                        client_version = seen,
                        version = game.version,
                        "client acted on a stale version"
                    );
                }
                game.play(&player_id, action, &mut rand::rng())
            })
            .await?;

        let outcome = committed.value;
        if outcome.game_finished {
            info!(
                game_code = %binding.code,
                winners = ?committed.game.winners(),
                "game finished"
            );
        } else if outcome.round_ended {
            info!(
                game_code = %binding.code,
                round = committed.game.round.number,
                "round ended"
            );
        }
        self.publish_committed(conn, player_id, &committed);
        Ok(())
    }

    pub(super) async fn start(&self, conn: ConnId) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let player_id = binding.player_id;
        let committed = self
            .mutate(&binding.code, |game| game.start(&player_id, &mut rand::rng()))
            .await?;
        info!(game_code = %binding.code, player_id = %player_id, "game started");
        self.publish_committed(conn, player_id, &committed);
        Ok(())
    }

    pub(super) async fn update_settings(
        &self,
        conn: ConnId,
        update: SettingsUpdate,
    ) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let player_id = binding.player_id;
        let committed = self
            .mutate(&binding.code, |game| game.update_settings(&player_id, &update))
            .await?;
        self.publish_committed(conn, player_id, &committed);
        Ok(())
    }

    pub(super) async fn replay(
        &self,
        conn: ConnId,
        client_version: Option<u64>,
    ) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let player_id = binding.player_id;
        let committed = self
            .mutate(&binding.code, |game| {
                if client_version.is_some_and(|seen| seen != game.version) {
                    debug!(game_code = %game.code, "replay requested on a stale version");
                }
                game.request_replay(&player_id)
            })
            .await?;
        self.publish_committed(conn, player_id, &committed);
        Ok(())
    }

    /// Resync: nothing when the client is current, else the full snapshot.
    /// Reads without taking the game lock.
    pub(super) async fn get(
        &self,
        conn: ConnId,
        client_version: Option<u64>,
    ) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let game = self
            .store
            .load(&binding.code)
            .await?
            .ok_or_else(|| DomainError::GameNotFound {
                code: binding.code.clone(),
            })?;
        if client_version == Some(game.version) {
            return Ok(());
        }
        debug!(
            game_code = %binding.code,
            client_version = ?client_version,
            version = game.version,
            "sending full snapshot"
        );
        self.send_snapshot(conn, &game, &binding.player_id);
        Ok(())
    }

    /// Chat is relayed to the whole room under the sender's seat name and
    /// never stored.
    pub(super) async fn chat(&self, conn: ConnId, text: String) -> Result<(), DomainError> {
        let binding = self.bound(conn)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let game = self
            .store
            .load(&binding.code)
            .await?
            .ok_or_else(|| DomainError::GameNotFound {
                code: binding.code.clone(),
            })?;
        let username = game
            .player(&binding.player_id)
            .map(|player| player.name.clone())
            .ok_or_else(|| DomainError::player_not_found(&binding.code, binding.player_id))?;
        let text: String = text.chars().take(MAX_CHAT_LEN).collect();
        self.send_room(
            &binding.code,
            None,
            ServerMsg::Message(ChatMessage {
                id: Uuid::new_v4(),
                username,
                text,
            }),
        );
        Ok(())
    }

    fn publish_committed<T>(&self, conn: ConnId, player_id: PlayerId, committed: &Committed<T>) {
        if let Some(commit) = &committed.commit {
            self.publish(&committed.game, commit, Some((conn, player_id)));
        }
    }
}
