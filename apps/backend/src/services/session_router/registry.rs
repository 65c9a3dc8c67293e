use dashmap::DashMap;

use crate::domain::code::GameCode;
use crate::domain::player::PlayerId;
use crate::services::session_router::outbox::ConnId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub code: GameCode,
    pub player_id: PlayerId,
}

/// Live connection ↔ player bindings for this process.
///
/// A player is bound to at most one connection; binding a new connection
/// for the same player silently detaches the old one.
#[derive(Default)]
pub struct SessionRegistry {
    by_conn: DashMap<ConnId, Binding>,
    by_player: DashMap<PlayerId, ConnId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection that previously held this player, if any.
    pub fn bind(&self, conn: ConnId, binding: Binding) -> Option<ConnId> {
        let previous = self
            .by_player
            .insert(binding.player_id, conn)
            .filter(|old| *old != conn);
        if let Some(old) = previous {
            self.by_conn.remove(&old);
        }
        self.by_conn.insert(conn, binding);
        previous
    }

    pub fn unbind(&self, conn: ConnId) -> Option<Binding> {
        let (_, binding) = self.by_conn.remove(&conn)?;
        self.by_player
            .remove_if(&binding.player_id, |_, bound| *bound == conn);
        Some(binding)
    }

    pub fn binding(&self, conn: ConnId) -> Option<Binding> {
        self.by_conn.get(&conn).map(|entry| entry.value().clone())
    }

    pub fn connection_of(&self, player_id: &PlayerId) -> Option<ConnId> {
        self.by_player.get(player_id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.by_conn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }
}
