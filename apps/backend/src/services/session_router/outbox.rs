//! Delivery seam between the router and the transport.

#[cfg(test)]
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::code::GameCode;
use crate::ws::protocol::ServerMsg;

pub type ConnId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Connection(ConnId),
    /// Every connection in the room, optionally skipping one.
    Room {
        code: GameCode,
        except: Option<ConnId>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: Target,
    pub msg: ServerMsg,
}

impl Delivery {
    pub fn to_connection(conn: ConnId, msg: ServerMsg) -> Self {
        Self {
            target: Target::Connection(conn),
            msg,
        }
    }

    pub fn to_room(code: &GameCode, except: Option<ConnId>, msg: ServerMsg) -> Self {
        Self {
            target: Target::Room {
                code: code.clone(),
                except,
            },
            msg,
        }
    }
}

/// Room membership and fire-and-forget delivery. Implementations must not
/// block; the router calls these after releasing the game lock.
pub trait Outbox: Send + Sync {
    fn join_room(&self, code: &GameCode, conn: ConnId);
    fn leave_room(&self, code: &GameCode, conn: ConnId);
    fn deliver(&self, delivery: Delivery);
}

/// Outbox that only records what it was asked to do.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingOutbox {
    deliveries: Mutex<Vec<Delivery>>,
    rooms: Mutex<Vec<(GameCode, ConnId)>>,
}

#[cfg(test)]
impl RecordingOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything delivered so far.
    pub fn take(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.deliveries.lock())
    }

    pub fn members(&self, code: &GameCode) -> Vec<ConnId> {
        self.rooms
            .lock()
            .iter()
            .filter(|(room, _)| room == code)
            .map(|(_, conn)| *conn)
            .collect()
    }
}

#[cfg(test)]
impl Outbox for RecordingOutbox {
    fn join_room(&self, code: &GameCode, conn: ConnId) {
        let mut rooms = self.rooms.lock();
        if !rooms.iter().any(|(room, c)| room == code && *c == conn) {
            rooms.push((code.clone(), conn));
        }
    }

    fn leave_room(&self, code: &GameCode, conn: ConnId) {
        self.rooms
            .lock()
            .retain(|(room, c)| !(room == code && *c == conn));
    }

    fn deliver(&self, delivery: Delivery) {
        self.deliveries.lock().push(delivery);
    }
}
