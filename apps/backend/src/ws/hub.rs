//! In-process room registry: live connections, room membership and fan-out.

use std::collections::HashSet;
use std::sync::Arc;

use actix::prelude::*;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::code::GameCode;
use crate::services::session_router::{ConnId, Delivery, Outbox, Target};
use crate::ws::broker::{RealtimeBroker, RoomEnvelope};
use crate::ws::session::HubEvent;

pub struct RoomHub {
    /// Distinguishes this process's publications from its peers'.
    instance_id: Uuid,
    connections: DashMap<ConnId, Recipient<HubEvent>>,
    rooms: DashMap<GameCode, HashSet<ConnId>>,
    broker: OnceCell<Arc<RealtimeBroker>>,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomHub {
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            connections: DashMap::new(),
            rooms: DashMap::new(),
            broker: OnceCell::new(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Route room deliveries through `broker` as well, so peers sharing the
    /// store reach their local members. Only the first call takes effect.
    pub fn attach_broker(&self, broker: Arc<RealtimeBroker>) {
        if self.broker.set(broker).is_err() {
            warn!("realtime broker already attached");
        }
    }

    pub fn register(&self, conn: ConnId, recipient: Recipient<HubEvent>) {
        self.connections.insert(conn, recipient);
    }

    pub fn unregister(&self, conn: ConnId) {
        self.connections.remove(&conn);
        self.rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn send_to(&self, conn: ConnId, frame: Arc<str>) {
        if let Some(recipient) = self.connections.get(&conn) {
            recipient.do_send(HubEvent::Frame(frame));
        }
    }

    /// Deliver to this process's members of `code`.
    pub fn deliver_local(&self, code: &GameCode, except: Option<ConnId>, frame: Arc<str>) {
        let members: Vec<ConnId> = match self.rooms.get(code) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|conn| Some(*conn) != except)
                .collect(),
            None => return,
        };
        for conn in members {
            self.send_to(conn, frame.clone());
        }
    }

    /// Entry point for frames published by peers.
    pub fn deliver_remote(&self, envelope: RoomEnvelope) {
        if envelope.origin == self.instance_id {
            return;
        }
        let code = GameCode::from(envelope.code);
        self.deliver_local(&code, envelope.except, Arc::from(envelope.payload));
    }
}

impl Outbox for RoomHub {
    fn join_room(&self, code: &GameCode, conn: ConnId) {
        self.rooms.entry(code.clone()).or_default().insert(conn);
    }

    fn leave_room(&self, code: &GameCode, conn: ConnId) {
        self.rooms.remove_if_mut(code, |_, members| {
            members.remove(&conn);
            members.is_empty()
        });
    }

    fn deliver(&self, delivery: Delivery) {
        let frame: Arc<str> = match serde_json::to_string(&delivery.msg) {
            Ok(text) => Arc::from(text),
            Err(err) => {
                warn!(error = %err, "failed to serialize outbound message");
                return;
            }
        };
        match delivery.target {
            Target::Connection(conn) => self.send_to(conn, frame),
            Target::Room { code, except } => {
                self.deliver_local(&code, except, frame.clone());
                if let Some(broker) = self.broker.get() {
                    broker.publish(RoomEnvelope {
                        origin: self.instance_id,
                        code: code.as_str().to_string(),
                        except,
                        payload: frame.to_string(),
                    });
                } else {
                    debug!(game_code = %code, "no broker attached, local delivery only");
                }
            }
        }
    }
}
