use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WsRateLimit;
use crate::errors::DomainError;
use crate::services::session_router::{ConnId, SessionRouter};
use crate::state::app_state::AppState;
use crate::ws::hub::RoomHub;
use crate::ws::protocol::{ClientMsg, ErrorPayload, ServerMsg};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

pub async fn upgrade(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = WsSession::new(
        Uuid::new_v4(),
        app_state.router().clone(),
        app_state.hub(),
        app_state.config().ws_rate_limit,
    );
    ws::start(session, &req, stream)
}

/// Pre-serialized frames pushed to a session by the hub.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub enum HubEvent {
    Frame(Arc<str>),
}

/// Fixed-window inbound message budget for one connection.
#[derive(Debug)]
pub struct FrameBudget {
    limit: WsRateLimit,
    window_started: Instant,
    used: u32,
}

impl FrameBudget {
    pub fn new(limit: WsRateLimit, now: Instant) -> Self {
        Self {
            limit,
            window_started: now,
            used: 0,
        }
    }

    /// Count one inbound message; `false` once the window's budget is spent.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_started) >= self.limit.window {
            self.window_started = now;
            self.used = 0;
        }
        if self.used >= self.limit.max_messages {
            return false;
        }
        self.used += 1;
        true
    }
}

pub struct WsSession {
    conn_id: ConnId,
    router: SessionRouter,
    hub: Arc<RoomHub>,

    last_heartbeat: Instant,
    heartbeat_handle: Option<actix::SpawnHandle>,

    budget: FrameBudget,
}

impl WsSession {
    fn new(conn_id: ConnId, router: SessionRouter, hub: Arc<RoomHub>, limit: WsRateLimit) -> Self {
        Self {
            conn_id,
            router,
            hub,
            last_heartbeat: Instant::now(),
            heartbeat_handle: None,
            budget: FrameBudget::new(limit, Instant::now()),
        }
    }

    fn send_json(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(payload) => ctx.text(payload),
            Err(err) => warn!(error = %err, "[WS SESSION] failed to serialize outbound message"),
        }
    }

    fn start_heartbeat(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let handle = ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(conn_id = %actor.conn_id, "[WS SESSION] heartbeat timed out");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
            ctx.ping(b"keepalive");
        });
        self.heartbeat_handle = Some(handle);
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        if !self.budget.try_consume(Instant::now()) {
            debug!(conn_id = %self.conn_id, "[WS SESSION] message budget exhausted");
            let err = DomainError::TooManyRequests;
            Self::send_json(
                ctx,
                &ServerMsg::Error(ErrorPayload {
                    code: err.code(),
                    message: err.client_message(),
                }),
            );
            return;
        }

        let cmd = match serde_json::from_str::<ClientMsg>(text) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(
                    conn_id = %self.conn_id,
                    error = %err,
                    "[WS SESSION] dropping malformed client message"
                );
                return;
            }
        };

        // `wait` holds further input until this event is fully handled, so a
        // connection's events apply in the order they arrived.
        let router = self.router.clone();
        let conn_id = self.conn_id;
        ctx.wait(async move { router.handle(conn_id, cmd).await }.into_actor(self));
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(conn_id = %self.conn_id, "[WS SESSION] started");
        self.hub
            .register(self.conn_id, ctx.address().recipient::<HubEvent>());
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.hub.unregister(self.conn_id);
        let router = self.router.clone();
        let conn_id = self.conn_id;
        actix::spawn(async move {
            router.connection_closed(conn_id).await;
        });
        info!(conn_id = %self.conn_id, "[WS SESSION] stopped");
    }
}

impl Handler<HubEvent> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: HubEvent, ctx: &mut Self::Context) -> Self::Result {
        match msg {
            HubEvent::Frame(frame) => ctx.text(frame.as_ref()),
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                debug!(conn_id = %self.conn_id, "[WS SESSION] ignoring binary frame");
            }
            Ok(ws::Message::Close(reason)) => {
                info!(conn_id = %self.conn_id, ?reason, "[WS SESSION] client closed");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(conn_id = %self.conn_id, error = %err, "[WS SESSION] protocol error");
                ctx.stop();
            }
        }
    }
}
