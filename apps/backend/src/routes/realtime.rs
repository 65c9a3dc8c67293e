use actix_web::web;

use crate::ws::session;

/// `GET /ws` upgrades to the game WebSocket. No authentication: players are
/// identified by the ids the server hands out on create, join and find.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(session::upgrade));
}
