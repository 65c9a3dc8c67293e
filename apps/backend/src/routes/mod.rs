use actix_web::web;

pub mod games;
pub mod health;
pub mod realtime;

/// Register every route without rate limiting.
///
/// `main.rs` mounts `/api/games` behind the listing rate limiter before
/// calling this, so the limited scope takes precedence there; tests use
/// this directly.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Health check: /health
    cfg.service(web::scope("/health").configure(health::configure_routes));

    // Public listing: /api/games
    cfg.service(web::scope("/api/games").configure(games::configure_routes));

    // WebSocket: /ws
    cfg.service(web::scope("/ws").configure(realtime::configure_routes));
}
