#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod config;
pub mod domain;
pub mod error;
pub mod errors;
pub mod infra;
pub mod middleware;
pub mod protocol;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
pub mod trace_ctx;
pub mod ws;

#[cfg(test)]
pub mod test_bootstrap;

// Re-exports for public API
pub use config::{ServerConfig, WsRateLimit};
pub use error::AppError;
pub use errors::{DomainError, ErrorCode};
pub use infra::state::build_state;
pub use middleware::cors::cors_middleware;
pub use middleware::request_trace::RequestTrace;
pub use middleware::structured_logger::StructuredLogger;
pub use middleware::trace_span::TraceSpan;
pub use services::session_router::{RouterConfig, SessionRouter};
pub use state::app_state::AppState;
pub use store::{GameStore, MemoryGameStore, RedisGameStore, StoreError};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    test_bootstrap::logging::init();
}
