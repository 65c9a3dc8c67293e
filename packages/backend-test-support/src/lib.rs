//! Backend test support utilities
//!
//! Shared by the backend's integration tests: logging initialization,
//! Problem Details assertions and a small WebSocket client that speaks the
//! game's `{event, data}` framing.

pub mod logging;
pub mod problem_details;
pub mod ws_client;

pub use ws_client::WsClient;
