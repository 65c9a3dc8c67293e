//! WebSocket transport: per-connection actors, the room hub and the
//! optional Redis fan-out between processes.

pub mod broker;
pub mod hub;
pub mod protocol;
pub mod session;
