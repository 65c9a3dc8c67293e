//! Rate limiting configuration for the HTTP surface.
//!
//! - Public game listing: 60 requests per minute per IP
//! - Health check and the WebSocket upgrade: not limited here; WebSocket
//!   traffic is budgeted per connection by the session actor

use std::time::Duration;

use actix_extensible_rate_limit::backend::SimpleInputFunctionBuilder;

pub const LISTING_REQUESTS_PER_MINUTE: u64 = 60;

/// Per-IP limit for `GET /api/games`.
pub fn listing_rate_limit_config() -> SimpleInputFunctionBuilder {
    SimpleInputFunctionBuilder::new(Duration::from_secs(60), LISTING_REQUESTS_PER_MINUTE)
        .real_ip_key()
}
