//! Cross-process fan-out over Redis pub/sub.
//!
//! Every room delivery made on one process is published on `room:{code}`.
//! Each process subscribes to `room:*` and re-delivers frames from its peers
//! to its own members of the room. Frames a process published itself are
//! skipped on receipt.

use std::error::Error as StdError;
use std::sync::{Arc, Weak};
use std::time::Duration;

use rand::random;
use redis::aio::{ConnectionManager, PubSub};
use redis::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::services::session_router::ConnId;
use crate::ws::hub::RoomHub;

const ROOM_PATTERN: &str = "room:*";

/// One room frame as it travels between processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEnvelope {
    pub origin: Uuid,
    pub code: String,
    pub except: Option<ConnId>,
    /// The already-serialized server message.
    pub payload: String,
}

pub struct RealtimeBroker {
    outgoing: mpsc::UnboundedSender<RoomEnvelope>,
}

impl RealtimeBroker {
    /// Connect the publisher and start the subscriber for `hub`.
    pub async fn connect(redis_url: &str, hub: &Arc<RoomHub>) -> Result<Arc<Self>, AppError> {
        let client = Client::open(redis_url).map_err(|err| AppError::Config {
            detail: format!("Invalid REDIS_URL: {err}"),
            source: Box::new(err),
        })?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| AppError::Internal {
                code: ErrorCode::ConfigError,
                detail: "Unable to initialize Redis connection manager".to_string(),
                source: Box::new(err),
            })?;

        let (outgoing, queue) = mpsc::unbounded_channel();
        // A single publisher task keeps frames in commit order per process.
        tokio::spawn(run_publisher(manager, queue));
        spawn_subscriber(redis_url, Arc::downgrade(hub));

        Ok(Arc::new(Self { outgoing }))
    }

    pub fn publish(&self, envelope: RoomEnvelope) {
        if self.outgoing.send(envelope).is_err() {
            warn!("realtime publisher stopped, dropping room frame");
        }
    }
}

// Subscriber retry configuration (background task)
const INITIAL_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_DELAY_MULTIPLIER: f64 = 2.0;
const JITTER_PERCENT: f64 = 0.2;

// Publisher retry configuration
const PUBLISHER_MAX_ATTEMPTS: u32 = 3;
const PUBLISHER_INITIAL_RETRY_DELAY_MS: u64 = 50;
const PUBLISHER_MAX_RETRY_DELAY_MS: u64 = 200;

pub fn room_channel(code: &str) -> String {
    format!("room:{code}")
}

fn parse_room_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix("room:").filter(|code| !code.is_empty())
}

async fn run_publisher(
    mut manager: ConnectionManager,
    mut queue: mpsc::UnboundedReceiver<RoomEnvelope>,
) {
    while let Some(envelope) = queue.recv().await {
        let channel = room_channel(&envelope.code);
        if let Err(err) = publish_with_retry(&mut manager, &channel, &envelope).await {
            error!(error = %err, channel = %channel, "dropping room frame after publish failures");
        }
    }
    info!("Realtime publisher queue closed");
}

async fn publish_with_retry(
    manager: &mut ConnectionManager,
    channel: &str,
    envelope: &RoomEnvelope,
) -> Result<(), AppError> {
    let encoded = serde_json::to_string(envelope).map_err(|err| AppError::Internal {
        code: ErrorCode::Internal,
        detail: "Failed to serialize realtime envelope".to_string(),
        source: Box::new(err),
    })?;

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let publish_res: redis::RedisResult<()> = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&encoded)
            .query_async(manager)
            .await;

        match publish_res {
            Ok(()) => return Ok(()),
            Err(err) => {
                let app_err = AppError::Internal {
                    code: ErrorCode::Internal,
                    detail: "Failed to publish realtime event to Redis".to_string(),
                    source: Box::new(err),
                };

                if attempt >= PUBLISHER_MAX_ATTEMPTS || !is_transient_error(&app_err) {
                    return Err(app_err);
                }

                let delay_ms = PUBLISHER_INITIAL_RETRY_DELAY_MS
                    .saturating_mul(2_u64.pow(attempt - 1))
                    .min(PUBLISHER_MAX_RETRY_DELAY_MS);
                warn!(
                    error = %app_err,
                    attempt,
                    retry_delay_ms = delay_ms,
                    "Redis publish failed, retrying"
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

fn spawn_subscriber(redis_url: &str, hub: Weak<RoomHub>) {
    let redis_url = redis_url.to_string();
    tokio::spawn(async move {
        run_subscription_loop_with_retry(&redis_url, hub).await;
    });
}

fn is_transient_error(err: &AppError) -> bool {
    if let AppError::Config { .. } = err {
        return false;
    }

    let error_msg = err.to_string().to_lowercase();

    if error_msg.contains("authentication failed")
        || error_msg.contains("invalid redis_url")
        || error_msg.contains("unsupported")
        || error_msg.contains("non-tcp protocol")
    {
        return false;
    }

    if error_msg.contains("connection refused")
        || error_msg.contains("connection reset")
        || error_msg.contains("timed out")
        || error_msg.contains("timeout")
        || error_msg.contains("broken pipe")
        || error_msg.contains("stream ended")
    {
        return true;
    }

    if let Some(io_err) =
        StdError::source(err).and_then(|source| source.downcast_ref::<std::io::Error>())
    {
        match io_err.kind() {
            std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::Unsupported => {
                return false
            }
            _ => return true,
        }
    }

    true
}

fn calculate_retry_delay(attempt: u32) -> Duration {
    let base_delay =
        INITIAL_RETRY_DELAY_SECS as f64 * RETRY_DELAY_MULTIPLIER.powi(attempt as i32 - 1);
    let capped_delay = base_delay.min(MAX_RETRY_DELAY_SECS as f64);

    let jitter_range = capped_delay * JITTER_PERCENT;
    let jitter = (random::<f64>() * 2.0 - 1.0) * jitter_range;
    let final_delay = (capped_delay + jitter).max(0.1);

    Duration::from_secs_f64(final_delay)
}

async fn run_subscription_loop_with_retry(redis_url: &str, hub: Weak<RoomHub>) {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match run_subscription_loop(redis_url, &hub).await {
            Ok(()) => {
                info!("Redis subscription loop completed normally");
                break;
            }
            Err(err) => {
                if !is_transient_error(&err) {
                    error!(
                        error = %err,
                        attempt,
                        "Redis subscription failed with permanent error, exiting"
                    );
                    break;
                }

                let delay = calculate_retry_delay(attempt);
                warn!(
                    error = %err,
                    attempt,
                    retry_delay_secs = delay.as_secs_f64(),
                    "Redis subscription failed, retrying"
                );
                sleep(delay).await;

                if attempt >= 20 {
                    attempt = 10;
                }
            }
        }
    }
}

/// Returns `Ok` once the hub is gone, `Err` when the connection drops.
async fn run_subscription_loop(redis_url: &str, hub: &Weak<RoomHub>) -> Result<(), AppError> {
    let client = Client::open(redis_url).map_err(|err| AppError::Config {
        detail: format!("Invalid REDIS_URL: {err}"),
        source: Box::new(err),
    })?;

    let conn_info = client.get_connection_info();

    let addr = match conn_info.addr().clone() {
        redis::ConnectionAddr::Tcp(host, port) => (host, port),
        _ => {
            return Err(AppError::Internal {
                code: ErrorCode::ConfigError,
                detail: "Only TCP protocol is supported for pubsub".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "Non-TCP protocol",
                )),
            });
        }
    };

    info!(host = %addr.0, port = addr.1, "Connecting to Redis for room subscription");

    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::Internal,
            detail: format!("Failed to connect to Redis for subscription: {err}"),
            source: Box::new(err),
        })?;

    let mut pubsub = PubSub::new(conn_info.redis_settings(), stream)
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::Internal,
            detail: format!("Failed to create Redis pubsub: {err}"),
            source: Box::new(err),
        })?;

    pubsub
        .psubscribe(ROOM_PATTERN)
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::Internal,
            detail: format!("Failed to subscribe to Redis channel pattern {ROOM_PATTERN}"),
            source: Box::new(err),
        })?;

    info!("Redis room subscription established");

    let mut messages = pubsub.into_on_message();

    while let Some(msg) = messages.next().await {
        let started = Instant::now();
        let Some(hub) = hub.upgrade() else {
            return Ok(());
        };

        let Ok(channel) = msg.get_channel::<String>() else {
            continue;
        };
        let Ok(payload) = msg.get_payload::<String>() else {
            continue;
        };

        match serde_json::from_str::<RoomEnvelope>(&payload) {
            Ok(envelope) => {
                if parse_room_channel(&channel) != Some(envelope.code.as_str()) {
                    warn!(
                        channel = %channel,
                        game_code = %envelope.code,
                        "room frame received on a mismatched channel"
                    );
                    continue;
                }
                hub.deliver_remote(envelope);
            }
            Err(err) => {
                error!(
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis(),
                    channel = %channel,
                    "Failed to decode Redis realtime payload"
                );
            }
        }
    }

    warn!("Redis subscription stream ended, connection lost");
    Err(AppError::Internal {
        code: ErrorCode::Internal,
        detail: "Redis subscription stream ended unexpectedly".to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "Stream ended",
        )),
    })
}
