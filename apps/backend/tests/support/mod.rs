#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpServer};
use backend::config::{ServerConfig, WsRateLimit};
use backend::infra::state::build_state;
use backend::middleware::request_trace::RequestTrace;
use backend::middleware::structured_logger::StructuredLogger;
use backend::middleware::trace_span::TraceSpan;
use backend::routes;
use backend_test_support::WsClient;
use serde_json::{json, Value};

#[ctor::ctor]
fn init_logging() {
    backend_test_support::logging::init();
}

pub struct TestServer {
    pub addr: SocketAddr,
    handle: ServerHandle,
}

impl TestServer {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn client(&self) -> WsClient {
        WsClient::connect(&self.ws_url()).await
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

/// Config with short timers so expiry paths run quickly.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.router.reconnect_grace = Duration::from_secs(5);
    config.router.kick_vote_timeout = Duration::from_secs(5);
    config
}

pub fn with_ws_limit(max_messages: u32, window: Duration) -> ServerConfig {
    let mut config = test_config();
    config.ws_rate_limit = WsRateLimit {
        max_messages,
        window,
    };
    config
}

/// Serve the full route table on an ephemeral port with an in-memory store.
pub async fn start_server(config: ServerConfig) -> TestServer {
    let state = build_state()
        .with_config(config)
        .build()
        .await
        .expect("state should build without Redis");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let data = web::Data::new(state);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(StructuredLogger)
            .wrap(TraceSpan)
            .wrap(RequestTrace)
            .configure(routes::configure)
    })
    .workers(1)
    .listen(listener)
    .expect("listen")
    .run();

    let handle = server.handle();
    actix_web::rt::spawn(server);
    TestServer { addr, handle }
}

pub fn profile(name: &str) -> Value {
    json!({ "username": name, "avatar": "bee" })
}

/// Open a private game as `name`; returns the client and the first snapshot.
pub async fn create_private(server: &TestServer, name: &str) -> (WsClient, Value) {
    let mut client = server.client().await;
    client.send("create-private", profile(name)).await;
    let snapshot = client.recv_event("game").await;
    (client, snapshot)
}

pub async fn join(server: &TestServer, code: &str, name: &str) -> (WsClient, Value) {
    let mut client = server.client().await;
    client
        .send("join", json!({ "gameCode": code, "player": profile(name) }))
        .await;
    let snapshot = client.recv_event("game").await;
    (client, snapshot)
}

pub fn code_of(snapshot: &Value) -> String {
    snapshot["game"]["code"]
        .as_str()
        .expect("snapshot carries the game code")
        .to_string()
}

pub fn viewer_id(snapshot: &Value) -> String {
    snapshot["viewer"]["playerId"]
        .as_str()
        .expect("snapshot carries the viewer id")
        .to_string()
}
