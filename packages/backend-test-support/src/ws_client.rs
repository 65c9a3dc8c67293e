//! Minimal WebSocket client for driving the game server in tests.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn connect(url: &str) -> Self {
        let (stream, _) = connect_async(url)
            .await
            .unwrap_or_else(|err| panic!("failed to connect to {url}: {err}"));
        Self { stream }
    }

    /// Send `{"event": event, "data": data}`.
    pub async fn send(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(Message::text(text))
            .await
            .expect("failed to send frame");
    }

    /// Next text frame as JSON. Control frames are skipped.
    pub async fn recv(&mut self) -> Value {
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream closed")
                .expect("websocket error");
            if let Message::Text(text) = next {
                return serde_json::from_str(text.as_str()).expect("server sent invalid JSON");
            }
        }
    }

    /// Skip frames until one with `event`; returns its `data`.
    pub async fn recv_event(&mut self, event: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["event"] == event {
                return frame["data"].clone();
            }
        }
    }

    /// `true` if no text frame arrives within `wait`.
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        loop {
            match tokio::time::timeout(wait, self.stream.next()).await {
                Err(_) => return true,
                Ok(Some(Ok(Message::Text(_)))) => return false,
                Ok(Some(Ok(_))) => continue,
                Ok(_) => return true,
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
