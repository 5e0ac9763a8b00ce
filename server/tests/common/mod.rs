//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

#![allow(dead_code)]

use collab_server::config::{Config, WebSocketConfig};
use collab_server::protocol::{ClientMessage, ParticipantIdentity, ServerMessage, UserId};
use collab_server::{AppState, Coordinator, router};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running server bound to a random local port
pub struct TestServer {
    pub addr: SocketAddr,
    pub coordinator: Arc<Coordinator>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    pub async fn start_with(config: Config) -> Self {
        let coordinator = Arc::new(Coordinator::with_config(config.coordinator()));
        let state =
            AppState::new(coordinator.clone()).with_websocket_config(config.websocket.clone());
        let app = router(state, &config);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            addr,
            coordinator,
            handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub async fn connect(&self) -> TestClient {
        let (stream, _) = connect_async(self.ws_url()).await.unwrap();
        TestClient { stream }
    }

    /// Wait until the coordinator reports `rooms` live rooms
    pub async fn wait_for_room_count(&self, rooms: usize) -> bool {
        for _ in 0..100 {
            if self.coordinator.room_count() == rooms {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Config with a fast heartbeat for liveness tests
pub fn fast_heartbeat_config() -> Config {
    Config {
        websocket: WebSocketConfig {
            ping_interval: Duration::from_millis(100),
            ping_timeout: Duration::from_millis(200),
            ..WebSocketConfig::default()
        },
        ..Config::default()
    }
}

pub fn identity(user_id: &str, display_name: &str) -> ParticipantIdentity {
    ParticipantIdentity {
        user_id: UserId::from(user_id),
        display_name: display_name.to_string(),
        color: "#F59E0B".to_string(),
    }
}

/// WebSocket client speaking the JSON protocol
pub struct TestClient {
    pub stream: WsStream,
}

impl TestClient {
    pub async fn send(&mut self, msg: &ClientMessage) {
        let json = serde_json::to_string(msg).unwrap();
        self.send_raw(&json).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn join(&mut self, document_id: &str, user_id: &str, name: &str) -> ServerMessage {
        self.send(&ClientMessage::JoinRoom {
            document_id: document_id.to_string(),
            participant: identity(user_id, name),
        })
        .await;
        self.recv_matching(|m| matches!(m, ServerMessage::RoomState(_)))
            .await
            .expect("room-state after join")
    }

    /// Next protocol message, or `None` on timeout or close
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.recv_within(Duration::from_secs(2)).await
    }

    pub async fn recv_within(&mut self, timeout: Duration) -> Option<ServerMessage> {
        tokio::time::timeout(timeout, async {
            while let Some(frame) = self.stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        return serde_json::from_str::<ServerMessage>(&text).ok();
                    }
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// Skip messages until one satisfies `predicate`
    pub async fn recv_matching(
        &mut self,
        predicate: impl Fn(&ServerMessage) -> bool,
    ) -> Option<ServerMessage> {
        while let Some(msg) = self.recv().await {
            if predicate(&msg) {
                return Some(msg);
            }
        }
        None
    }

    /// Collect everything that arrives within `window`
    pub async fn collect_for(&mut self, window: Duration) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.recv_within(remaining).await {
                Some(msg) => messages.push(msg),
                None => break,
            }
        }
        messages
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
