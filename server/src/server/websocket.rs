use crate::coordinator::Coordinator;
use crate::outbox::{outbox, try_deliver};
use crate::protocol::{ClientMessage, ConnectionId, ErrorCode, ServerMessage};
use crate::server::AppState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_size = state.websocket.max_message_size;
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Runs the disconnect path if the connection handler unwinds before reaching its own cleanup
struct DisconnectGuard {
    coordinator: Option<Arc<Coordinator>>,
    connection_id: ConnectionId,
}

impl DisconnectGuard {
    fn new(coordinator: Arc<Coordinator>, connection_id: ConnectionId) -> Self {
        Self {
            coordinator: Some(coordinator),
            connection_id,
        }
    }

    fn disarm(&mut self) {
        self.coordinator = None;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Some(coordinator) = self.coordinator.take() else {
            return;
        };
        let connection_id = self.connection_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                coordinator.disconnect(connection_id).await;
            });
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, mut rx) = outbox(state.websocket.outbox_capacity);
    let coordinator = state.coordinator.clone();
    let connection_id = coordinator.connect(tx.clone());
    let mut guard = DisconnectGuard::new(coordinator.clone(), connection_id);
    info!("New WebSocket connection: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: drains the outbox and keeps the connection alive with pings
    let ping_interval = state.websocket.ping_interval;
    let liveness_timeout = state.websocket.liveness_timeout();
    let writer_coordinator = coordinator.clone();
    let mut send_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if ws_sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                        }
                    }
                }
                _ = ping.tick() => {
                    if writer_coordinator.is_stale(connection_id, liveness_timeout) {
                        info!("Connection {} timed out", connection_id);
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                    if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader: every inbound frame refreshes liveness
    loop {
        tokio::select! {
            _ = &mut send_task => {
                debug!("Writer for {} finished", connection_id);
                break;
            }
            frame = ws_receiver.next() => {
                let Some(result) = frame else { break };
                match result {
                    Ok(Message::Text(text)) => {
                        coordinator.touch(connection_id);
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => coordinator.handle(connection_id, msg).await,
                            Err(e) => {
                                warn!("Failed to parse client message from {}: {}", connection_id, e);
                                try_deliver(
                                    &tx,
                                    connection_id,
                                    ServerMessage::Error {
                                        code: ErrorCode::InvalidMessage,
                                        message: format!("Invalid message format: {}", e),
                                    },
                                );
                            }
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        coordinator.touch(connection_id);
                        debug!("Ignoring binary frame from {}", connection_id);
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                        coordinator.touch(connection_id);
                    }
                    Ok(Message::Close(_)) => {
                        info!("Client {} requested close", connection_id);
                        break;
                    }
                    Err(e) => {
                        warn!("WebSocket error for {}: {}", connection_id, e);
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    send_task.abort();
    guard.disarm();
    coordinator.disconnect(connection_id).await;

    info!("WebSocket connection closed: {}", connection_id);
}
