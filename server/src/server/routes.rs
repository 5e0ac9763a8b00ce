use crate::config::Config;
use crate::protocol::{GenerationProgress, UserId};
use crate::server::{AppState, ws_handler};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub websocket: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
    /// Number of live rooms
    pub active_rooms: usize,
    /// Number of open WebSocket connections
    pub active_connections: usize,
}

/// Reply to a producer publication
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Subscribers the event was enqueued for
    pub delivered: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        websocket: "ready".to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_rooms: state.coordinator.room_count(),
        active_connections: state.coordinator.connection_count(),
    })
}

/// POST /api/generation/:document_id/progress
async fn publish_generation_progress(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Json(progress): Json<GenerationProgress>,
) -> (StatusCode, Json<PublishResponse>) {
    let delivered = state
        .coordinator
        .publish_generation_progress(&document_id, progress);
    debug!(
        "Generation progress for {} delivered to {} subscriber(s)",
        document_id, delivered
    );
    (StatusCode::ACCEPTED, Json(PublishResponse { delivered }))
}

/// POST /api/notifications/:user_id
async fn publish_notification(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(notification): Json<Value>,
) -> (StatusCode, Json<PublishResponse>) {
    let user_id = UserId::from(user_id.as_str());
    let delivered = state.coordinator.publish_notification(&user_id, notification);
    debug!(
        "Notification for {} delivered to {} subscriber(s)",
        user_id, delivered
    );
    (StatusCode::ACCEPTED, Json(PublishResponse { delivered }))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.cors_allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

/// Build the HTTP and WebSocket router
pub fn router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws_handler))
        .route(
            "/api/generation/:document_id/progress",
            post(publish_generation_progress),
        )
        .route("/api/notifications/:user_id", post(publish_notification))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
}
