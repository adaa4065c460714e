use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Json},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AppError;
use crate::models::{AgentListResponse, HealthResponse};
use crate::server::AppState;
use tsudoi_core::relay::{AgentStatus, ConnectionRegistry};

/// Health check
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        service: "Tsudoi Relay".to_string(),
        status: "running".to_string(),
        agents_online: state.registry.connection_count(),
    })
}

/// List online agents
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentListResponse> {
    let agents = state.registry.online_agents();
    let count = agents.len();
    Json(AgentListResponse { agents, count })
}

/// Status of one agent
pub async fn agent_status(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentStatus>, AppError> {
    state
        .registry
        .agent_status(&agent_id)
        .map(Json)
        .ok_or(AppError::AgentNotFound { agent_id })
}

/// WebSocket endpoint for agent connections
pub async fn agent_socket(
    ws: WebSocketUpgrade,
    Path(agent_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, agent_id, state.registry))
}

/// Owns one agent connection: a writer task drains the registry's outbound
/// channel into the socket (one send at a time per connection), while this
/// task feeds inbound frames to the registry until the peer goes away.
async fn handle_socket(socket: WebSocket, agent_id: String, registry: Arc<ConnectionRegistry>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    registry.register(&agent_id, tx);
    debug!("agent connected: {}", agent_id);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => registry.handle_frame(&agent_id, text.as_str()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    registry.unregister(&agent_id);
    writer.abort();
    debug!("agent disconnected: {}", agent_id);
}
