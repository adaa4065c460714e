use axum::{routing::get, Router};

use crate::handlers;
use crate::server::AppState;

/// All relay routes: the WebSocket endpoint plus the status surface.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::health))
        .route("/agents", get(handlers::list_agents))
        .route("/agents/{agent_id}", get(handlers::agent_status))
        .route("/ws/{agent_id}", get(handlers::agent_socket))
}
