//! Tsudoi Relay Server
//!
//! WebSocket relay for agent-to-agent communication: one persistent
//! connection per agent at `/ws/{agent_id}`, with direct, broadcast and
//! event-topic routing handled by the connection registry in `tsudoi-core`.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;

use server::{start_server, ServerConfig};

/// Start the relay server with the default configuration.
pub async fn start() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    start_server(ServerConfig::default()).await
}

/// Start the relay server with a custom configuration.
pub async fn start_with_config(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    start_server(config).await
}
