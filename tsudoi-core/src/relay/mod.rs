//! # Relay Messaging Layer
//!
//! Agent-to-agent messaging: a typed message vocabulary with a JSON wire
//! envelope ([`protocol`]) and a connection-oriented routing registry
//! ([`registry`]) supporting direct delivery, broadcast, and event-scoped
//! topic subscription.
//!
//! ## Message Flow
//!
//! ```text
//! ┌───────┐   AgentMessage    ┌──────────┐   route/broadcast   ┌───────┐
//! │ Agent │──────────────────▶│ Registry │────────────────────▶│ Agent │
//! └───────┘                   └──────────┘                     └───────┘
//!      │                           │
//!      │   ControlCommand          │ ControlReply / SystemNotice
//!      └───────────────────────────┘
//! ```
//!
//! The registry is transport-neutral: each connection is an outbound channel
//! of serialized frames. The WebSocket endpoint lives in the relay server
//! crate; the client side lives in [`crate::agent::messenger`].

pub mod protocol;
pub mod registry;

pub use protocol::{
    AgentId, AgentMessage, ControlCommand, ControlReply, ErrorCode, EventId, Frame, MessageBody,
    MessageType, ProposalOffer, ProposalReply, ProtocolError, Recipient, SystemNotice,
};
pub use registry::{AgentStatus, ConnectionRegistry, RelayError};
