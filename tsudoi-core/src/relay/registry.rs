use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::protocol::{
    parse_frame, AgentId, AgentMessage, ControlCommand, ControlReply, ErrorCode, EventId, Frame,
    MessageType, Recipient, SystemNotice,
};

/// Sender id used on relay-originated error messages.
pub const RELAY_AGENT_ID: &str = "relay";

/// One registered agent connection: an outbound channel of serialized
/// frames plus lifecycle bookkeeping. Delivery to a single connection is
/// sequential by construction; different connections are independent.
struct ConnectionHandle {
    outbound: mpsc::UnboundedSender<String>,
    connected_at: DateTime<Utc>,
    last_ping: DateTime<Utc>,
    subscriptions: HashSet<EventId>,
}

/// A log line for a shareable message that passed through the relay.
/// Non-shareable messages are never recorded.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub message_id: String,
    pub message_type: MessageType,
    pub sender: AgentId,
    pub recipient: String,
    pub event_id: Option<EventId>,
    pub timestamp: DateTime<Utc>,
}

/// Reported connection state for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: AgentId,
    pub online: bool,
    pub connected_at: DateTime<Utc>,
    pub subscribed_events: Vec<EventId>,
}

/// The shared, mutable connection registry: who is online, who subscribes
/// to which event, and message routing between them. The registry is owned
/// by the relay server instance that constructs it; there is no process-wide
/// instance.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<AgentId, ConnectionHandle>,
    event_subscriptions: DashMap<EventId, HashSet<AgentId>>,
    message_log: Mutex<Vec<LogEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. A reconnect under the same agent id replaces
    /// the previous connection. Other agents are notified.
    #[tracing::instrument(skip(self, outbound), level = "debug")]
    pub fn register(&self, agent_id: &str, outbound: mpsc::UnboundedSender<String>) {
        let now = Utc::now();
        self.connections.insert(
            agent_id.to_string(),
            ConnectionHandle {
                outbound,
                connected_at: now,
                last_ping: now,
                subscriptions: HashSet::new(),
            },
        );

        self.broadcast_notice(
            &SystemNotice::AgentConnected {
                agent_id: agent_id.to_string(),
                timestamp: now,
            },
            Some(agent_id),
        );
    }

    /// Removes a connection and all of its event subscriptions, then
    /// notifies the remaining agents.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn unregister(&self, agent_id: &str) {
        if self.connections.remove(agent_id).is_none() {
            return;
        }

        self.event_subscriptions.retain(|_, subscribers| {
            subscribers.remove(agent_id);
            !subscribers.is_empty()
        });

        self.broadcast_notice(
            &SystemNotice::AgentDisconnected {
                agent_id: agent_id.to_string(),
                timestamp: Utc::now(),
            },
            None,
        );
    }

    /// Handles one raw inbound frame from `sender`. Malformed frames earn a
    /// typed error reply; they never crash the registry.
    #[tracing::instrument(skip(self, raw), level = "debug")]
    pub fn handle_frame(&self, sender: &str, raw: &str) {
        match parse_frame(raw) {
            Err(e) => {
                debug!("invalid frame from {}: {}", sender, e);
                self.send_error(sender, ErrorCode::InvalidMessage, &e.to_string(), None);
            }
            Ok(Frame::Control(command)) => self.handle_control(sender, command),
            Ok(Frame::Message(message)) => self.handle_message(sender, *message),
        }
    }

    fn handle_control(&self, sender: &str, command: ControlCommand) {
        let reply = match command {
            ControlCommand::Subscribe { event_id } => {
                self.subscribe(sender, &event_id);
                ControlReply::Subscribed { event_id }
            }
            ControlCommand::Unsubscribe { event_id } => {
                self.unsubscribe(sender, &event_id);
                ControlReply::Unsubscribed { event_id }
            }
            ControlCommand::Ping => {
                if let Some(mut handle) = self.connections.get_mut(sender) {
                    handle.last_ping = Utc::now();
                }
                ControlReply::Pong
            }
        };

        if let Ok(frame) = serde_json::to_string(&reply) {
            self.send_raw(sender, &frame);
        }
    }

    fn handle_message(&self, sender: &str, message: AgentMessage) {
        if message.shareable {
            self.message_log.lock().push(LogEntry {
                message_id: message.id.clone(),
                message_type: message.message_type(),
                sender: message.sender.clone(),
                recipient: message.recipient.to_string(),
                event_id: message.event_id.clone(),
                timestamp: message.timestamp,
            });
        }

        match message.recipient.clone() {
            Recipient::Broadcast => self.broadcast(&message, Some(sender)),
            Recipient::Event(event_id) => self.broadcast_to_event(&event_id, &message, Some(sender)),
            Recipient::Direct(recipient) => self.route(&recipient, &message),
        }
    }

    /// Delivers a message to one agent. When the recipient is offline and
    /// the message expected a response, the sender gets a typed offline
    /// error instead of a silent drop.
    fn route(&self, recipient: &str, message: &AgentMessage) {
        if self.send_message(recipient, message) {
            return;
        }

        debug!("recipient {} offline for {}", recipient, message.id);
        if message.requires_response {
            self.send_error(
                &message.sender,
                ErrorCode::AgentOffline,
                &format!("Agent {} is not online", recipient),
                Some(message.id.clone()),
            );
        }
    }

    /// Sends a message to every connected agent, optionally excluding one.
    pub fn broadcast(&self, message: &AgentMessage, exclude: Option<&str>) {
        for entry in self.connections.iter() {
            if Some(entry.key().as_str()) != exclude {
                self.send_message(entry.key(), message);
            }
        }
    }

    /// Sends a message to every agent subscribed to the event topic.
    pub fn broadcast_to_event(&self, event_id: &str, message: &AgentMessage, exclude: Option<&str>) {
        let Some(subscribers) = self
            .event_subscriptions
            .get(event_id)
            .map(|s| s.value().clone())
        else {
            return;
        };

        for agent_id in subscribers {
            if Some(agent_id.as_str()) != exclude {
                self.send_message(&agent_id, message);
            }
        }
    }

    pub fn subscribe(&self, agent_id: &str, event_id: &str) {
        self.event_subscriptions
            .entry(event_id.to_string())
            .or_default()
            .insert(agent_id.to_string());
        if let Some(mut handle) = self.connections.get_mut(agent_id) {
            handle.subscriptions.insert(event_id.to_string());
        }
    }

    pub fn unsubscribe(&self, agent_id: &str, event_id: &str) {
        if let Some(mut subscribers) = self.event_subscriptions.get_mut(event_id) {
            subscribers.remove(agent_id);
        }
        if let Some(mut handle) = self.connections.get_mut(agent_id) {
            handle.subscriptions.remove(event_id);
        }
    }

    /// Pushes a message to one agent from outside the frame loop (server
    /// embeddings, admin surfaces). Unlike routing an inbound frame,
    /// failures surface to the caller.
    pub fn send_to(&self, agent_id: &str, message: &AgentMessage) -> RelayResult<()> {
        if !self.connections.contains_key(agent_id) {
            return Err(RelayError::NotConnected {
                agent_id: agent_id.to_string(),
            });
        }
        if self.send_message(agent_id, message) {
            Ok(())
        } else {
            Err(RelayError::SendFailed {
                agent_id: agent_id.to_string(),
            })
        }
    }

    pub fn is_online(&self, agent_id: &str) -> bool {
        self.connections.contains_key(agent_id)
    }

    pub fn online_agents(&self) -> Vec<AgentId> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        self.connections.get(agent_id).map(|handle| AgentStatus {
            agent_id: agent_id.to_string(),
            online: true,
            connected_at: handle.connected_at,
            subscribed_events: handle.subscriptions.iter().cloned().collect(),
        })
    }

    /// Snapshot of the shareable-message log.
    pub fn shareable_log(&self) -> Vec<LogEntry> {
        self.message_log.lock().clone()
    }

    fn send_error(&self, recipient: &str, code: ErrorCode, detail: &str, reply_to: Option<String>) {
        let error = AgentMessage::error(RELAY_AGENT_ID, recipient, code, detail, reply_to);
        self.send_message(recipient, &error);
    }

    fn send_message(&self, agent_id: &str, message: &AgentMessage) -> bool {
        match message.to_wire() {
            Ok(frame) => self.send_raw(agent_id, &frame),
            Err(e) => {
                warn!("failed to encode message {}: {}", message.id, e);
                false
            }
        }
    }

    fn send_raw(&self, agent_id: &str, frame: &str) -> bool {
        let Some(handle) = self.connections.get(agent_id) else {
            return false;
        };
        handle.outbound.send(frame.to_string()).is_ok()
    }

    fn broadcast_notice(&self, notice: &SystemNotice, exclude: Option<&str>) {
        let Ok(frame) = serde_json::to_string(notice) else {
            return;
        };
        for entry in self.connections.iter() {
            if Some(entry.key().as_str()) != exclude {
                self.send_raw(entry.key(), &frame);
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("agent not connected: {agent_id}")]
    NotConnected { agent_id: AgentId },
    #[error("send failed for agent {agent_id}")]
    SendFailed { agent_id: AgentId },
}

pub type RelayResult<T> = Result<T, RelayError>;
