//! # Relay Protocol
//!
//! The message vocabulary and wire contract, independent of transport.
//!
//! Every message is an immutable [`AgentMessage`]: a routing envelope plus a
//! typed [`MessageBody`]. On the wire the body is adjacently tagged as
//! `"type"` / `"payload"`, so the envelope stays generic at the transport
//! edge while every payload is a proper sum-type variant at the language
//! boundary.
//!
//! Forward compatibility: a message whose type is not in the vocabulary
//! deserializes to [`MessageBody::Unknown`], which recipients treat as a
//! no-op, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::duration_secs;
use crate::model::event::{Decision, EventStatus, EventType, Location, Proposal};
use crate::model::schedule::SlotOffer;

pub type AgentId = String;
pub type EventId = String;

/// Recipient routing key: a specific agent, every connected agent, or every
/// agent subscribed to an event topic. Serialized as a plain string
/// (`"broadcast"`, `"event:<id>"`, or the agent id).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Recipient {
    Direct(AgentId),
    Broadcast,
    Event(EventId),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Direct(agent_id) => write!(f, "{}", agent_id),
            Recipient::Broadcast => write!(f, "broadcast"),
            Recipient::Event(event_id) => write!(f, "event:{}", event_id),
        }
    }
}

impl From<&str> for Recipient {
    fn from(value: &str) -> Self {
        if value == "broadcast" {
            Recipient::Broadcast
        } else if let Some(event_id) = value.strip_prefix("event:") {
            Recipient::Event(event_id.to_string())
        } else {
            Recipient::Direct(value.to_string())
        }
    }
}

impl Serialize for Recipient {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Recipient {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Recipient::from(s.as_str()))
    }
}

/// Error codes carried by `error` messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessage,
    AgentOffline,
    Internal,
}

/// The shareable projection of a [`Proposal`] as sent to other agents.
/// Built only from fields that may cross the privacy boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalOffer {
    pub proposal_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: Option<Location>,
    #[serde(default)]
    pub activity_suggestion: String,
    #[serde(default)]
    pub estimated_cost_per_person: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
}

impl ProposalOffer {
    /// Projects a proposal for transmission. Responses and anything derived
    /// from private context stay behind.
    pub fn from_proposal(proposal: &Proposal) -> Option<Self> {
        let range = proposal.date_range?;
        Some(Self {
            proposal_id: proposal.id.clone(),
            start: range.start,
            end: range.end,
            location: proposal.location.clone(),
            activity_suggestion: proposal.activity_suggestion.clone(),
            estimated_cost_per_person: proposal.estimated_cost_per_person,
            reasoning: proposal.reasoning.clone(),
        })
    }
}

/// A participant agent's answer to a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalReply {
    pub decision: Decision,
    pub enthusiasm_level: u8,
    #[serde(default)]
    pub modifications_requested: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

/// Typed message payloads, one variant per message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::EnumDiscriminants)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
#[strum_discriminants(
    name(MessageType),
    derive(strum::Display, strum::EnumString, Hash),
    strum(serialize_all = "snake_case")
)]
pub enum MessageBody {
    // Discovery
    Hello {
        user_name: String,
        capabilities: Vec<String>,
    },
    Goodbye,

    // Availability
    AvailabilityQuery {
        start_date: chrono::NaiveDate,
        end_date: chrono::NaiveDate,
        event_type: EventType,
    },
    AvailabilityResponse {
        available_slots: Vec<SlotOffer>,
    },

    // Preferences
    PreferenceQuery {
        topic: String,
    },
    PreferenceResponse {
        prefers: Vec<String>,
        avoids: Vec<String>,
    },

    // Proposals
    Proposal(ProposalOffer),
    ProposalResponse(ProposalReply),

    // Nudges
    Nudge {
        topic: String,
        message: String,
    },
    NudgeAck,

    // Event updates
    EventUpdate {
        status: EventStatus,
    },
    EventCancelled {
        reason: String,
    },

    // Social
    VibeCheck,
    VibeResponse {
        enthusiasm_level: u8,
        concerns: Vec<String>,
    },

    // Conflict resolution
    ConflictFlag {
        description: String,
    },
    MediationRequest {
        conflicts: Vec<String>,
        constraints: Vec<String>,
    },
    MediationResponse {
        resolution: String,
    },

    // System
    Ping,
    Pong,
    Error {
        code: ErrorCode,
        message: String,
    },

    /// Catch-all for message types this build does not know. Treated as a
    /// no-op by every recipient.
    #[serde(other)]
    Unknown,
}

/// The wire unit of the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub sender: AgentId,
    pub recipient: Recipient,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,

    #[serde(flatten)]
    pub body: MessageBody,

    /// When false the message must never be persisted or logged; used for
    /// anything that could leak private notes.
    #[serde(default = "default_shareable")]
    pub shareable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub requires_response: bool,
    #[serde(
        default = "default_response_timeout",
        rename = "response_timeout_seconds",
        with = "duration_secs"
    )]
    pub response_timeout: Duration,
}

impl AgentMessage {
    pub fn new(sender: impl Into<AgentId>, recipient: Recipient, body: MessageBody) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("MSG-{}", &uuid[..12]),
            timestamp: Utc::now(),
            sender: sender.into(),
            recipient,
            event_id: None,
            body,
            shareable: true,
            reply_to: None,
            requires_response: false,
            response_timeout: default_response_timeout(),
        }
    }

    // Fluent modifiers, builder-style.

    pub fn with_event(mut self, event_id: impl Into<EventId>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn expecting_response(mut self, timeout: Duration) -> Self {
        self.requires_response = true;
        self.response_timeout = timeout;
        self
    }

    /// Marks the message as not safe to persist or log.
    pub fn private(mut self) -> Self {
        self.shareable = false;
        self
    }

    // Constructors per message kind.

    pub fn hello(sender: impl Into<AgentId>, user_name: impl Into<String>) -> Self {
        Self::new(
            sender,
            Recipient::Broadcast,
            MessageBody::Hello {
                user_name: user_name.into(),
                capabilities: vec![
                    "scheduling".to_string(),
                    "proposals".to_string(),
                    "nudges".to_string(),
                ],
            },
        )
    }

    pub fn goodbye(sender: impl Into<AgentId>) -> Self {
        Self::new(sender, Recipient::Broadcast, MessageBody::Goodbye)
    }

    pub fn availability_query(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        event_id: impl Into<EventId>,
        start_date: chrono::NaiveDate,
        end_date: chrono::NaiveDate,
        event_type: EventType,
    ) -> Self {
        Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::AvailabilityQuery {
                start_date,
                end_date,
                event_type,
            },
        )
        .with_event(event_id)
        .expecting_response(Duration::from_secs(60))
    }

    pub fn availability_response(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        event_id: impl Into<EventId>,
        reply_to: impl Into<String>,
        available_slots: Vec<SlotOffer>,
    ) -> Self {
        Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::AvailabilityResponse { available_slots },
        )
        .with_event(event_id)
        .replying_to(reply_to)
    }

    pub fn proposal(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        event_id: impl Into<EventId>,
        offer: ProposalOffer,
    ) -> Self {
        Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::Proposal(offer),
        )
        .with_event(event_id)
        .expecting_response(Duration::from_secs(120))
    }

    pub fn proposal_response(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        event_id: impl Into<EventId>,
        reply_to: impl Into<String>,
        reply: ProposalReply,
    ) -> Self {
        Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::ProposalResponse(reply),
        )
        .with_event(event_id)
        .replying_to(reply_to)
    }

    pub fn nudge(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        event_id: Option<EventId>,
        topic: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::Nudge {
                topic: topic.into(),
                message: message.into(),
            },
        );
        msg.event_id = event_id;
        msg
    }

    pub fn vibe_check(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        event_id: impl Into<EventId>,
    ) -> Self {
        Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::VibeCheck,
        )
        .with_event(event_id)
        .expecting_response(Duration::from_secs(60))
    }

    pub fn vibe_response(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        event_id: impl Into<EventId>,
        reply_to: impl Into<String>,
        enthusiasm_level: u8,
        concerns: Vec<String>,
    ) -> Self {
        Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::VibeResponse {
                enthusiasm_level,
                concerns,
            },
        )
        .with_event(event_id)
        .replying_to(reply_to)
    }

    pub fn event_update(
        sender: impl Into<AgentId>,
        event_id: impl Into<EventId>,
        status: EventStatus,
    ) -> Self {
        let event_id = event_id.into();
        Self::new(
            sender,
            Recipient::Event(event_id.clone()),
            MessageBody::EventUpdate { status },
        )
        .with_event(event_id)
    }

    pub fn event_cancelled(
        sender: impl Into<AgentId>,
        event_id: impl Into<EventId>,
        reason: impl Into<String>,
    ) -> Self {
        let event_id = event_id.into();
        Self::new(
            sender,
            Recipient::Event(event_id.clone()),
            MessageBody::EventCancelled {
                reason: reason.into(),
            },
        )
        .with_event(event_id)
    }

    pub fn error(
        sender: impl Into<AgentId>,
        recipient: impl Into<AgentId>,
        code: ErrorCode,
        message: impl Into<String>,
        reply_to: Option<String>,
    ) -> Self {
        let mut msg = Self::new(
            sender,
            Recipient::Direct(recipient.into()),
            MessageBody::Error {
                code,
                message: message.into(),
            },
        );
        msg.reply_to = reply_to;
        msg
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from(&self.body)
    }

    /// Serializes for transmission.
    pub fn to_wire(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Deserializes from transmission.
    pub fn from_wire(raw: &str) -> ProtocolResult<Self> {
        serde_json::from_str(raw).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// In-band connection control, distinct from typed agent messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlCommand {
    Subscribe { event_id: EventId },
    Unsubscribe { event_id: EventId },
    Ping,
}

/// Server acknowledgement of a control command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlReply {
    Subscribed { event_id: EventId },
    Unsubscribed { event_id: EventId },
    Pong,
}

/// Connection lifecycle notices pushed by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum SystemNotice {
    AgentConnected {
        agent_id: AgentId,
        timestamp: DateTime<Utc>,
    },
    AgentDisconnected {
        agent_id: AgentId,
        timestamp: DateTime<Utc>,
    },
}

/// Anything an agent may send to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlCommand),
    Message(Box<AgentMessage>),
}

/// Parses an inbound frame: control commands carry a `cmd` key, everything
/// else must be a typed agent message.
pub fn parse_frame(raw: &str) -> ProtocolResult<Frame> {
    if let Ok(command) = serde_json::from_str::<ControlCommand>(raw) {
        return Ok(Frame::Control(command));
    }
    AgentMessage::from_wire(raw).map(|message| Frame::Message(Box::new(message)))
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("malformed message: {0}")]
    Malformed(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

fn default_shareable() -> bool {
    true
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(300)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_roundtrip_preserves_envelope() {
        let message = AgentMessage::availability_query(
            "agent-a",
            "agent-b",
            "EVT-1",
            chrono::NaiveDate::from_ymd_opt(2026, 8, 8).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2026, 8, 22).unwrap(),
            EventType::Dinner,
        );
        let wire = message.to_wire().unwrap();
        let parsed = AgentMessage::from_wire(&wire).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.message_type(), MessageType::AvailabilityQuery);
        assert!(parsed.requires_response);
    }

    #[test]
    fn test_recipient_wire_forms() {
        assert_eq!(Recipient::from("broadcast"), Recipient::Broadcast);
        assert_eq!(
            Recipient::from("event:EVT-9"),
            Recipient::Event("EVT-9".to_string())
        );
        assert_eq!(
            Recipient::from("agent-x"),
            Recipient::Direct("agent-x".to_string())
        );
        assert_eq!(Recipient::Event("EVT-9".to_string()).to_string(), "event:EVT-9");
    }

    #[test]
    fn test_unknown_message_type_is_noop_not_error() {
        let raw = r#"{
            "id": "MSG-x",
            "timestamp": "2026-08-05T12:00:00Z",
            "sender": "agent-a",
            "recipient": "agent-b",
            "type": "holographic_greeting",
            "payload": {"waves": 3}
        }"#;
        let parsed = AgentMessage::from_wire(raw).unwrap();
        assert_eq!(parsed.body, MessageBody::Unknown);
        assert_eq!(parsed.message_type(), MessageType::Unknown);
    }

    #[test]
    fn test_frame_parsing_distinguishes_control() {
        let control = parse_frame(r#"{"cmd": "subscribe", "event_id": "EVT-1"}"#).unwrap();
        assert_eq!(
            control,
            Frame::Control(ControlCommand::Subscribe {
                event_id: "EVT-1".to_string()
            })
        );

        let ping = parse_frame(r#"{"cmd": "ping"}"#).unwrap();
        assert_eq!(ping, Frame::Control(ControlCommand::Ping));

        let message = AgentMessage::hello("agent-a", "Alice");
        match parse_frame(&message.to_wire().unwrap()).unwrap() {
            Frame::Message(parsed) => assert_eq!(*parsed, message),
            other => panic!("expected message frame, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_frame_is_malformed() {
        assert!(matches!(
            parse_frame("not even json"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_code_wire_form() {
        let message = AgentMessage::error(
            "relay",
            "agent-a",
            ErrorCode::AgentOffline,
            "Agent agent-b is not online",
            Some("MSG-1".to_string()),
        );
        let wire = message.to_wire().unwrap();
        assert!(wire.contains("AGENT_OFFLINE"));
        assert!(wire.contains("\"reply_to\":\"MSG-1\""));
    }

    #[test]
    fn test_private_messages_flagged() {
        let message = AgentMessage::nudge("a", "b", None, "camping", "you in?").private();
        assert!(!message.shareable);
        // The flag survives the wire.
        let parsed = AgentMessage::from_wire(&message.to_wire().unwrap()).unwrap();
        assert!(!parsed.shareable);
    }

    #[test]
    fn test_response_timeout_serializes_as_seconds() {
        let message = AgentMessage::vibe_check("a", "b", "EVT-1");
        let wire = message.to_wire().unwrap();
        assert!(wire.contains("\"response_timeout_seconds\":60"));
    }
}
