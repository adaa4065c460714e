//! # Messenger
//!
//! The relay client: one long-lived WebSocket connection per agent, with a
//! request/response pattern layered on top of the asynchronous message
//! stream.
//!
//! ## Request-Response Correlation
//!
//! `send_and_wait` bridges the asynchronous relay and the synchronous
//! request/response pattern with a oneshot channel per outstanding request,
//! keyed by message id. The receive loop resolves the oneshot when a message
//! arrives whose `reply_to` matches; a timer resolves it with a timeout
//! otherwise. A timed-out request releases its caller with a distinguishable
//! error, never blocking the coordination pipeline; disconnection fails all
//! pending requests at once.

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::model::event::EventType;
use crate::model::schedule::SlotOffer;
use crate::relay::protocol::{
    AgentId, AgentMessage, ControlCommand, ControlReply, ErrorCode, EventId, MessageBody,
    MessageType, ProposalOffer, ProposalReply, ProtocolError, SystemNotice,
};

/// A request awaiting its correlated response.
struct PendingRequest {
    sender: oneshot::Sender<AgentMessage>,
}

/// Relay client for one agent.
pub struct Messenger {
    agent_id: AgentId,
    user_name: String,
    config: RelayConfig,
    pending: Arc<DashMap<String, PendingRequest>>,
    incoming: broadcast::Sender<AgentMessage>,
    outbound: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Messenger {
    pub fn new(
        agent_id: impl Into<AgentId>,
        user_name: impl Into<String>,
        config: RelayConfig,
    ) -> Self {
        let (incoming, _) = broadcast::channel(config.channel_capacity);
        Self {
            agent_id: agent_id.into(),
            user_name: user_name.into(),
            config,
            pending: Arc::new(DashMap::new()),
            incoming,
            outbound: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn is_connected(&self) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Connects to the relay, starts the receive loop and heartbeat, and
    /// announces this agent.
    #[tracing::instrument(skip(self), fields(agent_id = %self.agent_id))]
    pub async fn connect(&self) -> MessengerResult<()> {
        let url = format!("{}/ws/{}", self.config.url, self.agent_id);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| MessengerError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = ws.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        *self.outbound.lock() = Some(tx.clone());

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let pending = self.pending.clone();
        let incoming = self.incoming.clone();
        let agent_id = self.agent_id.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => dispatch(&text, &pending, &incoming),
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("relay connection error for {}: {}", agent_id, e);
                        break;
                    }
                }
            }
            // The connection is gone: anyone still waiting gets released
            // with a failure rather than hanging forever.
            pending.clear();
        });

        let heartbeat_tx = tx;
        let heartbeat_interval = self.config.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_interval);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                let Ok(frame) = serde_json::to_string(&ControlCommand::Ping) else {
                    continue;
                };
                if heartbeat_tx.send(WsMessage::Text(frame)).is_err() {
                    break;
                }
            }
        });

        {
            let mut tasks = self.tasks.lock();
            tasks.push(writer);
            tasks.push(reader);
            tasks.push(heartbeat);
        }

        self.send(&AgentMessage::hello(&self.agent_id, &self.user_name))
            .await?;
        Ok(())
    }

    /// Closes the connection and fails every pending request.
    pub async fn disconnect(&self) {
        let _ = self.send(&AgentMessage::goodbye(&self.agent_id)).await;
        *self.outbound.lock() = None;
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.pending.clear();
    }

    /// Messages not consumed as correlated responses arrive here.
    pub fn subscribe_incoming(&self) -> broadcast::Receiver<AgentMessage> {
        self.incoming.subscribe()
    }

    pub async fn send(&self, message: &AgentMessage) -> MessengerResult<()> {
        let frame = message.to_wire()?;
        let outbound = self.outbound.lock().clone();
        let tx = outbound.ok_or(MessengerError::NotConnected)?;
        tx.send(WsMessage::Text(frame))
            .map_err(|e| MessengerError::Send(e.to_string()))
    }

    /// Sends a request and waits for the correlated response or the
    /// message's response timeout, whichever comes first.
    #[tracing::instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn send_and_wait(&self, mut message: AgentMessage) -> MessengerResult<AgentMessage> {
        message.requires_response = true;
        let message_id = message.id.clone();
        let timeout = message.response_timeout;

        let (tx, rx) = oneshot::channel();
        self.pending
            .insert(message_id.clone(), PendingRequest { sender: tx });

        if let Err(e) = self.send(&message).await {
            self.pending.remove(&message_id);
            return Err(e);
        }

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        let result = tokio::select! {
            _ = &mut sleep => Err(MessengerError::Timeout {
                message_id: message_id.clone(),
                timeout_secs: timeout.as_secs(),
            }),
            response = rx => response.map_err(|_| MessengerError::ConnectionClosed),
        };

        self.pending.remove(&message_id);
        result
    }

    // Control commands.

    pub async fn subscribe_to_event(&self, event_id: &str) -> MessengerResult<()> {
        self.send_control(&ControlCommand::Subscribe {
            event_id: event_id.to_string(),
        })
        .await
    }

    pub async fn unsubscribe_from_event(&self, event_id: &str) -> MessengerResult<()> {
        self.send_control(&ControlCommand::Unsubscribe {
            event_id: event_id.to_string(),
        })
        .await
    }

    pub async fn ping(&self) -> MessengerResult<()> {
        self.send_control(&ControlCommand::Ping).await
    }

    async fn send_control(&self, command: &ControlCommand) -> MessengerResult<()> {
        let frame =
            serde_json::to_string(command).map_err(|e| MessengerError::Send(e.to_string()))?;
        let outbound = self.outbound.lock().clone();
        let tx = outbound.ok_or(MessengerError::NotConnected)?;
        tx.send(WsMessage::Text(frame))
            .map_err(|e| MessengerError::Send(e.to_string()))
    }

    // High-level messaging.

    /// Asks another agent when their human is free.
    pub async fn query_availability(
        &self,
        recipient: &str,
        event_id: &str,
        start_date: chrono::NaiveDate,
        end_date: chrono::NaiveDate,
        event_type: EventType,
    ) -> MessengerResult<Vec<SlotOffer>> {
        let message = AgentMessage::availability_query(
            &self.agent_id,
            recipient,
            event_id,
            start_date,
            end_date,
            event_type,
        );
        let response = self.send_and_wait(message).await?;
        match response.body {
            MessageBody::AvailabilityResponse { available_slots } => Ok(available_slots),
            MessageBody::Error { code, message } => Err(MessengerError::Remote { code, message }),
            other => Err(MessengerError::UnexpectedResponse {
                got: MessageType::from(&other),
            }),
        }
    }

    /// Answers an availability query.
    pub async fn send_availability(
        &self,
        recipient: &str,
        event_id: &str,
        reply_to: &str,
        available_slots: Vec<SlotOffer>,
    ) -> MessengerResult<()> {
        self.send(&AgentMessage::availability_response(
            &self.agent_id,
            recipient,
            event_id,
            reply_to,
            available_slots,
        ))
        .await
    }

    /// Sends a proposal and waits for the participant's decision.
    pub async fn send_proposal(
        &self,
        recipient: &str,
        event_id: &str,
        offer: ProposalOffer,
    ) -> MessengerResult<ProposalReply> {
        let message = AgentMessage::proposal(&self.agent_id, recipient, event_id, offer);
        let response = self.send_and_wait(message).await?;
        match response.body {
            MessageBody::ProposalResponse(reply) => Ok(reply),
            MessageBody::Error { code, message } => Err(MessengerError::Remote { code, message }),
            other => Err(MessengerError::UnexpectedResponse {
                got: MessageType::from(&other),
            }),
        }
    }

    pub async fn respond_to_proposal(
        &self,
        recipient: &str,
        event_id: &str,
        reply_to: &str,
        reply: ProposalReply,
    ) -> MessengerResult<()> {
        self.send(&AgentMessage::proposal_response(
            &self.agent_id,
            recipient,
            event_id,
            reply_to,
            reply,
        ))
        .await
    }

    pub async fn send_nudge(
        &self,
        recipient: &str,
        event_id: Option<EventId>,
        topic: &str,
        message: &str,
    ) -> MessengerResult<()> {
        self.send(&AgentMessage::nudge(
            &self.agent_id,
            recipient,
            event_id,
            topic,
            message,
        ))
        .await
    }

    pub async fn respond_to_vibe_check(
        &self,
        recipient: &str,
        event_id: &str,
        reply_to: &str,
        enthusiasm_level: u8,
        concerns: Vec<String>,
    ) -> MessengerResult<()> {
        self.send(&AgentMessage::vibe_response(
            &self.agent_id,
            recipient,
            event_id,
            reply_to,
            enthusiasm_level,
            concerns,
        ))
        .await
    }

    /// Checks how a participant is feeling about an event.
    pub async fn check_vibe(
        &self,
        recipient: &str,
        event_id: &str,
    ) -> MessengerResult<(u8, Vec<String>)> {
        let message = AgentMessage::vibe_check(&self.agent_id, recipient, event_id);
        let response = self.send_and_wait(message).await?;
        match response.body {
            MessageBody::VibeResponse {
                enthusiasm_level,
                concerns,
            } => Ok((enthusiasm_level, concerns)),
            MessageBody::Error { code, message } => Err(MessengerError::Remote { code, message }),
            other => Err(MessengerError::UnexpectedResponse {
                got: MessageType::from(&other),
            }),
        }
    }
}

/// Routes one inbound frame: correlated responses wake their waiting
/// request, everything else fans out to subscribers. Unknown message types
/// are delivered as no-ops, and relay notices are only logged.
fn dispatch(
    raw: &str,
    pending: &DashMap<String, PendingRequest>,
    incoming: &broadcast::Sender<AgentMessage>,
) {
    if let Ok(message) = AgentMessage::from_wire(raw) {
        if let Some(reply_to) = message.reply_to.clone() {
            if let Some((_, request)) = pending.remove(&reply_to) {
                let _ = request.sender.send(message);
                return;
            }
        }
        let _ = incoming.send(message);
        return;
    }

    if let Ok(notice) = serde_json::from_str::<SystemNotice>(raw) {
        debug!("relay notice: {:?}", notice);
        return;
    }

    if let Ok(reply) = serde_json::from_str::<ControlReply>(raw) {
        debug!("control reply: {:?}", reply);
        return;
    }

    debug!("ignoring unrecognized frame from relay");
}

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("not connected to relay")]
    NotConnected,
    #[error("failed to connect to relay: {0}")]
    Connect(String),
    #[error("failed to send message: {0}")]
    Send(String),
    #[error("no response to {message_id} within {timeout_secs}s")]
    Timeout {
        message_id: String,
        timeout_secs: u64,
    },
    #[error("connection closed while waiting for a response")]
    ConnectionClosed,
    #[error("peer error {code}: {message}")]
    Remote { code: ErrorCode, message: String },
    #[error("unexpected response type: {got}")]
    UnexpectedResponse { got: MessageType },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type MessengerResult<T> = Result<T, MessengerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::Decision;
    use pretty_assertions::assert_eq;

    fn test_messenger() -> Messenger {
        Messenger::new("agent-a", "Alice", RelayConfig::default())
    }

    #[tokio::test]
    async fn test_send_without_connection_fails_fast() {
        let messenger = test_messenger();
        let result = messenger.send(&AgentMessage::hello("agent-a", "Alice")).await;
        assert!(matches!(result, Err(MessengerError::NotConnected)));
        assert!(!messenger.is_connected());
    }

    #[tokio::test]
    async fn test_dispatch_resolves_pending_request() {
        let pending: DashMap<String, PendingRequest> = DashMap::new();
        let (incoming, mut incoming_rx) = broadcast::channel(8);

        let (tx, rx) = oneshot::channel();
        pending.insert("MSG-req".to_string(), PendingRequest { sender: tx });

        let response = AgentMessage::proposal_response(
            "agent-b",
            "agent-a",
            "EVT-1",
            "MSG-req",
            ProposalReply {
                decision: Decision::Accept,
                enthusiasm_level: 4,
                modifications_requested: vec![],
                reasoning: "works for us".to_string(),
            },
        );
        dispatch(&response.to_wire().unwrap(), &pending, &incoming);

        let resolved = rx.await.unwrap();
        assert_eq!(resolved.id, response.id);
        assert!(pending.is_empty());
        // Correlated responses are not rebroadcast.
        assert!(incoming_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_fans_out_uncorrelated_messages() {
        let pending: DashMap<String, PendingRequest> = DashMap::new();
        let (incoming, mut incoming_rx) = broadcast::channel(8);

        let nudge = AgentMessage::nudge("agent-b", "agent-a", None, "camping", "you in?");
        dispatch(&nudge.to_wire().unwrap(), &pending, &incoming);

        let received = incoming_rx.try_recv().unwrap();
        assert_eq!(received.id, nudge.id);
    }

    #[tokio::test]
    async fn test_dispatch_tolerates_notices_and_garbage() {
        let pending: DashMap<String, PendingRequest> = DashMap::new();
        let (incoming, mut incoming_rx) = broadcast::channel(8);

        let notice = serde_json::to_string(&SystemNotice::AgentConnected {
            agent_id: "agent-c".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();
        dispatch(&notice, &pending, &incoming);
        dispatch(r#"{"status": "pong"}"#, &pending, &incoming);
        dispatch("garbage", &pending, &incoming);

        assert!(incoming_rx.try_recv().is_err());
    }
}
