//! How the coordination engine obtains other participants' decisions.
//!
//! [`HeuristicOracle`] simulates responses from the owner's private context
//! for single-process use; [`RelayOracle`] does the real round-trip through
//! the relay. The engine treats them identically, so the simulation can
//! never be mistaken for the real protocol.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::messenger::{Messenger, MessengerError};
use crate::model::event::{Decision, Event, Participant};
use crate::model::friend::FriendRelationship;
use crate::relay::protocol::{ErrorCode, ProposalOffer, ProposalReply};

/// What came back for one participant.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome {
    Answered(ProposalReply),
    /// The participant's agent is offline or did not answer in time. This is
    /// distinguishable from a decline: the engine surfaces it instead of
    /// fabricating a decision.
    NoResponse,
}

#[async_trait]
pub trait ResponseOracle: Send + Sync {
    /// Obtains one participant's decision on the offered proposal.
    async fn gather_response(
        &self,
        event: &Event,
        participant: &Participant,
        offer: &ProposalOffer,
    ) -> OracleResult<OracleOutcome>;
}

/// Private per-friend context the heuristic draws on. Keyed by user name.
#[derive(Debug, Clone, Default)]
pub struct FriendContext {
    pub enthusiasm_baseline: u8,
    pub sensitivities: Vec<String>,
}

/// Simulates participant responses from the owner's own notes: a friend
/// with a decent enthusiasm baseline accepts unless the proposal reasoning
/// touches one of their sensitive topics.
#[derive(Debug, Clone, Default)]
pub struct HeuristicOracle {
    context: HashMap<String, FriendContext>,
}

impl HeuristicOracle {
    pub fn new(context: HashMap<String, FriendContext>) -> Self {
        Self { context }
    }

    /// Builds the context map from the owner's relationships.
    pub fn from_friends(friends: &[FriendRelationship]) -> Self {
        let context = friends
            .iter()
            .map(|friend| {
                (
                    friend.friend_name.clone(),
                    FriendContext {
                        enthusiasm_baseline: friend.enthusiasm_baseline,
                        sensitivities: friend.sensitivities.clone(),
                    },
                )
            })
            .collect();
        Self { context }
    }
}

#[async_trait]
impl ResponseOracle for HeuristicOracle {
    async fn gather_response(
        &self,
        _event: &Event,
        participant: &Participant,
        offer: &ProposalOffer,
    ) -> OracleResult<OracleOutcome> {
        let context = self
            .context
            .get(&participant.user_name)
            .cloned()
            .unwrap_or(FriendContext {
                enthusiasm_baseline: 3,
                sensitivities: Vec::new(),
            });

        let reasoning = offer.reasoning.to_lowercase();
        let touches_sensitivity = context
            .sensitivities
            .iter()
            .any(|topic| reasoning.contains(&topic.to_lowercase()));

        let reply = if context.enthusiasm_baseline >= 3 && !touches_sensitivity {
            ProposalReply {
                decision: Decision::Accept,
                enthusiasm_level: context.enthusiasm_baseline,
                modifications_requested: vec![],
                reasoning: String::new(),
            }
        } else {
            ProposalReply {
                decision: Decision::Modify,
                enthusiasm_level: context.enthusiasm_baseline.min(2),
                modifications_requested: vec!["a different plan would work better".to_string()],
                reasoning: String::new(),
            }
        };

        Ok(OracleOutcome::Answered(reply))
    }
}

/// Queries each participant's agent over the relay and waits for a real
/// decision. Timeouts and offline peers become [`OracleOutcome::NoResponse`].
pub struct RelayOracle {
    messenger: Arc<Messenger>,
}

impl RelayOracle {
    pub fn new(messenger: Arc<Messenger>) -> Self {
        Self { messenger }
    }
}

#[async_trait]
impl ResponseOracle for RelayOracle {
    async fn gather_response(
        &self,
        event: &Event,
        participant: &Participant,
        offer: &ProposalOffer,
    ) -> OracleResult<OracleOutcome> {
        match self
            .messenger
            .send_proposal(&participant.agent_id, &event.id, offer.clone())
            .await
        {
            Ok(reply) => Ok(OracleOutcome::Answered(reply)),
            Err(MessengerError::Timeout { message_id, .. }) => {
                debug!(
                    "no response from {} to {}",
                    participant.agent_id, message_id
                );
                Ok(OracleOutcome::NoResponse)
            }
            Err(MessengerError::Remote {
                code: ErrorCode::AgentOffline,
                ..
            }) => Ok(OracleOutcome::NoResponse),
            Err(e) => Err(OracleError::Messenger(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("messenger error: {0}")]
    Messenger(#[from] MessengerError),
}

pub type OracleResult<T> = Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::EventType;
    use pretty_assertions::assert_eq;

    fn offer(reasoning: &str) -> ProposalOffer {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 8).unwrap();
        ProposalOffer {
            proposal_id: "PROP-1".to_string(),
            start: date.and_hms_opt(18, 0, 0).unwrap().and_utc(),
            end: date.and_hms_opt(21, 0, 0).unwrap().and_utc(),
            location: None,
            activity_suggestion: String::new(),
            estimated_cost_per_person: None,
            reasoning: reasoning.to_string(),
        }
    }

    fn event() -> Event {
        Event::new("u1", "Dinner", EventType::Dinner)
    }

    #[tokio::test]
    async fn test_heuristic_accepts_enthusiastic_friend() {
        let oracle = HeuristicOracle::new(HashMap::from([(
            "Bob".to_string(),
            FriendContext {
                enthusiasm_baseline: 4,
                sensitivities: vec![],
            },
        )]));
        let participant = Participant::new("u2", "Bob", "agent-2");

        let outcome = oracle
            .gather_response(&event(), &participant, &offer("a relaxed dinner"))
            .await
            .unwrap();
        match outcome {
            OracleOutcome::Answered(reply) => {
                assert_eq!(reply.decision, Decision::Accept);
                assert_eq!(reply.enthusiasm_level, 4);
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heuristic_flags_sensitive_topics() {
        let oracle = HeuristicOracle::new(HashMap::from([(
            "Bob".to_string(),
            FriendContext {
                enthusiasm_baseline: 5,
                sensitivities: vec!["karaoke".to_string()],
            },
        )]));
        let participant = Participant::new("u2", "Bob", "agent-2");

        let outcome = oracle
            .gather_response(&event(), &participant, &offer("Karaoke night downtown"))
            .await
            .unwrap();
        match outcome {
            OracleOutcome::Answered(reply) => assert_eq!(reply.decision, Decision::Modify),
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heuristic_low_enthusiasm_asks_for_changes() {
        let oracle = HeuristicOracle::new(HashMap::from([(
            "Bob".to_string(),
            FriendContext {
                enthusiasm_baseline: 2,
                sensitivities: vec![],
            },
        )]));
        let participant = Participant::new("u2", "Bob", "agent-2");

        let outcome = oracle
            .gather_response(&event(), &participant, &offer("dinner"))
            .await
            .unwrap();
        match outcome {
            OracleOutcome::Answered(reply) => assert_eq!(reply.decision, Decision::Modify),
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_heuristic_unknown_participant_gets_baseline() {
        let oracle = HeuristicOracle::default();
        let participant = Participant::new("u9", "Stranger", "agent-9");
        let outcome = oracle
            .gather_response(&event(), &participant, &offer("dinner"))
            .await
            .unwrap();
        match outcome {
            OracleOutcome::Answered(reply) => assert_eq!(reply.decision, Decision::Accept),
            other => panic!("expected answer, got {:?}", other),
        }
    }
}
