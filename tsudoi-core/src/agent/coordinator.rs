//! # Coordinator
//!
//! Drives one event through its state machine: gather schedules, find
//! common time, obtain a proposal from the intelligence provider, collect
//! participant decisions through the response oracle, and check consensus.
//!
//! Negotiation failures (no common slot, no consensus) are outcomes, not
//! errors: they land in the event's activity log and in the returned
//! [`CoordinationOutcome`]. Intelligence failures are errors; they attach a
//! private note and leave the event in its prior state.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use super::intel::{IntelError, IntelProvider};
use super::oracle::{OracleOutcome, ResponseOracle};
use crate::config::CoordinatorConfig;
use crate::model::event::{Decision, Event, NoteKind, Participant};
use crate::model::friend::FriendRelationship;
use crate::model::schedule::Schedule;
use crate::model::user::AvailabilityBlock;
use crate::relay::protocol::ProposalOffer;
use crate::scheduler::{Clock, Scheduler, SystemClock};
use crate::store::{Store, StoreError};

/// Result of one coordination pass.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationOutcome {
    pub consensus: bool,
    pub proposal_id: Option<String>,
    /// Agents preventing confirmation (declined, asked for changes, or
    /// never answered).
    pub blocking: Vec<String>,
    pub responses: HashMap<String, Decision>,
    /// True when no common slot was found even after widening the search.
    pub needs_negotiation: bool,
}

/// The coordination engine for one user's agent.
pub struct Coordinator {
    user_id: String,
    agent_id: String,
    store: Arc<dyn Store>,
    intel: Arc<dyn IntelProvider>,
    oracle: Arc<dyn ResponseOracle>,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub fn new(
        user_id: impl Into<String>,
        agent_id: impl Into<String>,
        store: Arc<dyn Store>,
        intel: Arc<dyn IntelProvider>,
        oracle: Arc<dyn ResponseOracle>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            agent_id: agent_id.into(),
            store,
            intel,
            oracle,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Runs a full coordination pass over the event: schedules, proposal,
    /// distribution, consensus. The event is mutated in place; the caller
    /// persists it.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id))]
    pub async fn coordinate_event(&self, event: &mut Event) -> CoordinationResult<CoordinationOutcome> {
        let user = self
            .store
            .get_user(&self.user_id)
            .await?
            .ok_or_else(|| CoordinationError::UserNotFound {
                user_id: self.user_id.clone(),
            })?;
        let friends = self.store.friends_of(&self.user_id).await?;

        event.add_note(
            &self.agent_id,
            NoteKind::Negotiation,
            format!(
                "Starting coordination for {} with {} participants",
                event.title,
                event.participants.len()
            ),
            false,
        );

        // Assemble every participant's schedule; participants we have no
        // data for get a sensible default rather than blocking the search.
        let mut scheduler = Scheduler::with_clock(self.clock.clone());
        for participant in &event.participants {
            let schedule = self
                .store
                .get_schedule(&participant.user_id)
                .await?
                .unwrap_or_else(|| default_schedule(&participant.user_id));
            scheduler.add_schedule(participant.user_id.clone(), schedule);
        }

        let (start_date, end_date) = scheduler.suggest_date_range(event.event_type);
        let mut slots =
            scheduler.find_common_slots(event.event_type, start_date, end_date, None);

        if slots.is_empty() {
            event.add_note(
                &self.agent_id,
                NoteKind::Concern,
                "No common availability found; widening the search once",
                false,
            );
            let window = end_date.signed_duration_since(start_date);
            let widened_end = start_date + window * self.config.search_widen_factor as i32;
            slots = scheduler.find_common_slots(event.event_type, start_date, widened_end, None);
        }

        if slots.is_empty() {
            // Still nothing: a negotiation outcome, not an error.
            event.add_note(
                &self.agent_id,
                NoteKind::Concern,
                "No common availability even in the widened window; negotiation needed",
                false,
            );
            return Ok(CoordinationOutcome {
                consensus: false,
                proposal_id: None,
                blocking: Vec::new(),
                responses: HashMap::new(),
                needs_negotiation: true,
            });
        }

        // Best candidates first, bounded so the prompt stays small.
        let ranked = scheduler.rank_slots(&slots, event.event_type, &HashMap::new());
        let candidates: Vec<_> = ranked
            .into_iter()
            .take(self.config.max_slot_options)
            .map(|(slot, _)| slot)
            .collect();

        // Private context stays on this side of the boundary: it feeds the
        // intelligence prompt and nothing else.
        let private_notes: HashMap<String, String> = friends
            .iter()
            .filter(|f| !f.private_notes.is_empty())
            .map(|f| (f.friend_name.clone(), f.private_notes.clone()))
            .collect();

        let proposal = match self
            .intel
            .create_proposal(
                &self.agent_id,
                event,
                &user.name,
                &user.shareable_profile(),
                &private_notes,
                &candidates,
            )
            .await
        {
            Ok(proposal) => proposal,
            Err(e) => {
                warn!("proposal creation failed for {}: {}", event.id, e);
                event.add_note(
                    &self.agent_id,
                    NoteKind::Concern,
                    format!("Coordination error: {}", e),
                    true,
                );
                return Err(CoordinationError::Intel(e));
            }
        };

        // Only the shareable projection of the proposal ever leaves this
        // agent.
        let offer = ProposalOffer::from_proposal(&proposal)
            .ok_or(CoordinationError::ProposalWithoutDate)?;

        let proposal_id = proposal.id.clone();
        event.attach_proposal(proposal);
        event.mark_proposed()?;
        event.add_note(
            &self.agent_id,
            NoteKind::Suggestion,
            format!(
                "Proposed {} at {}",
                offer.start.format("%b %d %H:%M"),
                offer
                    .location
                    .as_ref()
                    .map(|l| l.name.as_str())
                    .unwrap_or("TBD")
            ),
            false,
        );

        self.collect_responses(event, &offer).await;

        let consensus = event.check_consensus();
        if consensus {
            let confirmed_for = event
                .date_range
                .map(|range| range.start.format("%b %d, %Y").to_string())
                .unwrap_or_else(|| "TBD".to_string());
            info!("consensus reached for {}", event.id);
            event.add_note(
                &self.agent_id,
                NoteKind::Decision,
                format!("Consensus reached; event confirmed for {}", confirmed_for),
                false,
            );
        } else {
            event.add_note(
                &self.agent_id,
                NoteKind::Negotiation,
                format!(
                    "Awaiting agreement from: {}",
                    event.blocking_agents().join(", ")
                ),
                false,
            );
        }

        let responses = event
            .current_proposal()
            .map(|p| p.responses.clone())
            .unwrap_or_default();

        Ok(CoordinationOutcome {
            consensus,
            proposal_id: Some(proposal_id),
            blocking: event.blocking_agents(),
            responses,
            needs_negotiation: false,
        })
    }

    /// Distributes the offer and records each participant's decision. The
    /// creator's own agent accepts its own proposal. Transport problems are
    /// recovered locally: the participant simply stays unresponsive and the
    /// consensus check surfaces them.
    async fn collect_responses(&self, event: &mut Event, offer: &ProposalOffer) {
        let participants: Vec<Participant> = event.participants.clone();
        for participant in participants {
            if participant.user_id == self.user_id {
                let _ = event.record_response(&participant.agent_id, Decision::Accept, 4, vec![]);
                continue;
            }

            match self.oracle.gather_response(event, &participant, offer).await {
                Ok(OracleOutcome::Answered(reply)) => {
                    let note = match reply.decision {
                        Decision::Accept => format!("{}'s agent accepted", participant.user_name),
                        Decision::Modify => {
                            format!("{}'s agent requested modifications", participant.user_name)
                        }
                        Decision::Decline => format!("{}'s agent declined", participant.user_name),
                    };
                    let kind = if reply.decision == Decision::Accept {
                        NoteKind::Decision
                    } else {
                        NoteKind::Concern
                    };
                    let _ = event.record_response(
                        &participant.agent_id,
                        reply.decision,
                        reply.enthusiasm_level,
                        reply.modifications_requested,
                    );
                    event.add_note(&participant.agent_id, kind, note, false);
                }
                Ok(OracleOutcome::NoResponse) => {
                    event.add_note(
                        &self.agent_id,
                        NoteKind::Concern,
                        format!("No response from {}'s agent", participant.user_name),
                        false,
                    );
                }
                Err(e) => {
                    warn!(
                        "failed to reach {} for {}: {}",
                        participant.agent_id, event.id, e
                    );
                    event.add_note(
                        &self.agent_id,
                        NoteKind::Concern,
                        format!("Could not reach {}'s agent", participant.user_name),
                        true,
                    );
                }
            }
        }
    }

    /// Explicit creator action. Irreversible; persists the cancelled event.
    pub async fn cancel_event(&self, event: &mut Event) -> CoordinationResult<()> {
        event.cancel()?;
        event.add_note(
            &self.agent_id,
            NoteKind::Decision,
            "Event cancelled by creator",
            false,
        );
        self.store.save_event(event).await?;
        Ok(())
    }

    /// Drafts a personalized nudge for a friend. Delivery goes through the
    /// relay when one is attached; the drafted text is returned either way.
    pub async fn draft_nudge(
        &self,
        friend: &FriendRelationship,
        topic: &str,
    ) -> CoordinationResult<String> {
        let message = self
            .intel
            .nudge_message(
                &friend.friend_name,
                topic,
                friend.relationship_type,
                &friend.communication_preference,
            )
            .await?;
        Ok(message)
    }

    /// Group-dynamics read over the event's participants, drawing on the
    /// owner's private relationship context. The report stays local.
    pub async fn analyze_group(
        &self,
        event: &Event,
    ) -> CoordinationResult<super::intel::GroupReport> {
        let friends = self.store.friends_of(&self.user_id).await?;
        let participant_ids: Vec<&str> = event
            .participants
            .iter()
            .filter(|p| p.user_id != self.user_id)
            .map(|p| p.user_id.as_str())
            .collect();

        let relationships: HashMap<String, FriendRelationship> = friends
            .into_iter()
            .filter(|f| participant_ids.contains(&f.friend_id.as_str()))
            .map(|f| (f.friend_name.clone(), f))
            .collect();

        let names: Vec<String> = event
            .participants
            .iter()
            .map(|p| p.user_name.clone())
            .collect();

        Ok(self.intel.group_dynamics(&names, &relationships).await?)
    }

    pub fn response_timeout(&self) -> std::time::Duration {
        self.config.response_timeout
    }
}

/// Weekends plus weekday evenings; used for participants whose schedule is
/// not on file.
fn default_schedule(user_id: &str) -> Schedule {
    let mut schedule = Schedule::new(user_id);
    for day_of_week in [5, 6] {
        schedule.default_availability.push(AvailabilityBlock {
            day_of_week,
            start_hour: 10,
            end_hour: 22,
            label: "weekend".to_string(),
        });
    }
    for day_of_week in 0..5 {
        schedule.default_availability.push(AvailabilityBlock {
            day_of_week,
            start_hour: 18,
            end_hour: 22,
            label: "evening".to_string(),
        });
    }
    schedule
}

#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error("user not found: {user_id}")]
    UserNotFound { user_id: String },
    #[error("proposal has no date range to offer")]
    ProposalWithoutDate,
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("intelligence error: {0}")]
    Intel(#[from] IntelError),
    #[error("event error: {0}")]
    Event(#[from] crate::model::event::EventError),
}

pub type CoordinationResult<T> = Result<T, CoordinationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::intel::SimpleIntel;
    use crate::agent::oracle::{FriendContext, HeuristicOracle};
    use crate::model::event::{EventStatus, EventType};
    use crate::model::user::User;
    use crate::scheduler::FixedClock;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    async fn setup(oracle: Arc<dyn ResponseOracle>) -> (Coordinator, Event) {
        let store = Arc::new(MemoryStore::new());

        let mut alice = User::new("Alice");
        alice.id = "u-alice".to_string();
        alice.agent_id = "agent-alice".to_string();
        store.save_user(&alice).await.unwrap();

        let mut bob = FriendRelationship::new("u-bob", "Bob", "TS-BOB-0001");
        bob.enthusiasm_baseline = 4;
        store.save_friend("u-alice", &bob).await.unwrap();

        let mut event = Event::new("u-alice", "Dinner", EventType::Dinner);
        event.add_participant(Participant::new("u-alice", "Alice", "agent-alice"));
        event.add_participant(Participant::new("u-bob", "Bob", "agent-bob"));

        let coordinator = Coordinator::new(
            "u-alice",
            "agent-alice",
            store,
            Arc::new(SimpleIntel),
            oracle,
            CoordinatorConfig::default(),
        )
        .with_clock(Arc::new(FixedClock(
            chrono::NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
        )));

        (coordinator, event)
    }

    fn accepting_oracle() -> Arc<dyn ResponseOracle> {
        Arc::new(HeuristicOracle::new(HashMap::from([(
            "Bob".to_string(),
            FriendContext {
                enthusiasm_baseline: 4,
                sensitivities: vec![],
            },
        )])))
    }

    #[tokio::test]
    async fn test_full_pass_reaches_consensus() {
        let (coordinator, mut event) = setup(accepting_oracle()).await;
        let outcome = coordinator.coordinate_event(&mut event).await.unwrap();

        assert!(outcome.consensus);
        assert!(!outcome.needs_negotiation);
        assert!(outcome.blocking.is_empty());
        assert_eq!(event.status, EventStatus::Confirmed);
        assert!(event.date_range.is_some());
        assert!(event.consensus_reached);
    }

    #[tokio::test]
    async fn test_modify_blocks_confirmation() {
        let blocking_oracle = Arc::new(HeuristicOracle::new(HashMap::from([(
            "Bob".to_string(),
            FriendContext {
                enthusiasm_baseline: 1,
                sensitivities: vec![],
            },
        )])));
        let (coordinator, mut event) = setup(blocking_oracle).await;
        let outcome = coordinator.coordinate_event(&mut event).await.unwrap();

        assert!(!outcome.consensus);
        assert_eq!(event.status, EventStatus::Proposed);
        assert_eq!(outcome.blocking, vec!["agent-bob".to_string()]);
        assert!(event.date_range.is_none());
    }

    #[tokio::test]
    async fn test_no_overlap_surfaces_negotiation_not_error() {
        let (coordinator, mut event) = setup(accepting_oracle()).await;
        // Alice is only free Monday mornings; the default Bob schedule is
        // weekends and evenings. No overlap, even widened.
        let mut alice_schedule = Schedule::new("u-alice");
        alice_schedule.default_availability.push(AvailabilityBlock {
            day_of_week: 0,
            start_hour: 6,
            end_hour: 9,
            label: String::new(),
        });
        coordinator
            .store
            .save_schedule(&alice_schedule)
            .await
            .unwrap();

        let outcome = coordinator.coordinate_event(&mut event).await.unwrap();
        assert!(outcome.needs_negotiation);
        assert!(!outcome.consensus);
        assert_eq!(event.status, EventStatus::Planning);
        assert!(event.proposals.is_empty());
    }

    #[tokio::test]
    async fn test_missing_user_is_an_error() {
        let (_, mut event) = setup(accepting_oracle()).await;
        let coordinator = Coordinator::new(
            "u-ghost",
            "agent-ghost",
            Arc::new(MemoryStore::new()),
            Arc::new(SimpleIntel),
            accepting_oracle(),
            CoordinatorConfig::default(),
        );
        let result = coordinator.coordinate_event(&mut event).await;
        assert!(matches!(
            result,
            Err(CoordinationError::UserNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_event_is_persisted() {
        let (coordinator, mut event) = setup(accepting_oracle()).await;
        coordinator
            .store
            .save_event(&event)
            .await
            .unwrap();
        coordinator.cancel_event(&mut event).await.unwrap();
        assert_eq!(event.status, EventStatus::Cancelled);

        let stored = coordinator.store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EventStatus::Cancelled);
    }
}
