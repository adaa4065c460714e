use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventType {
    Trip,
    #[default]
    Hangout,
    Dinner,
    Activity,
    Party,
    Movie,
    GameNight,
    Outdoor,
}

/// Event lifecycle. Transitions are driven exclusively by the coordination
/// engine; `Cancelled` is reachable from any non-terminal state and is
/// irreversible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventStatus {
    /// Agents are coordinating.
    #[default]
    Planning,
    /// Proposal sent, waiting for responses.
    Proposed,
    /// Everyone agreed.
    Confirmed,
    /// The event happened.
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Cancelled)
    }
}

/// A participant's decision on the current proposal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Accept,
    Modify,
    Decline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub notes: String,
}

impl Location {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            city: None,
            latitude: None,
            longitude: None,
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_minutes() as f64 / 60.0
    }
}

/// One concrete candidate plan, retained for audit even after it is
/// superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposer_agent_id: String,
    pub proposed_at: DateTime<Utc>,

    pub date_range: Option<DateRange>,
    pub location: Option<Location>,
    #[serde(default)]
    pub activity_suggestion: String,
    #[serde(default)]
    pub estimated_cost_per_person: Option<f64>,
    /// Why this plan makes sense; shared with other agents.
    #[serde(default)]
    pub reasoning: String,

    /// agent_id -> decision.
    #[serde(default)]
    pub responses: HashMap<String, Decision>,
    #[serde(default)]
    pub modifications_requested: Vec<String>,
}

impl Proposal {
    pub fn new(proposer_agent_id: impl Into<String>) -> Self {
        Self {
            id: short_id("PROP"),
            proposer_agent_id: proposer_agent_id.into(),
            proposed_at: Utc::now(),
            date_range: None,
            location: None,
            activity_suggestion: String::new(),
            estimated_cost_per_person: None,
            reasoning: String::new(),
            responses: HashMap::new(),
            modifications_requested: Vec::new(),
        }
    }

    pub fn is_unanimous(&self) -> bool {
        !self.responses.is_empty() && self.responses.values().all(|d| *d == Decision::Accept)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NoteKind {
    Negotiation,
    Concern,
    Suggestion,
    Decision,
}

/// An entry in the event's append-only activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityNote {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub kind: NoteKind,
    pub content: String,
    /// Private notes are only visible to the owning user.
    pub private: bool,
}

/// Per-event state of one participant. Never exists outside an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
    pub agent_id: String,

    #[serde(default)]
    pub confirmed: bool,
    /// 1-5.
    #[serde(default = "default_enthusiasm")]
    pub enthusiasm: u8,
    #[serde(default)]
    pub responded: bool,
    #[serde(default)]
    pub last_response_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            agent_id: agent_id.into(),
            confirmed: false,
            enthusiasm: default_enthusiasm(),
            responded: false,
            last_response_at: None,
        }
    }
}

/// The unit of coordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub creator_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_type: EventType,

    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub status: EventStatus,

    // Decided details, frozen from the winning proposal on confirmation.
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub budget_per_person: Option<f64>,

    #[serde(default)]
    pub proposals: Vec<Proposal>,
    #[serde(default)]
    pub current_proposal_id: Option<String>,
    #[serde(default)]
    pub consensus_reached: bool,

    #[serde(default)]
    pub notes: Vec<ActivityNote>,
}

impl Event {
    pub fn new(creator_id: impl Into<String>, title: impl Into<String>, event_type: EventType) -> Self {
        let now = Utc::now();
        Self {
            id: short_id("EVT"),
            created_at: now,
            updated_at: now,
            creator_id: creator_id.into(),
            title: title.into(),
            description: String::new(),
            event_type,
            participants: Vec::new(),
            status: EventStatus::Planning,
            date_range: None,
            location: None,
            budget_per_person: None,
            proposals: Vec::new(),
            current_proposal_id: None,
            consensus_reached: false,
            notes: Vec::new(),
        }
    }

    /// Adds a participant unless the user is already on the event.
    pub fn add_participant(&mut self, participant: Participant) {
        if self
            .participants
            .iter()
            .any(|p| p.user_id == participant.user_id)
        {
            return;
        }
        self.participants.push(participant);
        self.updated_at = Utc::now();
    }

    /// Attaches a new proposal and makes it current. Prior proposals are
    /// kept for audit.
    pub fn attach_proposal(&mut self, proposal: Proposal) {
        self.current_proposal_id = Some(proposal.id.clone());
        self.proposals.push(proposal);
        self.updated_at = Utc::now();
    }

    pub fn current_proposal(&self) -> Option<&Proposal> {
        let id = self.current_proposal_id.as_deref()?;
        self.proposals.iter().find(|p| p.id == id)
    }

    /// Marks the event as proposed. Valid from `Planning` (first proposal)
    /// or `Proposed` (a new proposal cycle).
    pub fn mark_proposed(&mut self) -> EventResult<()> {
        match self.status {
            EventStatus::Planning | EventStatus::Proposed => {
                self.status = EventStatus::Proposed;
                self.updated_at = Utc::now();
                Ok(())
            }
            from => Err(EventError::InvalidTransition {
                from,
                to: EventStatus::Proposed,
            }),
        }
    }

    /// Explicit creator action; irreversible.
    pub fn cancel(&mut self) -> EventResult<()> {
        if self.status.is_terminal() {
            return Err(EventError::InvalidTransition {
                from: self.status,
                to: EventStatus::Cancelled,
            });
        }
        self.status = EventStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a decision on the current proposal and updates the
    /// participant's state.
    pub fn record_response(
        &mut self,
        agent_id: &str,
        decision: Decision,
        enthusiasm: u8,
        modifications: Vec<String>,
    ) -> EventResult<()> {
        let current_id = self
            .current_proposal_id
            .clone()
            .ok_or(EventError::NoCurrentProposal)?;
        let proposal = self
            .proposals
            .iter_mut()
            .find(|p| p.id == current_id)
            .ok_or(EventError::NoCurrentProposal)?;

        proposal.responses.insert(agent_id.to_string(), decision);
        proposal.modifications_requested.extend(modifications);

        if let Some(participant) = self
            .participants
            .iter_mut()
            .find(|p| p.agent_id == agent_id)
        {
            participant.responded = true;
            participant.last_response_at = Some(Utc::now());
            participant.enthusiasm = enthusiasm.clamp(1, 5);
            participant.confirmed = decision == Decision::Accept;
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Consensus holds iff every participant's agent accepted the current
    /// proposal. A stray accept from an agent outside the participant set is
    /// ignored. On success the proposal's date range and location are frozen
    /// onto the event and the status flips to `Confirmed` in the same call;
    /// calling again with unchanged responses returns the same result.
    pub fn check_consensus(&mut self) -> bool {
        let Some(current) = self.current_proposal() else {
            return false;
        };

        let all_accepted = self
            .participants
            .iter()
            .all(|p| current.responses.get(&p.agent_id) == Some(&Decision::Accept));
        if self.participants.is_empty() || !all_accepted {
            return false;
        }

        let date_range = current.date_range;
        let location = current.location.clone();

        self.consensus_reached = true;
        self.status = EventStatus::Confirmed;
        self.date_range = date_range;
        self.location = location;
        self.updated_at = Utc::now();
        true
    }

    /// Agents blocking confirmation of the current proposal: anyone who
    /// declined, asked for changes, or has not answered.
    pub fn blocking_agents(&self) -> Vec<String> {
        let responses = self
            .current_proposal()
            .map(|p| p.responses.clone())
            .unwrap_or_default();
        self.participants
            .iter()
            .filter(|p| responses.get(&p.agent_id) != Some(&Decision::Accept))
            .map(|p| p.agent_id.clone())
            .collect()
    }

    pub fn add_note(
        &mut self,
        agent_id: impl Into<String>,
        kind: NoteKind,
        content: impl Into<String>,
        private: bool,
    ) {
        self.notes.push(ActivityNote {
            timestamp: Utc::now(),
            agent_id: agent_id.into(),
            kind,
            content: content.into(),
            private,
        });
        self.updated_at = Utc::now();
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: EventStatus, to: EventStatus },
    #[error("event has no current proposal")]
    NoCurrentProposal,
}

pub type EventResult<T> = Result<T, EventError>;

fn default_enthusiasm() -> u8 {
    3
}

fn short_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..8])
}
