//! # Social Intelligence Provider
//!
//! The seam for the reasoning step that turns structured context into a
//! proposal or a decision. The call is opaque, possibly slow, and possibly
//! failing; the coordination engine retries or surfaces errors, never
//! swallows them.
//!
//! Private notes and sensitivities flow *into* a provider as prompt context
//! and never come back out in shareable form: everything a provider returns
//! for transmission is rebuilt from shareable fields only.
//!
//! Two implementations ship: [`ChatIntel`] over an OpenAI-compatible chat
//! endpoint, and [`SimpleIntel`], a deterministic rule-based provider for
//! offline use and tests.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use chrono::{Duration, NaiveTime};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::config::{IntelConfig, SecretConfig};
use crate::model::event::{DateRange, Decision, Event, Location, Proposal};
use crate::model::friend::{FriendRelationship, RelationshipType};
use crate::model::schedule::TimeSlot;
use crate::model::user::UserProfile;
use crate::relay::protocol::ProposalOffer;

/// The outcome of evaluating someone else's proposal.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub enthusiasm_level: u8,
    #[serde(default)]
    pub modifications_requested: Vec<String>,
    /// Shared with other agents.
    #[serde(default)]
    pub reasoning: String,
}

/// Group dynamics analysis for an event's participant set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupReport {
    #[serde(default)]
    pub group_vibe: String,
    #[serde(default)]
    pub potential_issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[async_trait]
pub trait IntelProvider: Send + Sync {
    /// Builds a concrete plan from the event context, the owner's shareable
    /// profile, private relationship notes, and the slots everyone can make.
    async fn create_proposal(
        &self,
        proposer: &str,
        event: &Event,
        user_name: &str,
        profile: &UserProfile,
        private_notes: &HashMap<String, String>,
        available_slots: &[TimeSlot],
    ) -> IntelResult<Proposal>;

    /// Decides how this agent's human should answer a proposal.
    async fn evaluate_proposal(
        &self,
        event: &Event,
        offer: &ProposalOffer,
        user_name: &str,
        profile: &UserProfile,
        private_notes: &HashMap<String, String>,
    ) -> IntelResult<Evaluation>;

    /// Drafts a friendly reminder in the right register for the
    /// relationship.
    async fn nudge_message(
        &self,
        friend_name: &str,
        topic: &str,
        relationship: RelationshipType,
        communication_style: &str,
    ) -> IntelResult<String>;

    /// Reads the room before anyone commits to a plan.
    async fn group_dynamics(
        &self,
        participants: &[String],
        relationships: &HashMap<String, FriendRelationship>,
    ) -> IntelResult<GroupReport>;
}

const SYSTEM_PROMPT: &str = "You are a social coordination agent for event planning. \
You represent your human's interests, find times and places that work for everyone, \
and navigate social dynamics gracefully. You never share private notes or \
sensitivities with other agents. Always respond in valid JSON.";

/// Chat-completion-backed provider. Works against any OpenAI-compatible
/// endpoint via the configured base url.
pub struct ChatIntel {
    client: Client<OpenAIConfig>,
    config: IntelConfig,
}

impl ChatIntel {
    pub fn new(config: IntelConfig, secret: &SecretConfig) -> Self {
        let api_key = SecretString::from(secret.api_key.clone());
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key.expose_secret())
            .with_api_base(&config.base_url);
        Self {
            client: Client::with_config(openai_config),
            config,
        }
    }

    #[tracing::instrument(skip(self, prompt))]
    async fn chat_json(&self, prompt: String) -> IntelResult<serde_json::Value> {
        debug!("prompt length: {}", prompt.len());

        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(SYSTEM_PROMPT.to_string()),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt),
                name: None,
            }),
        ];

        let request = CreateChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: Some(self.config.temperature),
            max_completion_tokens: Some(self.config.max_tokens as u32),
            response_format: Some(ResponseFormat::JsonObject),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| IntelError::Api(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| IntelError::Api("no response content".into()))?;

        serde_json::from_str(&content).map_err(|e| IntelError::MalformedResponse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct RawProposal {
    proposed_date: chrono::NaiveDate,
    proposed_time: String,
    #[serde(default = "default_duration_hours")]
    duration_hours: f64,
    location_name: String,
    #[serde(default)]
    location_city: Option<String>,
    #[serde(default)]
    activity_suggestion: String,
    #[serde(default)]
    estimated_cost_per_person: Option<f64>,
    #[serde(default)]
    reasoning: String,
    // The model may also return private reasoning; it is deliberately not
    // carried into the proposal.
}

fn default_duration_hours() -> f64 {
    2.0
}

fn format_slots(slots: &[TimeSlot]) -> String {
    if slots.is_empty() {
        return "No common availability found - needs negotiation".to_string();
    }
    slots
        .iter()
        .map(|slot| {
            format!(
                "- {} to {}",
                slot.start().format("%A %b %d, %Y %H:%M"),
                slot.end().format("%H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_notes(private_notes: &HashMap<String, String>) -> String {
    if private_notes.is_empty() {
        return "No special notes".to_string();
    }
    private_notes
        .iter()
        .map(|(name, notes)| format!("- {}: {}", name, notes))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl IntelProvider for ChatIntel {
    async fn create_proposal(
        &self,
        proposer: &str,
        event: &Event,
        user_name: &str,
        profile: &UserProfile,
        private_notes: &HashMap<String, String>,
        available_slots: &[TimeSlot],
    ) -> IntelResult<Proposal> {
        let participants = event
            .participants
            .iter()
            .map(|p| p.user_name.clone())
            .collect::<Vec<_>>()
            .join(", ");
        let profile_json = serde_json::to_string_pretty(profile)
            .map_err(|e| IntelError::MalformedResponse(e.to_string()))?;

        let prompt = format!(
            "You are coordinating an event for {user_name}.\n\n\
             EVENT: {title} ({event_type})\nPARTICIPANTS: {participants}\n\n\
             YOUR HUMAN'S PREFERENCES:\n{profile_json}\n\n\
             PRIVATE NOTES (NEVER SHARE THESE):\n{notes}\n\n\
             AVAILABLE TIME SLOTS (everyone is free):\n{slots}\n\n\
             Create an optimal event proposal: the best time that works for \
             everyone, a suitable location and activity, and budget \
             considerations handled without making anyone uncomfortable.\n\n\
             Respond with a JSON object:\n\
             {{\"proposed_date\": \"YYYY-MM-DD\", \"proposed_time\": \"HH:MM\", \
             \"duration_hours\": 2, \"location_name\": \"...\", \
             \"location_city\": \"...\", \"activity_suggestion\": \"...\", \
             \"estimated_cost_per_person\": 50, \
             \"reasoning\": \"why this plan works (shared)\", \
             \"private_reasoning\": \"social dynamics considered (not shared)\"}}",
            user_name = user_name,
            title = event.title,
            event_type = event.event_type,
            participants = participants,
            profile_json = profile_json,
            notes = format_notes(private_notes),
            slots = format_slots(available_slots),
        );

        let raw: RawProposal = serde_json::from_value(self.chat_json(prompt).await?)
            .map_err(|e| IntelError::MalformedResponse(e.to_string()))?;

        let time = NaiveTime::parse_from_str(&raw.proposed_time, "%H:%M")
            .map_err(|e| IntelError::MalformedResponse(format!("bad proposed_time: {}", e)))?;
        let start = raw.proposed_date.and_time(time).and_utc();
        let end = start + Duration::minutes((raw.duration_hours * 60.0) as i64);

        let mut location = Location::named(raw.location_name);
        location.city = raw.location_city;

        let mut proposal = Proposal::new(proposer);
        proposal.date_range = Some(DateRange { start, end });
        proposal.location = Some(location);
        proposal.activity_suggestion = raw.activity_suggestion;
        proposal.estimated_cost_per_person = raw.estimated_cost_per_person;
        proposal.reasoning = raw.reasoning;
        Ok(proposal)
    }

    async fn evaluate_proposal(
        &self,
        event: &Event,
        offer: &ProposalOffer,
        user_name: &str,
        profile: &UserProfile,
        private_notes: &HashMap<String, String>,
    ) -> IntelResult<Evaluation> {
        let profile_json = serde_json::to_string_pretty(profile)
            .map_err(|e| IntelError::MalformedResponse(e.to_string()))?;
        let cost = offer
            .estimated_cost_per_person
            .map(|c| format!("${:.0}/person", c))
            .unwrap_or_else(|| "unknown".to_string());

        let prompt = format!(
            "You are evaluating an event proposal for {user_name}.\n\n\
             EVENT: {title}\nPROPOSAL:\n- When: {start} to {end}\n\
             - Location: {location}\n- Activity: {activity}\n- Est. cost: {cost}\n\n\
             YOUR HUMAN'S PREFERENCES:\n{profile_json}\n\n\
             PRIVATE NOTES (your context, not shared):\n{notes}\n\n\
             Decide whether your human should accept: does the time work, does \
             the plan fit their preferences, is the budget reasonable, and are \
             there social dynamics to consider?\n\n\
             Respond with a JSON object:\n\
             {{\"decision\": \"accept\" | \"modify\" | \"decline\", \
             \"enthusiasm_level\": 1-5, \"modifications_requested\": [], \
             \"reasoning\": \"brief explanation (shared with other agents)\", \
             \"private_reasoning\": \"social dynamics considered (not shared)\"}}",
            user_name = user_name,
            title = event.title,
            start = offer.start.format("%A %b %d, %Y %H:%M"),
            end = offer.end.format("%H:%M"),
            location = offer
                .location
                .as_ref()
                .map(|l| l.name.as_str())
                .unwrap_or("TBD"),
            activity = offer.activity_suggestion,
            cost = cost,
            profile_json = profile_json,
            notes = format_notes(private_notes),
        );

        serde_json::from_value(self.chat_json(prompt).await?)
            .map_err(|e| IntelError::MalformedResponse(e.to_string()))
    }

    async fn nudge_message(
        &self,
        friend_name: &str,
        topic: &str,
        relationship: RelationshipType,
        communication_style: &str,
    ) -> IntelResult<String> {
        let prompt = format!(
            "Generate a friendly reminder message for {friend_name} about: {topic}\n\n\
             Context:\n- Relationship: {relationship}\n\
             - Their communication style preference: {communication_style}\n\n\
             The message should be warm and not pushy, appropriate for the \
             relationship, and brief (1-2 sentences).\n\n\
             Respond with JSON: {{\"message\": \"the nudge message\"}}",
        );

        let value = self.chat_json(prompt).await?;
        Ok(value
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("Hey! Just a friendly reminder about {}", topic)))
    }

    async fn group_dynamics(
        &self,
        participants: &[String],
        relationships: &HashMap<String, FriendRelationship>,
    ) -> IntelResult<GroupReport> {
        let relationships_text = relationships
            .iter()
            .map(|(name, rel)| {
                format!(
                    "- {}: {}, notes: {}",
                    name,
                    rel.relationship_type,
                    if rel.private_notes.is_empty() {
                        "none"
                    } else {
                        &rel.private_notes
                    }
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Analyze the social dynamics for an event with these participants: {}\n\n\
             Relationship context:\n{}\n\n\
             Respond with JSON: {{\"group_vibe\": \
             \"positive/neutral/needs_attention\", \"potential_issues\": [], \
             \"suggestions\": []}}",
            participants.join(", "),
            relationships_text,
        );

        serde_json::from_value(self.chat_json(prompt).await?)
            .map_err(|e| IntelError::MalformedResponse(e.to_string()))
    }
}

/// Deterministic rule-based provider: proposes the first offered slot and
/// accepts anything that fits the owner's budget. No network, no randomness.
#[derive(Debug, Clone, Default)]
pub struct SimpleIntel;

#[async_trait]
impl IntelProvider for SimpleIntel {
    async fn create_proposal(
        &self,
        proposer: &str,
        event: &Event,
        _user_name: &str,
        profile: &UserProfile,
        _private_notes: &HashMap<String, String>,
        available_slots: &[TimeSlot],
    ) -> IntelResult<Proposal> {
        let slot = available_slots
            .first()
            .ok_or(IntelError::NoCandidateSlots)?;

        let mut proposal = Proposal::new(proposer);
        proposal.date_range = Some(DateRange {
            start: slot.start(),
            end: slot.start() + event.event_type.default_duration().min(slot.duration()),
        });
        proposal.location = Some(Location::named("TBD"));
        proposal.activity_suggestion = format!("{} with the group", event.event_type);
        proposal.estimated_cost_per_person = Some(profile.budget_max.min(50.0));
        proposal.reasoning = format!(
            "Everyone is free {}; keeping it simple and within budget.",
            slot.start().format("%A %b %d at %H:%M")
        );
        Ok(proposal)
    }

    async fn evaluate_proposal(
        &self,
        _event: &Event,
        offer: &ProposalOffer,
        _user_name: &str,
        profile: &UserProfile,
        _private_notes: &HashMap<String, String>,
    ) -> IntelResult<Evaluation> {
        let affordable = offer
            .estimated_cost_per_person
            .map(|cost| cost <= profile.budget_max || profile.budget_flexible)
            .unwrap_or(true);

        Ok(if affordable {
            Evaluation {
                decision: Decision::Accept,
                enthusiasm_level: 4,
                modifications_requested: vec![],
                reasoning: "Time and budget both work.".to_string(),
            }
        } else {
            Evaluation {
                decision: Decision::Modify,
                enthusiasm_level: 2,
                modifications_requested: vec!["something less expensive".to_string()],
                reasoning: "Over budget as proposed.".to_string(),
            }
        })
    }

    async fn nudge_message(
        &self,
        friend_name: &str,
        topic: &str,
        _relationship: RelationshipType,
        _communication_style: &str,
    ) -> IntelResult<String> {
        Ok(format!("Hey {}! Just a friendly nudge about {}.", friend_name, topic))
    }

    async fn group_dynamics(
        &self,
        _participants: &[String],
        relationships: &HashMap<String, FriendRelationship>,
    ) -> IntelResult<GroupReport> {
        let tense = relationships
            .values()
            .any(|rel| !rel.conflict_history.is_empty());
        Ok(GroupReport {
            group_vibe: if tense { "needs_attention" } else { "positive" }.to_string(),
            potential_issues: vec![],
            suggestions: vec![],
        })
    }
}

#[derive(Error, Debug)]
pub enum IntelError {
    #[error("intelligence API error: {0}")]
    Api(String),
    #[error("malformed intelligence response: {0}")]
    MalformedResponse(String),
    #[error("no candidate slots to propose from")]
    NoCandidateSlots,
}

pub type IntelResult<T> = Result<T, IntelError>;
