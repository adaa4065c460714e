use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RelationshipType {
    #[default]
    Friend,
    CloseFriend,
    Partner,
    Family,
    Colleague,
}

/// A directed edge from one user to a known counterpart.
///
/// The fields split into two disjoint sets: the shareable attributes exposed
/// through [`FriendRelationship::profile`], and private attributes (notes,
/// sensitivities, history, social hints) that must never be transmitted to
/// another agent. Nothing outside `profile()` is allowed onto the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRelationship {
    pub friend_id: String,
    pub friend_name: String,
    /// The code used to connect.
    pub friend_code: String,

    #[serde(default)]
    pub relationship_type: RelationshipType,
    pub connected_at: DateTime<Utc>,

    // Private: never shared with other agents.
    #[serde(default)]
    pub private_notes: String,
    #[serde(default)]
    pub sensitivities: Vec<String>,
    #[serde(default)]
    pub history_notes: String,
    #[serde(default)]
    pub conflict_history: Vec<String>,

    // Social dynamics hints, used by the owning agent only.
    #[serde(default = "default_enthusiasm")]
    pub enthusiasm_baseline: u8,
    #[serde(default = "default_communication")]
    pub communication_preference: String,

    // Shared metadata, safe to disclose.
    #[serde(default)]
    pub shared_events_count: u32,
    #[serde(default)]
    pub last_hangout: Option<DateTime<Utc>>,
    #[serde(default)]
    pub mutual_friends: Vec<String>,
}

impl FriendRelationship {
    pub fn new(
        friend_id: impl Into<String>,
        friend_name: impl Into<String>,
        friend_code: impl Into<String>,
    ) -> Self {
        Self {
            friend_id: friend_id.into(),
            friend_name: friend_name.into(),
            friend_code: friend_code.into(),
            relationship_type: RelationshipType::default(),
            connected_at: Utc::now(),
            private_notes: String::new(),
            sensitivities: Vec::new(),
            history_notes: String::new(),
            conflict_history: Vec::new(),
            enthusiasm_baseline: default_enthusiasm(),
            communication_preference: default_communication(),
            shared_events_count: 0,
            last_hangout: None,
            mutual_friends: Vec::new(),
        }
    }

    /// The only projection of this relationship that may cross the agent
    /// boundary.
    pub fn profile(&self) -> FriendProfile {
        FriendProfile {
            friend_id: self.friend_id.clone(),
            friend_name: self.friend_name.clone(),
            relationship_type: self.relationship_type,
            shared_events_count: self.shared_events_count,
            mutual_friends: self.mutual_friends.clone(),
        }
    }
}

/// Shareable projection of a [`FriendRelationship`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendProfile {
    pub friend_id: String,
    pub friend_name: String,
    pub relationship_type: RelationshipType,
    pub shared_events_count: u32,
    pub mutual_friends: Vec<String>,
}

fn default_enthusiasm() -> u8 {
    3
}

fn default_communication() -> String {
    "text".to_string()
}
