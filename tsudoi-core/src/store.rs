//! Persistence contract for users, relationships, events and schedules,
//! consumed as plain get/save/delete calls. The storage format is the
//! backend's business; [`MemoryStore`] is the in-process implementation used
//! by tests and single-process setups.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use thiserror::Error;

use crate::model::event::Event;
use crate::model::friend::FriendRelationship;
use crate::model::schedule::Schedule;
use crate::model::user::User;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;
    async fn save_user(&self, user: &User) -> StoreResult<()>;
    async fn delete_user(&self, user_id: &str) -> StoreResult<()>;

    /// Friend edges are keyed by owner and friend id; the edge is directed.
    async fn get_friend(&self, owner_id: &str, friend_id: &str)
        -> StoreResult<Option<FriendRelationship>>;
    async fn save_friend(&self, owner_id: &str, friend: &FriendRelationship) -> StoreResult<()>;
    async fn friends_of(&self, owner_id: &str) -> StoreResult<Vec<FriendRelationship>>;
    async fn delete_friend(&self, owner_id: &str, friend_id: &str) -> StoreResult<()>;

    async fn get_event(&self, event_id: &str) -> StoreResult<Option<Event>>;
    async fn save_event(&self, event: &Event) -> StoreResult<()>;
    async fn delete_event(&self, event_id: &str) -> StoreResult<()>;
    /// All events the user participates in, via the participant index.
    async fn events_for_participant(&self, user_id: &str) -> StoreResult<Vec<Event>>;

    async fn get_schedule(&self, user_id: &str) -> StoreResult<Option<Schedule>>;
    async fn save_schedule(&self, schedule: &Schedule) -> StoreResult<()>;
    async fn delete_schedule(&self, user_id: &str) -> StoreResult<()>;
}

/// In-memory store over concurrent maps, with a secondary index from user id
/// to the events they participate in.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    friends: DashMap<(String, String), FriendRelationship>,
    events: DashMap<String, Event>,
    participant_index: DashMap<String, HashSet<String>>,
    schedules: DashMap<String, Schedule>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        self.users
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "user",
                id: user_id.to_string(),
            })
    }

    async fn get_friend(
        &self,
        owner_id: &str,
        friend_id: &str,
    ) -> StoreResult<Option<FriendRelationship>> {
        let key = (owner_id.to_string(), friend_id.to_string());
        Ok(self.friends.get(&key).map(|entry| entry.value().clone()))
    }

    async fn save_friend(&self, owner_id: &str, friend: &FriendRelationship) -> StoreResult<()> {
        let key = (owner_id.to_string(), friend.friend_id.clone());
        self.friends.insert(key, friend.clone());
        Ok(())
    }

    async fn friends_of(&self, owner_id: &str) -> StoreResult<Vec<FriendRelationship>> {
        Ok(self
            .friends
            .iter()
            .filter(|entry| entry.key().0 == owner_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn delete_friend(&self, owner_id: &str, friend_id: &str) -> StoreResult<()> {
        let key = (owner_id.to_string(), friend_id.to_string());
        self.friends
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "friend",
                id: format!("{}/{}", owner_id, friend_id),
            })
    }

    async fn get_event(&self, event_id: &str) -> StoreResult<Option<Event>> {
        Ok(self.events.get(event_id).map(|entry| entry.value().clone()))
    }

    async fn save_event(&self, event: &Event) -> StoreResult<()> {
        // Keep the participant index in step with the participant list,
        // including removals.
        if let Some(previous) = self.events.get(&event.id).map(|entry| entry.value().clone()) {
            for participant in &previous.participants {
                if let Some(mut ids) = self.participant_index.get_mut(&participant.user_id) {
                    ids.remove(&event.id);
                }
            }
        }
        for participant in &event.participants {
            self.participant_index
                .entry(participant.user_id.clone())
                .or_default()
                .insert(event.id.clone());
        }
        self.events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> StoreResult<()> {
        let Some((_, event)) = self.events.remove(event_id) else {
            return Err(StoreError::NotFound {
                kind: "event",
                id: event_id.to_string(),
            });
        };
        for participant in &event.participants {
            if let Some(mut ids) = self.participant_index.get_mut(&participant.user_id) {
                ids.remove(event_id);
            }
        }
        Ok(())
    }

    async fn events_for_participant(&self, user_id: &str) -> StoreResult<Vec<Event>> {
        let ids = self
            .participant_index
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| self.events.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn get_schedule(&self, user_id: &str) -> StoreResult<Option<Schedule>> {
        Ok(self.schedules.get(user_id).map(|entry| entry.value().clone()))
    }

    async fn save_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        self.schedules
            .insert(schedule.user_id.clone(), schedule.clone());
        Ok(())
    }

    async fn delete_schedule(&self, user_id: &str) -> StoreResult<()> {
        self.schedules
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                kind: "schedule",
                id: user_id.to_string(),
            })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::{EventType, Participant};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_user_roundtrip() {
        let store = MemoryStore::new();
        let user = User::new("Alice");
        store.save_user(&user).await.unwrap();
        assert_eq!(store.get_user(&user.id).await.unwrap(), Some(user.clone()));
        store.delete_user(&user.id).await.unwrap();
        assert_eq!(store.get_user(&user.id).await.unwrap(), None);
        assert!(store.delete_user(&user.id).await.is_err());
    }

    #[tokio::test]
    async fn test_friend_edges_are_directed() {
        let store = MemoryStore::new();
        let friend = FriendRelationship::new("u-bob", "Bob", "TS-BOB-0001");
        store.save_friend("u-alice", &friend).await.unwrap();

        assert!(store
            .get_friend("u-alice", "u-bob")
            .await
            .unwrap()
            .is_some());
        // The reverse edge does not exist unless saved.
        assert!(store
            .get_friend("u-bob", "u-alice")
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.friends_of("u-alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_participant_index_tracks_membership() {
        let store = MemoryStore::new();
        let mut event = Event::new("u-alice", "Dinner", EventType::Dinner);
        event.add_participant(Participant::new("u-alice", "Alice", "agent-a"));
        event.add_participant(Participant::new("u-bob", "Bob", "agent-b"));
        store.save_event(&event).await.unwrap();

        assert_eq!(store.events_for_participant("u-bob").await.unwrap().len(), 1);

        // Re-save without Bob: the index entry goes away.
        event.participants.retain(|p| p.user_id != "u-bob");
        store.save_event(&event).await.unwrap();
        assert!(store
            .events_for_participant("u-bob")
            .await
            .unwrap()
            .is_empty());

        store.delete_event(&event.id).await.unwrap();
        assert!(store
            .events_for_participant("u-alice")
            .await
            .unwrap()
            .is_empty());
    }
}
