//! End-to-end coordination over the in-process store, plus the privacy
//! boundary property: private relationship data must never appear in
//! anything serialized for transmission.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tsudoi_core::agent::{
    Coordinator, FriendContext, HeuristicOracle, IntelProvider, SimpleIntel,
};
use tsudoi_core::config::CoordinatorConfig;
use tsudoi_core::model::event::{Event, EventStatus, EventType, Participant};
use tsudoi_core::model::friend::FriendRelationship;
use tsudoi_core::model::schedule::Schedule;
use tsudoi_core::model::user::{AvailabilityBlock, User};
use tsudoi_core::relay::protocol::{AgentMessage, ProposalOffer};
use tsudoi_core::scheduler::FixedClock;
use tsudoi_core::store::{MemoryStore, Store};

const SENTINEL_NOTES: &str = "SENTINEL-PRIVATE-NOTE-7f3a had a falling out with Mike";
const SENTINEL_TOPIC: &str = "SENTINEL-SENSITIVITY-9c1d";

fn saturday_block(start_hour: u32, end_hour: u32) -> AvailabilityBlock {
    AvailabilityBlock {
        day_of_week: 5,
        start_hour,
        end_hour,
        label: String::new(),
    }
}

/// Alice owns the event; Bob and Carol are participants with private notes
/// that must never leave Alice's side.
async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    let mut alice = User::new("Alice");
    alice.id = "u-alice".to_string();
    alice.agent_id = "agent-alice".to_string();
    store.save_user(&alice).await.unwrap();

    let mut bob = FriendRelationship::new("u-bob", "Bob", "TS-BOB-0001");
    bob.private_notes = SENTINEL_NOTES.to_string();
    bob.sensitivities = vec![SENTINEL_TOPIC.to_string()];
    bob.enthusiasm_baseline = 4;
    store.save_friend("u-alice", &bob).await.unwrap();

    let mut carol = FriendRelationship::new("u-carol", "Carol", "TS-CAROL-0001");
    carol.enthusiasm_baseline = 5;
    store.save_friend("u-alice", &carol).await.unwrap();

    let mut alice_schedule = Schedule::new("u-alice");
    alice_schedule.default_availability.push(saturday_block(10, 18));
    store.save_schedule(&alice_schedule).await.unwrap();

    let mut bob_schedule = Schedule::new("u-bob");
    bob_schedule.default_availability.push(saturday_block(14, 22));
    store.save_schedule(&bob_schedule).await.unwrap();

    let mut carol_schedule = Schedule::new("u-carol");
    carol_schedule.default_availability.push(saturday_block(12, 20));
    store.save_schedule(&carol_schedule).await.unwrap();

    store
}

fn hangout_event() -> Event {
    let mut event = Event::new("u-alice", "Weekend hangout", EventType::Hangout);
    event.add_participant(Participant::new("u-alice", "Alice", "agent-alice"));
    event.add_participant(Participant::new("u-bob", "Bob", "agent-bob"));
    event.add_participant(Participant::new("u-carol", "Carol", "agent-carol"));
    event
}

fn coordinator(store: Arc<MemoryStore>) -> Coordinator {
    let oracle = Arc::new(HeuristicOracle::new(HashMap::from([
        (
            "Bob".to_string(),
            FriendContext {
                enthusiasm_baseline: 4,
                sensitivities: vec![SENTINEL_TOPIC.to_string()],
            },
        ),
        (
            "Carol".to_string(),
            FriendContext {
                enthusiasm_baseline: 5,
                sensitivities: vec![],
            },
        ),
    ])));
    Coordinator::new(
        "u-alice",
        "agent-alice",
        store,
        Arc::new(SimpleIntel),
        oracle,
        CoordinatorConfig::default(),
    )
    .with_clock(Arc::new(FixedClock(
        NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
    )))
}

#[tokio::test]
async fn full_coordination_reaches_consensus_and_freezes_details() {
    let store = seeded_store().await;
    let mut event = hangout_event();

    let outcome = coordinator(store.clone())
        .coordinate_event(&mut event)
        .await
        .unwrap();

    assert!(outcome.consensus);
    assert_eq!(event.status, EventStatus::Confirmed);
    assert_eq!(outcome.responses.len(), 3);

    // The frozen slot must fall inside everyone's overlap: Saturdays,
    // 14:00-18:00.
    let range = event.date_range.expect("confirmed event has a date");
    let start = range.start;
    assert!(start.format("%A").to_string() == "Saturday");
    let hour = start.format("%H").to_string().parse::<u32>().unwrap();
    assert!((14..18).contains(&hour), "start hour {} outside overlap", hour);

    store.save_event(&event).await.unwrap();
    let stored = store.get_event(&event.id).await.unwrap().unwrap();
    assert!(stored.consensus_reached);
}

#[tokio::test]
async fn private_notes_never_reach_the_wire() {
    let store = seeded_store().await;
    let mut event = hangout_event();
    let coordinator = coordinator(store.clone());

    coordinator.coordinate_event(&mut event).await.unwrap();

    // Everything that would be transmitted for this event: the proposal
    // offer, availability responses, and event updates.
    let proposal = event.current_proposal().expect("proposal attached");
    let offer = ProposalOffer::from_proposal(proposal).expect("offer");
    let mut wires = vec![
        AgentMessage::proposal("agent-alice", "agent-bob", &event.id, offer.clone())
            .to_wire()
            .unwrap(),
        AgentMessage::event_update("agent-alice", &event.id, event.status)
            .to_wire()
            .unwrap(),
    ];

    for user_id in ["u-alice", "u-bob", "u-carol"] {
        let schedule = store.get_schedule(user_id).await.unwrap().unwrap();
        let offers = schedule.shareable_availability(
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            NaiveDate::from_ymd_opt(2026, 9, 5).unwrap(),
        );
        wires.push(
            AgentMessage::availability_response(
                "agent-alice",
                "agent-bob",
                &event.id,
                "MSG-q",
                offers,
            )
            .to_wire()
            .unwrap(),
        );
    }

    for wire in &wires {
        assert!(
            !wire.contains("SENTINEL-"),
            "private sentinel leaked into wire message: {}",
            wire
        );
    }

    // The private context did reach the local reasoning side unredacted.
    let friends = store.friends_of("u-alice").await.unwrap();
    assert!(friends.iter().any(|f| f.private_notes.contains("SENTINEL-")));
}

#[tokio::test]
async fn proposal_reasoning_touching_a_sensitivity_blocks_consensus() {
    let mut event = hangout_event();

    // A proposal whose public reasoning mentions Bob's sensitive topic: his
    // agent asks for changes instead of accepting.
    struct TouchyIntel;
    #[async_trait::async_trait]
    impl IntelProvider for TouchyIntel {
        async fn create_proposal(
            &self,
            proposer: &str,
            event: &Event,
            user_name: &str,
            profile: &tsudoi_core::model::user::UserProfile,
            private_notes: &HashMap<String, String>,
            available_slots: &[tsudoi_core::model::schedule::TimeSlot],
        ) -> tsudoi_core::agent::intel::IntelResult<tsudoi_core::model::event::Proposal> {
            let mut proposal = SimpleIntel
                .create_proposal(proposer, event, user_name, profile, private_notes, available_slots)
                .await?;
            proposal.reasoning = format!("themed around {}", SENTINEL_TOPIC);
            Ok(proposal)
        }

        async fn evaluate_proposal(
            &self,
            event: &Event,
            offer: &ProposalOffer,
            user_name: &str,
            profile: &tsudoi_core::model::user::UserProfile,
            private_notes: &HashMap<String, String>,
        ) -> tsudoi_core::agent::intel::IntelResult<tsudoi_core::agent::intel::Evaluation> {
            SimpleIntel
                .evaluate_proposal(event, offer, user_name, profile, private_notes)
                .await
        }

        async fn nudge_message(
            &self,
            friend_name: &str,
            topic: &str,
            relationship: tsudoi_core::model::friend::RelationshipType,
            communication_style: &str,
        ) -> tsudoi_core::agent::intel::IntelResult<String> {
            SimpleIntel
                .nudge_message(friend_name, topic, relationship, communication_style)
                .await
        }

        async fn group_dynamics(
            &self,
            participants: &[String],
            relationships: &HashMap<String, FriendRelationship>,
        ) -> tsudoi_core::agent::intel::IntelResult<tsudoi_core::agent::intel::GroupReport> {
            SimpleIntel.group_dynamics(participants, relationships).await
        }
    }

    let store = seeded_store().await;
    let touchy = Coordinator::new(
        "u-alice",
        "agent-alice",
        store,
        Arc::new(TouchyIntel),
        Arc::new(HeuristicOracle::new(HashMap::from([(
            "Bob".to_string(),
            FriendContext {
                enthusiasm_baseline: 4,
                sensitivities: vec![SENTINEL_TOPIC.to_string()],
            },
        )]))),
        CoordinatorConfig::default(),
    )
    .with_clock(Arc::new(FixedClock(
        NaiveDate::from_ymd_opt(2026, 8, 3).unwrap(),
    )));

    let outcome = touchy.coordinate_event(&mut event).await.unwrap();
    assert!(!outcome.consensus);
    assert!(outcome.blocking.contains(&"agent-bob".to_string()));
    assert_eq!(event.status, EventStatus::Proposed);
}
