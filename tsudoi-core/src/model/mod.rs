//! Domain models: users, relationships, schedules, events.
//!
//! Models are plain data with query methods. Everything that may cross an
//! agent boundary has an explicit shareable projection; anything without one
//! stays on the owning side.

pub mod event;
pub mod friend;
pub mod schedule;
pub mod user;

pub use event::{
    ActivityNote, DateRange, Decision, Event, EventStatus, EventType, Location, NoteKind,
    Participant, Proposal,
};
pub use friend::{FriendProfile, FriendRelationship, RelationshipType};
pub use schedule::{Schedule, ScheduleError, SlotOffer, TimeSlot};
pub use user::{AvailabilityBlock, BlackoutDate, BudgetRange, CommunicationStyle, User, UserProfile};
