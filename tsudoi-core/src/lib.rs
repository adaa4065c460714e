//! # TSUDOI: Agent-to-Agent Event Coordination
//!
//! Tsudoi coordinates social events between independent agents, each acting
//! on behalf of one person. Agents negotiate a shared outcome (time, place,
//! plan) over an asynchronous message relay, using a proposal/response
//! convergence protocol over partial, privacy-partitioned information.
//!
//! ## Architecture Overview
//!
//! The system is built from three tightly coupled pieces:
//!
//! - **Scheduler** ([`scheduler`], [`model::schedule`]): computes common free
//!   time across independent calendars under event-type policy.
//! - **Relay layer** ([`relay`]): a typed message vocabulary, a
//!   connection-oriented routing registry, and a WebSocket messenger client
//!   with request/response correlation and timeouts.
//! - **Coordination engine** ([`agent`]): drives one event through a
//!   proposal/response/consensus state machine, enforcing a hard privacy
//!   boundary between what an agent knows and what it may disclose.
//!
//! ## Coordination Flow
//!
//! ```text
//! Schedules ──▶ Scheduler ──▶ candidate slots
//!                                  │
//!                                  ▼
//!                         IntelProvider (proposal)
//!                                  │
//!                                  ▼
//!              Relay ──▶ participant agents ──▶ decisions
//!                                  │
//!                                  ▼
//!                         consensus check ──▶ Event confirmed
//! ```
//!
//! ## Privacy Boundary
//!
//! Relationship data is partitioned into a shareable projection
//! ([`model::friend::FriendProfile`]) and private attributes (notes,
//! sensitivities, history). Private attributes feed only the local
//! intelligence prompt; they are never placed in a wire message. This is the
//! single most important correctness property of the system and is covered
//! by dedicated tests.

pub mod agent;
pub mod config;
pub mod error;
pub mod model;
pub mod relay;
pub mod scheduler;
pub mod store;

// Re-exports
pub use error::*;
pub use model::*;

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
