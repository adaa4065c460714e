//! # Coordination Engine
//!
//! The agent side of the system: one [`coordinator::Coordinator`] per user
//! drives an event through the proposal/response/consensus state machine.
//!
//! - [`messenger`]: the relay client. WebSocket connection, request/response
//!   correlation with timeouts, high-level messaging helpers.
//! - [`intel`]: the social-intelligence seam, an opaque, possibly slow,
//!   possibly failing call that turns structured context into a proposal or
//!   a decision.
//! - [`oracle`]: how the engine obtains other participants' decisions,
//!   either a heuristic simulation for single-process use or a real relay
//!   round-trip. The two are explicit, pluggable implementations; the
//!   simulation is never silently passed off as the real protocol.
//! - [`coordinator`]: the engine itself.

pub mod coordinator;
pub mod intel;
pub mod messenger;
pub mod oracle;

pub use coordinator::{CoordinationError, CoordinationOutcome, Coordinator};
pub use intel::{ChatIntel, Evaluation, GroupReport, IntelError, IntelProvider, SimpleIntel};
pub use messenger::{Messenger, MessengerError};
pub use oracle::{
    FriendContext, HeuristicOracle, OracleError, OracleOutcome, RelayOracle, ResponseOracle,
};
