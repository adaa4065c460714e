use thiserror::Error;

use crate::agent::coordinator::CoordinationError;
use crate::agent::intel::IntelError;
use crate::agent::messenger::MessengerError;
use crate::model::event::EventError;
use crate::model::schedule::ScheduleError;
use crate::relay::protocol::ProtocolError;
use crate::relay::registry::RelayError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("Event error: {0}")]
    Event(#[from] EventError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
    #[error("Messenger error: {0}")]
    Messenger(#[from] MessengerError),
    #[error("Intel error: {0}")]
    Intel(#[from] IntelError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
