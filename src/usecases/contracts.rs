use anyhow::Result;
use thiserror::Error;

use crate::domain::{
    event::{DispatchedEvent, RawEvent},
    session::SessionToken,
};

/// One receive step of the transport.
#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportPoll {
    Event(RawEvent),
    /// Nothing arrived within the transport's own poll window.
    Idle,
    /// The remote ended the stream cleanly (e.g. logged out elsewhere).
    Closed,
}

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("session invalidated by remote: {0}")]
    SessionRevoked(String),
}

impl TransportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transient(_) => "TRANSPORT_TRANSIENT",
            Self::SessionRevoked(_) => "TRANSPORT_SESSION_REVOKED",
        }
    }
}

/// Source of raw events for an authenticated session.
///
/// `next_event` should return within a bounded time (yielding `Idle`) so the
/// dispatcher can observe cancellation between receives.
pub trait EventTransport {
    fn next_event(&mut self) -> Result<TransportPoll, TransportError>;

    /// Adopts a token that was refreshed outside this process.
    fn reload_session(&mut self, _token: &SessionToken) -> Result<(), TransportError> {
        Ok(())
    }

    /// A token the remote rotated mid-session that should be persisted.
    fn take_refreshed_session(&mut self) -> Option<SessionToken> {
        None
    }
}

/// User-supplied consumer of dispatched events. Errors are logged by the
/// dispatcher and never stop the loop.
pub trait EventHandler {
    fn handle(&mut self, event: &DispatchedEvent) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: FnMut(&DispatchedEvent),
{
    fn handle(&mut self, event: &DispatchedEvent) -> Result<()> {
        self(event);
        Ok(())
    }
}
