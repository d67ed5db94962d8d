use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    time::Duration,
};

use thiserror::Error;

use crate::{
    domain::{
        event::{DispatchedEvent, RawEvent},
        session::SessionToken,
    },
    infra::{
        config::DispatchConfig, contracts::CredentialStore,
        credential_watcher::CredentialWatcher,
    },
    usecases::{
        contact_directory::ContactDirectory,
        contracts::{EventHandler, EventTransport, TransportError, TransportPoll},
    },
};

const DISPATCH_STARTED: &str = "DISPATCH_STARTED";
const DISPATCH_STOPPED: &str = "DISPATCH_STOPPED";
const DISPATCH_FAULTED: &str = "DISPATCH_FAULTED";
const DISPATCH_HANDLER_FAILED: &str = "DISPATCH_HANDLER_FAILED";
const DISPATCH_TRANSPORT_RETRY: &str = "DISPATCH_TRANSPORT_RETRY";
const DISPATCH_SESSION_PERSISTED: &str = "DISPATCH_SESSION_PERSISTED";
const DISPATCH_SESSION_PERSIST_FAILED: &str = "DISPATCH_SESSION_PERSIST_FAILED";
const DISPATCH_SESSION_RELOADED: &str = "DISPATCH_SESSION_RELOADED";
const DISPATCH_SESSION_RELOAD_FAILED: &str = "DISPATCH_SESSION_RELOAD_FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Running,
    Stopped,
    Faulted,
}

/// Backoff for transient transport failures: exponential from
/// `initial_backoff`, capped at `max_backoff`, at most `max_retries` in a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport fault after {retries} retries: {source}")]
    TransportFault {
        retries: u32,
        #[source]
        source: TransportError,
    },
    #[error("dispatcher cannot start from state {state:?}")]
    AlreadyFinished { state: DispatcherState },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TransportFault { .. } => "TRANSPORT_FAULT",
            Self::AlreadyFinished { .. } => "DISPATCH_ALREADY_FINISHED",
        }
    }
}

/// Requests cooperative shutdown of a running dispatcher. The request is
/// sticky, so work started before the dispatcher runs can observe it too.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop_tx: Sender<()>,
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
        let _ = self.stop_tx.send(());
    }

    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Keeps the live session and the persisted token in step while running.
pub struct SessionSync<'a> {
    pub store: &'a dyn CredentialStore,
    pub watcher: Option<CredentialWatcher>,
    pub current: SessionToken,
}

/// Single-threaded receive → resolve → deliver loop.
///
/// Exactly one handler call is in flight at a time and events reach the
/// handler in transport order. Cancellation is only observed between
/// deliveries.
pub struct EventDispatcher<H> {
    handler: H,
    policy: RetryPolicy,
    state: DispatcherState,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    requested: Arc<AtomicBool>,
    delivered: u64,
}

impl<H> EventDispatcher<H>
where
    H: EventHandler,
{
    pub fn new(handler: H, policy: RetryPolicy) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel();
        Self {
            handler,
            policy,
            state: DispatcherState::Idle,
            stop_tx,
            stop_rx,
            requested: Arc::new(AtomicBool::new(false)),
            delivered: 0,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop_tx: self.stop_tx.clone(),
            requested: Arc::clone(&self.requested),
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Runs until cancelled (`Ok`) or the transport fails for good (`Err`).
    pub fn run(
        &mut self,
        transport: &mut dyn EventTransport,
        directory: &ContactDirectory,
        mut session: Option<SessionSync<'_>>,
    ) -> Result<(), DispatchError> {
        if self.state != DispatcherState::Idle {
            return Err(DispatchError::AlreadyFinished { state: self.state });
        }

        self.state = DispatcherState::Running;
        tracing::info!(code = DISPATCH_STARTED, "event dispatcher running");

        let mut failures = 0u32;

        loop {
            if self.stop_requested() {
                return Ok(self.finish_stopped("cancelled"));
            }

            if let Some(sync) = session.as_mut() {
                sync_session(transport, sync);
            }

            match transport.next_event() {
                Ok(TransportPoll::Event(raw)) => {
                    failures = 0;
                    if self.stop_requested() {
                        return Ok(self.finish_stopped("cancelled"));
                    }
                    self.deliver(raw, directory);
                }
                Ok(TransportPoll::Idle) => failures = 0,
                Ok(TransportPoll::Closed) => {
                    return Ok(self.finish_stopped("transport closed"));
                }
                Err(error @ TransportError::SessionRevoked(_)) => {
                    return Err(self.finish_faulted(failures, error));
                }
                Err(error @ TransportError::Transient(_)) => {
                    failures += 1;
                    if failures > self.policy.max_retries {
                        return Err(self.finish_faulted(failures - 1, error));
                    }

                    let backoff = self.policy.backoff_for(failures);
                    tracing::warn!(
                        code = DISPATCH_TRANSPORT_RETRY,
                        attempt = failures,
                        max_retries = self.policy.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "transport hiccup; backing off"
                    );

                    if self.stop_rx.recv_timeout(backoff).is_ok() {
                        return Ok(self.finish_stopped("cancelled during backoff"));
                    }
                }
            }
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop_rx.try_recv().is_ok()
    }

    fn deliver(&mut self, raw: RawEvent, directory: &ContactDirectory) {
        let source_name = directory.resolve_or_raw(&raw.source_key).to_owned();
        let event = DispatchedEvent::resolved(raw, source_name);

        tracing::debug!(
            kind = ?event.kind,
            sequence_id = event.sequence_id.as_str(),
            source = event.source_key.as_str(),
            "dispatching event"
        );

        if let Err(error) = self.handler.handle(&event) {
            tracing::warn!(
                code = DISPATCH_HANDLER_FAILED,
                sequence_id = event.sequence_id.as_str(),
                error = %error,
                "event handler failed; continuing"
            );
        }
        self.delivered += 1;
    }

    fn finish_stopped(&mut self, reason: &'static str) {
        self.state = DispatcherState::Stopped;
        tracing::info!(
            code = DISPATCH_STOPPED,
            reason,
            delivered = self.delivered,
            "event dispatcher stopped"
        );
    }

    fn finish_faulted(&mut self, retries: u32, source: TransportError) -> DispatchError {
        self.state = DispatcherState::Faulted;
        tracing::error!(
            code = DISPATCH_FAULTED,
            transport_code = source.code(),
            retries,
            delivered = self.delivered,
            "event dispatcher faulted"
        );
        DispatchError::TransportFault { retries, source }
    }
}

fn sync_session(transport: &mut dyn EventTransport, sync: &mut SessionSync<'_>) {
    if let Some(refreshed) = transport.take_refreshed_session() {
        if refreshed != sync.current {
            match sync.store.save(&refreshed) {
                Ok(()) => {
                    tracing::info!(
                        code = DISPATCH_SESSION_PERSISTED,
                        "refreshed session persisted"
                    );
                    sync.current = refreshed;
                }
                Err(error) => tracing::warn!(
                    code = DISPATCH_SESSION_PERSIST_FAILED,
                    error = %error,
                    "failed to persist refreshed session"
                ),
            }
        }
    }

    let external = sync
        .watcher
        .as_ref()
        .and_then(CredentialWatcher::try_latest);
    if let Some(token) = external {
        if token != sync.current {
            match transport.reload_session(&token) {
                Ok(()) => {
                    tracing::info!(
                        code = DISPATCH_SESSION_RELOADED,
                        "adopted externally refreshed session"
                    );
                    sync.current = token;
                }
                Err(error) => tracing::warn!(
                    code = DISPATCH_SESSION_RELOAD_FAILED,
                    error = %error,
                    "externally refreshed session was not accepted"
                ),
            }
        }
    }
}
