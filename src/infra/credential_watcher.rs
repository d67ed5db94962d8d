use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{domain::session::SessionToken, infra::contracts::CredentialStoreError};

const CREDENTIAL_WATCHER_RELOADED: &str = "STORE_CREDENTIAL_RELOADED";
const CREDENTIAL_WATCHER_LOAD_FAILED: &str = "STORE_CREDENTIAL_WATCH_LOAD_FAILED";
const CREDENTIAL_WATCHER_SHUTDOWN_FAILED: &str = "STORE_CREDENTIAL_WATCHER_SHUTDOWN_FAILED";

/// Background poller that reports a persisted token whenever it differs
/// from the last one it saw.
#[derive(Debug)]
pub struct CredentialWatcher {
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    updates: Receiver<SessionToken>,
}

impl CredentialWatcher {
    pub fn start<L>(
        interval: Duration,
        initial: Option<SessionToken>,
        load: L,
    ) -> std::io::Result<Self>
    where
        L: Fn() -> Result<Option<SessionToken>, CredentialStoreError> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (update_tx, updates) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("wxwatch-credential-watcher".to_owned())
            .spawn(move || run_watcher(interval, initial, load, update_tx, stop_rx))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            worker: Some(worker),
            updates,
        })
    }

    /// Most recent change observed since the last call, if any.
    pub fn try_latest(&self) -> Option<SessionToken> {
        self.updates.try_iter().last()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn next_timeout(&self, timeout: Duration) -> Option<SessionToken> {
        self.updates.recv_timeout(timeout).ok()
    }
}

impl Drop for CredentialWatcher {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(worker) = self.worker.take() {
            if let Err(error) = worker.join() {
                tracing::warn!(
                    code = CREDENTIAL_WATCHER_SHUTDOWN_FAILED,
                    error = ?error,
                    "credential watcher worker panicked on shutdown"
                );
            }
        }
    }
}

fn run_watcher<L>(
    interval: Duration,
    mut last_seen: Option<SessionToken>,
    load: L,
    update_tx: Sender<SessionToken>,
    stop_rx: Receiver<()>,
) where
    L: Fn() -> Result<Option<SessionToken>, CredentialStoreError>,
{
    loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }

        match load() {
            Ok(Some(token)) if last_seen.as_ref() != Some(&token) => {
                tracing::info!(
                    code = CREDENTIAL_WATCHER_RELOADED,
                    bytes = token.len(),
                    "persisted credential changed externally"
                );
                last_seen = Some(token.clone());
                if update_tx.send(token).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(
                    code = CREDENTIAL_WATCHER_LOAD_FAILED,
                    error = %error,
                    "credential watcher could not reload; keeping previous session"
                );
            }
        }
    }
}
