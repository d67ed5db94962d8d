use std::{io, time::Duration};

use anyhow::Result;
use thiserror::Error;

use crate::{
    domain::session::SessionToken, infra::config::AppConfig,
    infra::credential_watcher::CredentialWatcher,
};

pub trait ConfigAdapter {
    fn load(&self) -> Result<AppConfig>;
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("failed to {op} credential at {location}: {source}")]
    Io {
        op: &'static str,
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode credential for {location}: {source}")]
    Encode {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CredentialStoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "STORE_IO_FAILED",
            Self::Encode { .. } => "STORE_ENCODE_FAILED",
        }
    }
}

/// Held while a login attempt owns the store; released on drop.
pub struct StoreLockGuard {
    _held: Option<Box<dyn Send>>,
}

impl StoreLockGuard {
    pub fn new(held: impl Send + 'static) -> Self {
        Self {
            _held: Some(Box::new(held)),
        }
    }

    pub fn unlocked() -> Self {
        Self { _held: None }
    }
}

/// Persistence for the single session token of this process.
///
/// `load` distinguishes "nothing usable persisted" (`Ok(None)`, which also
/// covers a corrupt blob) from a real I/O failure (`Err`). `save` must be
/// atomic: concurrent readers observe either the old or the new token.
pub trait CredentialStore: Send + Sync {
    fn location(&self) -> String;

    fn load(&self) -> Result<Option<SessionToken>, CredentialStoreError>;

    fn save(&self, token: &SessionToken) -> Result<(), CredentialStoreError>;

    /// Serializes login attempts against this store. Blocks until acquired.
    fn lock(&self) -> Result<StoreLockGuard, CredentialStoreError> {
        Ok(StoreLockGuard::unlocked())
    }

    /// Starts watching for external token changes, reporting any persisted
    /// token that differs from `live`. `None` means the store cannot watch
    /// and callers fall back to load-once.
    fn watch(
        &self,
        _interval: Duration,
        _live: &SessionToken,
    ) -> Result<Option<CredentialWatcher>, CredentialStoreError> {
        Ok(None)
    }
}
