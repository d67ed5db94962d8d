use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    domain::session::SessionToken,
    infra::{
        config::AppConfig,
        contracts::{CredentialStore, CredentialStoreError},
    },
    usecases::{
        contact_directory::{ContactDirectory, ContactSource, DirectoryBuildError},
        contracts::{EventHandler, EventTransport},
        dispatch::{DispatchError, EventDispatcher, RetryPolicy, SessionSync, StopHandle},
        hot_login::{Authenticator, LoginError, LoginPolicy, LoginSource, SessionBackend, UuidCallback},
    },
};

#[derive(Debug, Error)]
pub enum BotError {
    #[error("no authenticated session; log in before building contacts or blocking")]
    NotLoggedIn,
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error(transparent)]
    Storage(#[from] CredentialStoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryBuildError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl BotError {
    pub fn code(&self) -> String {
        match self {
            Self::NotLoggedIn => "LOGIN_REQUIRED".to_owned(),
            Self::Login(error) => error.code(),
            Self::Storage(error) => error.code().to_owned(),
            Self::Directory(error) => error.code().to_owned(),
            Self::Dispatch(error) => error.code().to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotOptions {
    pub login: LoginPolicy,
    pub retry: RetryPolicy,
    pub include_friends: bool,
    /// Poll interval for external credential changes; `None` loads once.
    pub hot_reload: Option<Duration>,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for BotOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            login: LoginPolicy::from(&config.login),
            retry: RetryPolicy::from(&config.dispatch),
            include_friends: config.directory.include_friends,
            hot_reload: config
                .session
                .hot_reload
                .then(|| config.session.hot_reload_interval()),
        }
    }
}

/// Owns one remote client, one authenticator, one dispatcher, and the
/// contact directory of the current session.
pub struct Bot<R, H> {
    remote: R,
    authenticator: Authenticator,
    dispatcher: EventDispatcher<H>,
    directory: Option<Arc<ContactDirectory>>,
    session: Option<SessionToken>,
    store: Option<Arc<dyn CredentialStore>>,
    options: BotOptions,
}

impl<R, H> Bot<R, H>
where
    R: SessionBackend + ContactSource + EventTransport,
    H: EventHandler,
{
    pub fn new(
        remote: R,
        handler: H,
        uuid_callback: impl UuidCallback + 'static,
        options: BotOptions,
    ) -> Self {
        let dispatcher = EventDispatcher::new(handler, options.retry.clone());
        let authenticator = Authenticator::new(options.login.clone(), uuid_callback)
            .with_stop(dispatcher.stop_handle());
        Self {
            remote,
            authenticator,
            dispatcher,
            directory: None,
            session: None,
            store: None,
            options,
        }
    }

    /// Interactive login without persistence.
    pub fn login(&mut self) -> Result<(), BotError> {
        let token = self.authenticator.login(&mut self.remote)?;
        self.start_session(token, None);
        Ok(())
    }

    /// Resume from `store`, falling back to interactive login.
    pub fn hot_login(&mut self, store: Arc<dyn CredentialStore>) -> Result<LoginSource, BotError> {
        let outcome = self
            .authenticator
            .hot_login(&mut self.remote, store.as_ref())?;
        self.start_session(outcome.token, Some(store));
        Ok(outcome.source)
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// Built on first use and kept for the rest of the session.
    pub fn contact_directory(&mut self) -> Result<Arc<ContactDirectory>, BotError> {
        if self.session.is_none() {
            return Err(BotError::NotLoggedIn);
        }

        if let Some(directory) = &self.directory {
            return Ok(Arc::clone(directory));
        }

        let directory = Arc::new(ContactDirectory::build(
            &mut self.remote,
            self.options.include_friends,
        )?);
        self.directory = Some(Arc::clone(&directory));
        Ok(directory)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.dispatcher.stop_handle()
    }

    /// Dispatches events until cancelled or the transport faults.
    pub fn block(&mut self) -> Result<(), BotError> {
        let Some(current) = self.session.clone() else {
            return Err(BotError::NotLoggedIn);
        };
        let directory = self.contact_directory()?;

        let store = self.store.clone();
        let sync = match store.as_deref() {
            Some(store) => {
                let watcher = match self.options.hot_reload {
                    Some(interval) => store.watch(interval, &current)?,
                    None => None,
                };
                if watcher.is_none() {
                    tracing::debug!(
                        location = %store.location(),
                        "credential hot reload unavailable; session loaded once"
                    );
                }
                Some(SessionSync {
                    store,
                    watcher,
                    current,
                })
            }
            None => None,
        };

        self.dispatcher
            .run(&mut self.remote, directory.as_ref(), sync)?;
        Ok(())
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn handler(&self) -> &H {
        self.dispatcher.handler()
    }

    fn start_session(&mut self, token: SessionToken, store: Option<Arc<dyn CredentialStore>>) {
        self.session = Some(token);
        self.store = store;
        self.directory = None;
    }
}
