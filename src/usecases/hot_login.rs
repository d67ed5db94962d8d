use std::{
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    domain::session::SessionToken,
    infra::{
        config::LoginConfig,
        contracts::{CredentialStore, CredentialStoreError},
        secrets::sanitize_error_code,
    },
    usecases::dispatch::StopHandle,
};

const LOGIN_RESUMED: &str = "LOGIN_RESUMED";
const LOGIN_RESUME_REJECTED: &str = "LOGIN_RESUME_REJECTED";
const LOGIN_PROBE_FAILED: &str = "LOGIN_PROBE_FAILED";
const LOGIN_CHALLENGE_ISSUED: &str = "LOGIN_CHALLENGE_ISSUED";
const LOGIN_CHALLENGE_SCANNED: &str = "LOGIN_CHALLENGE_SCANNED";
const LOGIN_CHALLENGE_EXPIRED: &str = "LOGIN_CHALLENGE_EXPIRED";
const LOGIN_CANCELLED: &str = "LOGIN_CANCELLED";

/// Minimum pause between polls when the backend answers without waiting.
const MIN_POLL_PAUSE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginChallenge {
    pub uuid: String,
    /// Address the operator opens or scans to confirm the login.
    pub url: String,
    /// Service-imposed lifetime of the challenge.
    pub lifetime: Duration,
}

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeStatus {
    Pending,
    /// Scanned on the device but not yet confirmed.
    Scanned,
    Confirmed(SessionToken),
    Expired,
    Rejected,
}

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthBackendError {
    Timeout,
    Transient { code: &'static str, message: String },
}

/// Remote side of the login protocol. A backend adopts a session as its
/// active one when `resume` returns `true` or a challenge is confirmed.
pub trait SessionBackend {
    /// Lightweight liveness probe for a persisted token.
    fn resume(&mut self, token: &SessionToken) -> Result<bool, AuthBackendError>;

    fn request_challenge(&mut self) -> Result<LoginChallenge, AuthBackendError>;

    /// Blocks up to `wait` for the challenge to change state.
    fn poll_challenge(
        &mut self,
        challenge: &LoginChallenge,
        wait: Duration,
    ) -> Result<ChallengeStatus, AuthBackendError>;
}

/// Receives the challenge URL once per interactive login attempt.
pub trait UuidCallback: Send + Sync {
    fn on_challenge(&self, url: &str);
}

impl<F> UuidCallback for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_challenge(&self, url: &str) {
        self(url)
    }
}

/// Default callback: prints the URL for the operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintChallengeUrl;

impl UuidCallback for PrintChallengeUrl {
    fn on_challenge(&self, url: &str) {
        println!("Open the following URL and confirm the login on your phone:");
        println!("{url}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPolicy {
    pub challenge_timeout: Duration,
    pub poll_interval: Duration,
    /// Fresh challenges issued after the first one expires.
    pub expired_retries: u32,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self::from(&LoginConfig::default())
    }
}

impl From<&LoginConfig> for LoginPolicy {
    fn from(config: &LoginConfig) -> Self {
        Self {
            challenge_timeout: Duration::from_millis(config.challenge_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            expired_retries: config.expired_retries,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login challenge expired after {attempts} attempt(s)")]
    Expired { attempts: u32 },
    #[error("login was rejected on the confirming device")]
    Rejected,
    #[error("login was cancelled by the operator")]
    Cancelled,
    #[error("{code}: remote login step failed")]
    Backend { code: String },
    #[error(transparent)]
    Storage(#[from] CredentialStoreError),
}

impl LoginError {
    pub fn code(&self) -> String {
        match self {
            Self::Expired { .. } => "LOGIN_EXPIRED".to_owned(),
            Self::Rejected => "LOGIN_REJECTED".to_owned(),
            Self::Cancelled => LOGIN_CANCELLED.to_owned(),
            Self::Backend { code } => code.clone(),
            Self::Storage(error) => error.code().to_owned(),
        }
    }

    fn from_backend(error: AuthBackendError) -> Self {
        let code = match error {
            AuthBackendError::Timeout => "LOGIN_TIMEOUT".to_owned(),
            AuthBackendError::Transient { code, .. } => sanitize_error_code(code),
        };
        Self::Backend { code }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSource {
    Resumed,
    Interactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotLoginOutcome {
    pub token: SessionToken,
    pub source: LoginSource,
}

pub struct Authenticator {
    policy: LoginPolicy,
    uuid_callback: Box<dyn UuidCallback>,
    stop: Option<StopHandle>,
}

impl Authenticator {
    pub fn new(policy: LoginPolicy, uuid_callback: impl UuidCallback + 'static) -> Self {
        Self {
            policy,
            uuid_callback: Box::new(uuid_callback),
            stop: None,
        }
    }

    /// Interactive login gives up with `LoginError::Cancelled` once `stop`
    /// is requested. Checked between polls.
    pub fn with_stop(mut self, stop: StopHandle) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Resumes from `store` when possible, otherwise runs an interactive
    /// login and persists the result.
    ///
    /// Concurrent callers on the same store wait on the store lock; the
    /// second one usually resumes from the token the first one saved.
    pub fn hot_login(
        &self,
        backend: &mut dyn SessionBackend,
        store: &dyn CredentialStore,
    ) -> Result<HotLoginOutcome, LoginError> {
        let _lock = store.lock()?;

        if let Some(token) = store.load()? {
            if self.probe(backend, &token) {
                tracing::info!(
                    code = LOGIN_RESUMED,
                    location = %store.location(),
                    "resumed persisted session"
                );
                return Ok(HotLoginOutcome {
                    token,
                    source: LoginSource::Resumed,
                });
            }
        } else {
            tracing::info!(
                location = %store.location(),
                "no persisted session; interactive login required"
            );
        }

        let token = self.login(backend)?;
        store.save(&token)?;

        Ok(HotLoginOutcome {
            token,
            source: LoginSource::Interactive,
        })
    }

    /// Interactive challenge login, retried on expiry up to the policy bound.
    pub fn login(&self, backend: &mut dyn SessionBackend) -> Result<SessionToken, LoginError> {
        let attempts = self.policy.expired_retries.saturating_add(1);

        for attempt in 1..=attempts {
            match self.run_challenge(backend, attempt)? {
                Some(token) => return Ok(token),
                None => tracing::warn!(
                    code = LOGIN_CHALLENGE_EXPIRED,
                    attempt,
                    attempts_left = attempts - attempt,
                    "login challenge expired"
                ),
            }
        }

        Err(LoginError::Expired { attempts })
    }

    fn ensure_not_cancelled(&self) -> Result<(), LoginError> {
        match &self.stop {
            Some(stop) if stop.is_stopped() => {
                tracing::info!(code = LOGIN_CANCELLED, "interactive login cancelled");
                Err(LoginError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn probe(&self, backend: &mut dyn SessionBackend, token: &SessionToken) -> bool {
        match backend.resume(token) {
            Ok(true) => true,
            Ok(false) => {
                tracing::info!(
                    code = LOGIN_RESUME_REJECTED,
                    "persisted session is no longer accepted by the remote"
                );
                false
            }
            Err(error) => {
                tracing::warn!(
                    code = LOGIN_PROBE_FAILED,
                    backend_code = %LoginError::from_backend(error).code(),
                    "session liveness probe failed; falling back to interactive login"
                );
                false
            }
        }
    }

    /// `Ok(None)` when the challenge expired before confirmation.
    fn run_challenge(
        &self,
        backend: &mut dyn SessionBackend,
        attempt: u32,
    ) -> Result<Option<SessionToken>, LoginError> {
        self.ensure_not_cancelled()?;
        let challenge = backend
            .request_challenge()
            .map_err(LoginError::from_backend)?;
        tracing::info!(
            code = LOGIN_CHALLENGE_ISSUED,
            attempt,
            uuid = %challenge.uuid,
            "login challenge issued"
        );
        self.uuid_callback.on_challenge(&challenge.url);

        let deadline = Instant::now() + challenge.lifetime.min(self.policy.challenge_timeout);
        let mut scanned = false;

        loop {
            self.ensure_not_cancelled()?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let wait = remaining.min(self.policy.poll_interval);
            let started = Instant::now();
            let status = match backend.poll_challenge(&challenge, wait) {
                Ok(status) => status,
                Err(AuthBackendError::Timeout) => ChallengeStatus::Pending,
                Err(error) => return Err(LoginError::from_backend(error)),
            };

            match status {
                ChallengeStatus::Confirmed(token) => return Ok(Some(token)),
                ChallengeStatus::Expired => return Ok(None),
                ChallengeStatus::Rejected => return Err(LoginError::Rejected),
                ChallengeStatus::Scanned if !scanned => {
                    scanned = true;
                    tracing::info!(
                        code = LOGIN_CHALLENGE_SCANNED,
                        "challenge scanned; waiting for confirmation"
                    );
                }
                ChallengeStatus::Scanned | ChallengeStatus::Pending => {}
            }

            if started.elapsed() < MIN_POLL_PAUSE {
                thread::sleep(MIN_POLL_PAUSE.min(remaining));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    use super::*;
    use crate::{
        domain::event::DispatchedEvent,
        infra::credential_store::FileCredentialStore,
        usecases::dispatch::{EventDispatcher, RetryPolicy},
    };

    const LIVE_TOKEN: &[u8] = b"confirmed-session";

    struct FakeBackend {
        statuses: VecDeque<Result<ChallengeStatus, AuthBackendError>>,
        probe: Option<Result<bool, AuthBackendError>>,
        challenges_issued: usize,
    }

    impl FakeBackend {
        fn new(statuses: Vec<Result<ChallengeStatus, AuthBackendError>>) -> Self {
            Self {
                statuses: statuses.into(),
                probe: None,
                challenges_issued: 0,
            }
        }

        fn with_probe(mut self, probe: Result<bool, AuthBackendError>) -> Self {
            self.probe = Some(probe);
            self
        }
    }

    impl SessionBackend for FakeBackend {
        fn resume(&mut self, token: &SessionToken) -> Result<bool, AuthBackendError> {
            self.probe
                .clone()
                .unwrap_or_else(|| Ok(token.as_bytes() == LIVE_TOKEN))
        }

        fn request_challenge(&mut self) -> Result<LoginChallenge, AuthBackendError> {
            self.challenges_issued += 1;
            Ok(LoginChallenge {
                uuid: format!("uuid-{}", self.challenges_issued),
                url: format!("https://login.test/qrcode/uuid-{}", self.challenges_issued),
                lifetime: Duration::from_secs(30),
            })
        }

        fn poll_challenge(
            &mut self,
            _challenge: &LoginChallenge,
            _wait: Duration,
        ) -> Result<ChallengeStatus, AuthBackendError> {
            self.statuses
                .pop_front()
                .unwrap_or(Ok(ChallengeStatus::Expired))
        }
    }

    fn counting_callback() -> (Arc<AtomicUsize>, impl UuidCallback + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        (calls, move |_url: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn confirmed() -> Result<ChallengeStatus, AuthBackendError> {
        Ok(ChallengeStatus::Confirmed(SessionToken::new(LIVE_TOKEN)))
    }

    fn fast_policy() -> LoginPolicy {
        LoginPolicy {
            challenge_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            expired_retries: 2,
        }
    }

    fn temp_store() -> (tempfile::TempDir, FileCredentialStore) {
        let root = tempfile::tempdir().expect("tempdir should be created");
        let store = FileCredentialStore::new(root.path().join("token.json"));
        (root, store)
    }

    #[test]
    fn valid_saved_token_resumes_without_interactive_login() {
        let (_root, store) = temp_store();
        store
            .save(&SessionToken::new(LIVE_TOKEN))
            .expect("fixture save");
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![]);

        let outcome = authenticator
            .hot_login(&mut backend, &store)
            .expect("hot login should succeed");

        assert_eq!(outcome.source, LoginSource::Resumed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.challenges_issued, 0);
    }

    #[test]
    fn absent_token_triggers_exactly_one_interactive_login_and_persists() {
        let (_root, store) = temp_store();
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![
            Ok(ChallengeStatus::Pending),
            Ok(ChallengeStatus::Scanned),
            confirmed(),
        ]);

        let outcome = authenticator
            .hot_login(&mut backend, &store)
            .expect("hot login should succeed");

        assert_eq!(outcome.source, LoginSource::Interactive);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.load().expect("load should succeed"),
            Some(SessionToken::new(LIVE_TOKEN))
        );
    }

    #[test]
    fn corrupt_token_falls_back_to_interactive_login_once() {
        let (_root, store) = temp_store();
        std::fs::write(store.path(), b"not json at all").expect("fixture write");
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![confirmed()]);

        let outcome = authenticator
            .hot_login(&mut backend, &store)
            .expect("hot login should succeed");

        assert_eq!(outcome.source, LoginSource::Interactive);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_token_rejected_by_probe_falls_back() {
        let (_root, store) = temp_store();
        store
            .save(&SessionToken::new(b"stale".to_vec()))
            .expect("fixture save");
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![confirmed()]);

        authenticator
            .hot_login(&mut backend, &store)
            .expect("hot login should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.load().expect("load should succeed"),
            Some(SessionToken::new(LIVE_TOKEN))
        );
    }

    #[test]
    fn probe_error_falls_back_to_interactive_login() {
        let (_root, store) = temp_store();
        store
            .save(&SessionToken::new(LIVE_TOKEN))
            .expect("fixture save");
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![confirmed()]).with_probe(Err(
            AuthBackendError::Transient {
                code: "LOGIN_BACKEND_UNAVAILABLE",
                message: "connection reset".to_owned(),
            },
        ));

        let outcome = authenticator
            .hot_login(&mut backend, &store)
            .expect("hot login should succeed");

        assert_eq!(outcome.source, LoginSource::Interactive);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_challenges_are_retried_within_bound() {
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![
            Ok(ChallengeStatus::Expired),
            Ok(ChallengeStatus::Expired),
            confirmed(),
        ]);

        let token = authenticator
            .login(&mut backend)
            .expect("third challenge should succeed");

        assert_eq!(token, SessionToken::new(LIVE_TOKEN));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn expiry_beyond_retry_budget_is_classified() {
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![]);

        let error = authenticator
            .login(&mut backend)
            .expect_err("all challenges expire");

        assert!(matches!(error, LoginError::Expired { attempts: 3 }));
        assert_eq!(error.code(), "LOGIN_EXPIRED");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn rejection_is_not_retried() {
        let (_root, store) = temp_store();
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![Ok(ChallengeStatus::Rejected), confirmed()]);

        let error = authenticator
            .hot_login(&mut backend, &store)
            .expect_err("rejected login must fail");

        assert!(matches!(error, LoginError::Rejected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().expect("load should succeed"), None);
    }

    #[test]
    fn stop_request_abandons_pending_challenge() {
        let (_root, store) = temp_store();
        let dispatcher = EventDispatcher::new(|_: &DispatchedEvent| {}, RetryPolicy::default());
        let stop = dispatcher.stop_handle();
        let operator = stop.clone();
        let authenticator =
            Authenticator::new(fast_policy(), move |_: &str| operator.stop()).with_stop(stop);
        let mut backend = FakeBackend::new(vec![Ok(ChallengeStatus::Pending); 100]);

        let error = authenticator
            .hot_login(&mut backend, &store)
            .expect_err("cancelled login must fail");

        assert!(matches!(error, LoginError::Cancelled));
        assert_eq!(error.code(), "LOGIN_CANCELLED");
        assert_eq!(backend.challenges_issued, 1);
        assert_eq!(backend.statuses.len(), 100);
        assert_eq!(store.load().expect("load should succeed"), None);
    }

    #[test]
    fn stop_request_does_not_block_resume() {
        let (_root, store) = temp_store();
        store
            .save(&SessionToken::new(LIVE_TOKEN))
            .expect("fixture save");
        let dispatcher = EventDispatcher::new(|_: &DispatchedEvent| {}, RetryPolicy::default());
        let stop = dispatcher.stop_handle();
        stop.stop();
        let (calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback).with_stop(stop);
        let mut backend = FakeBackend::new(vec![]);

        let outcome = authenticator
            .hot_login(&mut backend, &store)
            .expect("resume needs no challenge");

        assert_eq!(outcome.source, LoginSource::Resumed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn polling_stops_at_challenge_deadline() {
        let (_calls, callback) = counting_callback();
        let authenticator = Authenticator::new(
            LoginPolicy {
                challenge_timeout: Duration::from_millis(120),
                poll_interval: Duration::from_millis(10),
                expired_retries: 0,
            },
            callback,
        );
        let mut backend = FakeBackend::new(
            std::iter::repeat_with(|| Ok(ChallengeStatus::Pending))
                .take(10_000)
                .collect(),
        );

        let started = Instant::now();
        let error = authenticator
            .login(&mut backend)
            .expect_err("pending forever must expire");

        assert!(matches!(error, LoginError::Expired { attempts: 1 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn backend_error_code_is_sanitized() {
        let (_calls, callback) = counting_callback();
        let authenticator = Authenticator::new(fast_policy(), callback);
        let mut backend = FakeBackend::new(vec![Err(AuthBackendError::Transient {
            code: "uin=12345 ticket",
            message: "secret".to_owned(),
        })]);

        let error = authenticator
            .login(&mut backend)
            .expect_err("backend failure must surface");

        assert_eq!(error.code(), "LOGIN_TRANSIENT");
    }

    #[test]
    fn concurrent_hot_logins_on_one_store_are_serialized() {
        let root = tempfile::tempdir().expect("tempdir should be created");
        let path = root.path().join("token.json");
        let calls = Arc::new(AtomicUsize::new(0));
        let outcomes = Arc::new(Mutex::new(Vec::new()));

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                let calls = Arc::clone(&calls);
                let outcomes = Arc::clone(&outcomes);
                std::thread::spawn(move || {
                    let store = FileCredentialStore::new(path);
                    let authenticator = Authenticator::new(fast_policy(), move |_url: &str| {
                        calls.fetch_add(1, Ordering::SeqCst);
                    });
                    let mut backend = FakeBackend::new(vec![confirmed()]);
                    let outcome = authenticator
                        .hot_login(&mut backend, &store)
                        .expect("hot login should succeed");
                    outcomes.lock().expect("outcomes lock").push(outcome.source);
                })
            })
            .collect();

        for worker in workers {
            worker.join().expect("worker should not panic");
        }

        let mut sources = outcomes.lock().expect("outcomes lock").clone();
        sources.sort_by_key(|source| matches!(source, LoginSource::Interactive));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sources, vec![LoginSource::Resumed, LoginSource::Interactive]);
    }
}
