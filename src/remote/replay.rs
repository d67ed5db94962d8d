use std::{
    collections::VecDeque,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    domain::{contact::Contact, event::RawEvent, session::SessionToken},
    usecases::{
        contact_directory::{ContactSource, ContactSourceError},
        contracts::{EventTransport, TransportError, TransportPoll},
        hot_login::{AuthBackendError, ChallengeStatus, LoginChallenge, SessionBackend},
    },
};

const SESSION_PREFIX: &str = "replay-session:";
const CHALLENGE_LIFETIME: Duration = Duration::from_secs(240);

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read replay file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid replay record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayRecord {
    Group { key: String, name: String },
    Friend { key: String, name: String },
    Event(RawEvent),
}

/// Offline remote that replays a recorded session from JSON lines.
///
/// Challenges confirm on the first poll and any token it issued resumes, so
/// the full login → resolve → dispatch path runs without a network.
#[derive(Debug, Default)]
pub struct ReplayRemote {
    groups: Vec<Contact>,
    friends: Vec<Contact>,
    events: VecDeque<RawEvent>,
    session: Option<SessionToken>,
    challenges_issued: u64,
}

impl ReplayRemote {
    pub fn open(path: &Path) -> Result<Self, ReplayError> {
        let file = File::open(path).map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_reader(BufReader::new(file)).map_err(|error| match error {
            ReplayError::Read { source, .. } => ReplayError::Read {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self, ReplayError> {
        let mut remote = Self::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| ReplayError::Read {
                path: PathBuf::new(),
                source,
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let record: ReplayRecord =
                serde_json::from_str(trimmed).map_err(|source| ReplayError::Parse {
                    line: index + 1,
                    source,
                })?;

            match record {
                ReplayRecord::Group { key, name } => remote.groups.push(Contact::new(key, name)),
                ReplayRecord::Friend { key, name } => remote.friends.push(Contact::new(key, name)),
                ReplayRecord::Event(event) => remote.events.push_back(event),
            }
        }

        tracing::debug!(
            groups = remote.groups.len(),
            friends = remote.friends.len(),
            events = remote.events.len(),
            "replay loaded"
        );

        Ok(remote)
    }

    fn is_replay_token(token: &SessionToken) -> bool {
        token.as_bytes().starts_with(SESSION_PREFIX.as_bytes())
    }
}

impl SessionBackend for ReplayRemote {
    fn resume(&mut self, token: &SessionToken) -> Result<bool, AuthBackendError> {
        if Self::is_replay_token(token) {
            self.session = Some(token.clone());
            return Ok(true);
        }

        Ok(false)
    }

    fn request_challenge(&mut self) -> Result<LoginChallenge, AuthBackendError> {
        self.challenges_issued += 1;
        let uuid = format!("replay-{}", self.challenges_issued);

        Ok(LoginChallenge {
            url: format!("replay://login/qrcode/{uuid}"),
            uuid,
            lifetime: CHALLENGE_LIFETIME,
        })
    }

    fn poll_challenge(
        &mut self,
        challenge: &LoginChallenge,
        _wait: Duration,
    ) -> Result<ChallengeStatus, AuthBackendError> {
        let token = SessionToken::new(format!("{SESSION_PREFIX}{}", challenge.uuid));
        self.session = Some(token.clone());
        Ok(ChallengeStatus::Confirmed(token))
    }
}

impl ContactSource for ReplayRemote {
    fn fetch_groups(&mut self) -> Result<Vec<Contact>, ContactSourceError> {
        if self.session.is_none() {
            return Err(ContactSourceError::Unauthorized);
        }
        Ok(self.groups.clone())
    }

    fn fetch_friends(&mut self) -> Result<Vec<Contact>, ContactSourceError> {
        if self.session.is_none() {
            return Err(ContactSourceError::Unauthorized);
        }
        Ok(self.friends.clone())
    }
}

impl EventTransport for ReplayRemote {
    fn next_event(&mut self) -> Result<TransportPoll, TransportError> {
        if self.session.is_none() {
            return Err(TransportError::SessionRevoked(
                "no active replay session".to_owned(),
            ));
        }

        Ok(self
            .events
            .pop_front()
            .map_or(TransportPoll::Closed, TransportPoll::Event))
    }

    fn reload_session(&mut self, token: &SessionToken) -> Result<(), TransportError> {
        if !Self::is_replay_token(token) {
            return Err(TransportError::SessionRevoked(
                "token was not issued by the replay remote".to_owned(),
            ));
        }

        self.session = Some(token.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::domain::event::EventKind;

    const FIXTURE: &str = r#"
# contacts
{"type":"group","key":"g1","name":"Team A"}
{"type":"friend","key":"u1","name":"Alice"}

{"type":"event","kind":"message","create_time":1700000000,"source_key":"g1","sequence_id":"m1","content":"hi"}
{"type":"event","kind":"recall_notice","create_time":1700000005,"source_key":"g1","sequence_id":"m1"}
"#;

    fn login(remote: &mut ReplayRemote) -> SessionToken {
        let challenge = remote.request_challenge().expect("challenge");
        match remote
            .poll_challenge(&challenge, Duration::ZERO)
            .expect("poll")
        {
            ChallengeStatus::Confirmed(token) => token,
            other => panic!("unexpected challenge status {other:?}"),
        }
    }

    #[test]
    fn parses_contacts_and_events_in_order() {
        let mut remote = ReplayRemote::from_reader(Cursor::new(FIXTURE)).expect("fixture parses");
        login(&mut remote);

        assert_eq!(
            remote.fetch_groups().expect("groups"),
            vec![Contact::new("g1", "Team A")]
        );
        assert_eq!(
            remote.fetch_friends().expect("friends"),
            vec![Contact::new("u1", "Alice")]
        );

        let kinds: Vec<_> = std::iter::from_fn(|| match remote.next_event() {
            Ok(TransportPoll::Event(event)) => Some(event.kind),
            _ => None,
        })
        .collect();
        assert_eq!(kinds, vec![EventKind::Message, EventKind::RecallNotice]);
        assert_eq!(remote.next_event(), Ok(TransportPoll::Closed));
    }

    #[test]
    fn reports_line_number_of_bad_record() {
        let error = ReplayRemote::from_reader(Cursor::new("{\"type\":\"group\"}\n"))
            .expect_err("missing fields must fail");

        assert!(matches!(error, ReplayError::Parse { line: 1, .. }));
    }

    #[test]
    fn requires_session_before_serving_data() {
        let mut remote = ReplayRemote::from_reader(Cursor::new(FIXTURE)).expect("fixture parses");

        assert_eq!(
            remote.fetch_groups(),
            Err(ContactSourceError::Unauthorized)
        );
        assert!(matches!(
            remote.next_event(),
            Err(TransportError::SessionRevoked(_))
        ));
    }

    #[test]
    fn issued_tokens_resume_and_foreign_tokens_do_not() {
        let mut issuer = ReplayRemote::default();
        let token = login(&mut issuer);

        let mut fresh = ReplayRemote::default();
        assert_eq!(fresh.resume(&token), Ok(true));
        assert_eq!(fresh.resume(&SessionToken::new(b"other".to_vec())), Ok(false));
    }
}
