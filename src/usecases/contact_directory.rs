use std::collections::HashMap;

use thiserror::Error;

use crate::domain::contact::{Contact, ContactKey};

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContactSourceError {
    #[error("session is not authorized to list contacts")]
    Unauthorized,
    #[error("contact listing temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("contact listing returned malformed data")]
    InvalidData,
}

/// Remote listing of the account's groups and friends.
pub trait ContactSource {
    fn fetch_groups(&mut self) -> Result<Vec<Contact>, ContactSourceError>;

    fn fetch_friends(&mut self) -> Result<Vec<Contact>, ContactSourceError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to build contact directory from {scope}: {source}")]
pub struct DirectoryBuildError {
    pub scope: &'static str,
    #[source]
    pub source: ContactSourceError,
}

impl DirectoryBuildError {
    pub fn code(&self) -> &'static str {
        match self.source {
            ContactSourceError::Unauthorized => "DIRECTORY_UNAUTHORIZED",
            ContactSourceError::Unavailable(_) => "DIRECTORY_UNAVAILABLE",
            ContactSourceError::InvalidData => "DIRECTORY_INVALID_DATA",
        }
    }
}

/// Immutable key → display name snapshot taken once per login session.
///
/// Names are never refreshed; contacts added later resolve to their raw key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactDirectory {
    names: HashMap<ContactKey, String>,
}

impl ContactDirectory {
    /// Fetches every group (and friends when asked) in one pass. Group names
    /// win over friend names on a key collision.
    pub fn build(
        source: &mut dyn ContactSource,
        include_friends: bool,
    ) -> Result<Self, DirectoryBuildError> {
        let groups = source
            .fetch_groups()
            .map_err(|source| DirectoryBuildError {
                scope: "groups",
                source,
            })?;

        let friends = if include_friends {
            source
                .fetch_friends()
                .map_err(|source| DirectoryBuildError {
                    scope: "friends",
                    source,
                })?
        } else {
            Vec::new()
        };

        let group_count = groups.len();
        let friend_count = friends.len();
        let mut directory = Self::from_contacts(groups);
        directory.fill_missing(friends);

        tracing::info!(
            groups = group_count,
            friends = friend_count,
            entries = directory.len(),
            "contact directory built"
        );

        Ok(directory)
    }

    /// A repeated key takes the last name listed. Blank names are skipped so
    /// lookups fall back to the raw key instead of an empty string.
    pub fn from_contacts(contacts: impl IntoIterator<Item = Contact>) -> Self {
        let mut names = HashMap::new();
        for contact in contacts.into_iter().filter(has_name) {
            names.insert(contact.key, contact.display_name);
        }

        Self { names }
    }

    /// Adds names only for keys that are not resolvable yet.
    fn fill_missing(&mut self, contacts: impl IntoIterator<Item = Contact>) {
        for contact in contacts.into_iter().filter(has_name) {
            self.names.entry(contact.key).or_insert(contact.display_name);
        }
    }

    pub fn resolve(&self, key: &ContactKey) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    pub fn resolve_or_raw<'a>(&'a self, key: &'a ContactKey) -> &'a str {
        self.resolve(key).unwrap_or(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn has_name(contact: &Contact) -> bool {
    !contact.display_name.trim().is_empty()
}
