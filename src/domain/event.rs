use serde::{Deserialize, Serialize};

use super::contact::ContactKey;

/// Opaque service-assigned message id. A recall notice carries the id of the
/// message it withdraws.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(String);

impl SequenceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    RecallNotice,
    /// Anything else the service pushes (system notices, typing, ...).
    Other,
}

/// An event exactly as the transport produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: EventKind,
    /// Unix seconds.
    pub create_time: i64,
    pub source_key: ContactKey,
    pub sequence_id: SequenceId,
    #[serde(default)]
    pub content: String,
}

impl RawEvent {
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn message(
        source_key: &str,
        sequence_id: &str,
        create_time: i64,
        content: &str,
    ) -> Self {
        Self {
            kind: EventKind::Message,
            create_time,
            source_key: ContactKey::new(source_key),
            sequence_id: SequenceId::new(sequence_id),
            content: content.to_owned(),
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn recall(source_key: &str, sequence_id: &str, create_time: i64) -> Self {
        Self {
            kind: EventKind::RecallNotice,
            create_time,
            source_key: ContactKey::new(source_key),
            sequence_id: SequenceId::new(sequence_id),
            content: String::new(),
        }
    }
}

/// An event enriched with the resolved display name of its source, as seen by
/// the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchedEvent {
    pub kind: EventKind,
    pub create_time: i64,
    pub source_key: ContactKey,
    /// Display name as of directory build time, or the raw key on a miss.
    pub source_name: String,
    pub sequence_id: SequenceId,
    pub content: String,
}

impl DispatchedEvent {
    pub fn resolved(raw: RawEvent, source_name: String) -> Self {
        Self {
            kind: raw.kind,
            create_time: raw.create_time,
            source_key: raw.source_key,
            source_name,
            sequence_id: raw.sequence_id,
            content: raw.content,
        }
    }

    pub fn is_recalled(&self) -> bool {
        self.kind == EventKind::RecallNotice
    }
}
