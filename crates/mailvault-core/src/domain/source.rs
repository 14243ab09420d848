//! Mail source domain entity
//!
//! A `MailSource` is the remote mailbox being mirrored: a stable identifier
//! (typically the mailbox's address), a provider kind tag, and the opaque
//! history cursor advanced at the end of each successful sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{Cursor, SourceId};

/// Which remote adapter variant a source is mirrored through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A JSON HTTP mail API (Gmail-/Graph-API-shaped).
    JsonApi,
    /// A generic mailbox protocol (IMAP-like).
    MailboxProtocol,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::JsonApi => write!(f, "json_api"),
            SourceKind::MailboxProtocol => write!(f, "mailbox_protocol"),
        }
    }
}

/// The remote mailbox being mirrored.
///
/// Created on first sync for a given identifier; the cursor is advanced at
/// the end of each successful sync and is never deleted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailSource {
    id: SourceId,
    identifier: String,
    kind: SourceKind,
    cursor: Option<Cursor>,
    created_at: DateTime<Utc>,
}

impl MailSource {
    /// Creates a new source for `identifier`, with no cursor yet (first sync
    /// has not completed).
    pub fn new(identifier: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: SourceId::new(),
            identifier: identifier.into(),
            kind,
            cursor: None,
            created_at: Utc::now(),
        }
    }

    /// Reconstitutes a source from storage.
    pub fn with_id(
        id: SourceId,
        identifier: impl Into<String>,
        kind: SourceKind,
        cursor: Option<Cursor>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            kind,
            cursor,
            created_at,
        }
    }

    /// Returns the source's internal identifier.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Returns the stable external identifier (e.g. mailbox address).
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns which remote adapter variant this source uses.
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Returns the current sync cursor, if any sync has ever completed.
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor
    }

    /// Returns true if this source has never completed a sync.
    pub fn is_unsynced(&self) -> bool {
        self.cursor.is_none()
    }

    /// Returns when this source was first registered.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Advances the cursor, called once per successful sync after the last
    /// page (§4.7 Finalize, §4.8 step 5).
    pub fn advance_cursor(&mut self, cursor: Cursor) {
        self.cursor = Some(cursor);
    }
}
