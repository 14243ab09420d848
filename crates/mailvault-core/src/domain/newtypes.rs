//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for domain identifiers and values. Each newtype
//! validates at construction time rather than deferring to callers.

use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based internal identifiers
// ============================================================================

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// The nil (all-zero) identifier, used in tests and defaults.
            #[must_use]
            pub const fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| DomainError::InvalidId(format!("{s}: {e}")))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(SourceId, "Internal identifier for a `MailSource` row.");
uuid_id!(SyncRunId, "Internal identifier for a `SyncRun` row.");
uuid_id!(ConversationId, "Internal identifier for a `Conversation` row.");
uuid_id!(LabelId, "Internal identifier for a `Label` row.");
uuid_id!(ParticipantId, "Internal identifier for a `Participant` row.");
uuid_id!(MessageId, "Internal identifier for a `MessageRecord` row.");
uuid_id!(AttachmentId, "Internal identifier for an `Attachment` row.");

/// Auto-incrementing audit entry identifier, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditId(i64);

impl AuditId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Display for AuditId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RemoteMessageId / RemoteLabelId / RemoteThreadId
// ============================================================================

/// A provider-assigned identifier for a message, unique within one source.
///
/// Opaque beyond non-emptiness: the JSON-API variant uses short alphanumeric
/// tokens, the mailbox-protocol variant uses composite `"<folder>|<uid>"`
/// strings. Validation only rejects the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteMessageId(String);

impl RemoteMessageId {
    /// Validates and wraps a raw remote message id.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "remote message id must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Returns the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RemoteMessageId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RemoteMessageId> for String {
    fn from(id: RemoteMessageId) -> Self {
        id.0
    }
}

impl Display for RemoteMessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! remote_string_id {
    ($name:ident, $label:literal) => {
        #[doc = $label]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps a raw value; rejects the empty string.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(DomainError::InvalidRemoteId(format!(
                        "{} must not be empty",
                        $label
                    )));
                }
                Ok(Self(value))
            }

            /// Returns the raw string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

remote_string_id!(RemoteLabelId, "remote label id");
remote_string_id!(RemoteThreadId, "remote thread id");

// ============================================================================
// Cursor
// ============================================================================

/// An opaque history-position token. Incremental sync treats its contents as
/// an integer (§4.8 step 1: "parse cursor as an integer"), so the newtype
/// validates that shape up front rather than deferring the parse error to
/// the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(i64);

impl Cursor {
    /// Wraps a raw history position.
    #[must_use]
    pub const fn new(position: i64) -> Self {
        Self(position)
    }

    /// Returns the raw integer position.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::InvalidCursor(format!("{s}: {e}")))
    }
}

impl TryFrom<String> for Cursor {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.0.to_string()
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// A SHA-256 digest of an attachment's bytes, stored as 64 lowercase hex
/// characters. Used to content-address attachment files on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Computes the content hash of `bytes` directly.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(bytes);
        Self(format!("{digest:x}"))
    }

    /// Validates and wraps an already-hex-encoded digest.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.len() != 64 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidHash(format!(
                "expected 64 hex characters, got: {value}"
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Returns the hex-encoded digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two-character shard prefix used for `<dir>/<hash[:2]>/<hash>`.
    #[must_use]
    pub fn shard_prefix(&self) -> &str {
        &self.0[..2]
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ManifestId
// ============================================================================

/// A deletion manifest identifier in the form `YYYYMMDD-HHMMSS-<slug>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ManifestId(String);

impl ManifestId {
    /// Builds a manifest id from a creation timestamp and a free-form slug.
    pub fn generate(created_at: chrono::DateTime<chrono::Utc>, slug: &str) -> Result<Self, DomainError> {
        let slug = slugify(slug);
        Self::new(format!("{}-{}", created_at.format("%Y%m%d-%H%M%S"), slug))
    }

    /// Validates and wraps a raw manifest id string.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let mut parts = value.splitn(3, '-');
        let date = parts.next().unwrap_or_default();
        let time = parts.next().unwrap_or_default();
        let slug = parts.next().unwrap_or_default();
        let valid = date.len() == 8
            && date.bytes().all(|b| b.is_ascii_digit())
            && time.len() == 6
            && time.bytes().all(|b| b.is_ascii_digit())
            && !slug.is_empty();
        if !valid {
            return Err(DomainError::InvalidId(format!(
                "expected YYYYMMDD-HHMMSS-<slug>, got: {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Returns the raw string form, also the manifest's file stem.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn slugify(raw: &str) -> String {
    let mut slug: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    slug.retain(|c| c != '-' || true);
    let collapsed: String = slug
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if collapsed.is_empty() {
        "manifest".to_string()
    } else {
        collapsed
    }
}

impl TryFrom<String> for ManifestId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ManifestId> for String {
    fn from(id: ManifestId) -> Self {
        id.0
    }
}

impl Display for ManifestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Email
// ============================================================================

/// A validated, lower-cased email address.
///
/// Enforces a simple `local@domain` shape: a non-empty local part (max 64
/// bytes), a domain containing at least one dot with labels that don't start
/// or end with a hyphen (max 255 bytes). This is deliberately permissive
/// about what characters the local part may contain — real-world mail
/// addresses are messier than the RFC grammar suggests, and source accounts
/// are not under this crate's control.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Validates and normalizes an email address, lower-casing it.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let lower = value.to_ascii_lowercase();
        let Some((local, domain)) = lower.split_once('@') else {
            return Err(DomainError::InvalidEmail(value));
        };
        if local.is_empty() || local.len() > 64 {
            return Err(DomainError::InvalidEmail(value));
        }
        if domain.is_empty() || domain.len() > 255 || !domain.contains('.') {
            return Err(DomainError::InvalidEmail(value));
        }
        for label in domain.split('.') {
            if label.is_empty() || label.starts_with('-') || label.ends_with('-') {
                return Err(DomainError::InvalidEmail(value));
            }
        }
        Ok(Self(lower))
    }

    /// Returns the normalized address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the domain portion (after the `@`).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map(|(_, d)| d).unwrap_or_default()
    }
}

impl PartialEq for Email {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for Email {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
