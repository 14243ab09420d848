//! Message record domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ConversationId, MessageId, ParticipantId, RemoteMessageId, SourceId};

/// Which recipient list a participant join row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    /// The sender.
    From,
    /// Primary recipients.
    To,
    /// Carbon-copy recipients.
    Cc,
    /// Blind carbon-copy recipients.
    Bcc,
}

impl std::fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecipientKind::From => "from",
            RecipientKind::To => "to",
            RecipientKind::Cc => "cc",
            RecipientKind::Bcc => "bcc",
        };
        write!(f, "{s}")
    }
}

/// A single mail. Bodies and raw bytes live in side tables keyed by message
/// id (§3); this struct carries only the indexed/queryable metadata.
///
/// Never updated once stored except: label set, tombstone timestamp, and
/// body if the message is re-ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    id: MessageId,
    source_id: SourceId,
    remote_message_id: RemoteMessageId,
    conversation_id: ConversationId,
    from_participant_id: Option<ParticipantId>,
    sent_at: DateTime<Utc>,
    size_estimate: u64,
    has_attachments: bool,
    attachment_count: u32,
    subject: String,
    snippet: String,
    tombstoned_at: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Creates a new message record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: SourceId,
        remote_message_id: RemoteMessageId,
        conversation_id: ConversationId,
        from_participant_id: Option<ParticipantId>,
        sent_at: DateTime<Utc>,
        size_estimate: u64,
        attachment_count: u32,
        subject: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            source_id,
            remote_message_id,
            conversation_id,
            from_participant_id,
            sent_at,
            size_estimate,
            has_attachments: attachment_count > 0,
            attachment_count,
            subject: subject.into(),
            snippet: snippet.into(),
            tombstoned_at: None,
        }
    }

    /// Reconstitutes a message record from storage.
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: MessageId,
        source_id: SourceId,
        remote_message_id: RemoteMessageId,
        conversation_id: ConversationId,
        from_participant_id: Option<ParticipantId>,
        sent_at: DateTime<Utc>,
        size_estimate: u64,
        attachment_count: u32,
        subject: impl Into<String>,
        snippet: impl Into<String>,
        tombstoned_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            source_id,
            remote_message_id,
            conversation_id,
            from_participant_id,
            sent_at,
            size_estimate,
            has_attachments: attachment_count > 0,
            attachment_count,
            subject: subject.into(),
            snippet: snippet.into(),
            tombstoned_at,
        }
    }

    /// Returns the message's internal identifier.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the owning source.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Returns the provider's message identifier.
    pub fn remote_message_id(&self) -> &RemoteMessageId {
        &self.remote_message_id
    }

    /// Returns the owning conversation.
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Returns the sender's participant id, if the sender was parseable
    /// (§3: "exactly one `from` recipient row if a sender was parseable,
    /// zero otherwise").
    pub fn from_participant_id(&self) -> Option<ParticipantId> {
        self.from_participant_id
    }

    /// Returns the message's send time (UTC).
    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    /// Returns the estimated size in bytes.
    pub fn size_estimate(&self) -> u64 {
        self.size_estimate
    }

    /// Returns whether this message has any attachments.
    pub fn has_attachments(&self) -> bool {
        self.has_attachments
    }

    /// Returns the attachment count.
    pub fn attachment_count(&self) -> u32 {
        self.attachment_count
    }

    /// Returns the subject line.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the body snippet.
    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    /// Returns the tombstone timestamp, if the message has been deleted at
    /// the source.
    pub fn tombstoned_at(&self) -> Option<DateTime<Utc>> {
        self.tombstoned_at
    }

    /// Returns true if this message has been tombstoned.
    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned_at.is_some()
    }

    /// Marks the message deleted at the source (§4.8 step 4: batch-tombstone
    /// deleted ids).
    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.tombstoned_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageRecord {
        MessageRecord::new(
            SourceId::new(),
            RemoteMessageId::new("msg-1").unwrap(),
            ConversationId::new(),
            Some(ParticipantId::new()),
            Utc::now(),
            1024,
            2,
            "Hello",
            "Hi there",
        )
    }

    #[test]
    fn has_attachments_derived_from_count() {
        let message = sample();
        assert!(message.has_attachments());
        assert_eq!(message.attachment_count(), 2);
    }

    #[test]
    fn no_sender_means_no_from_participant() {
        let message = MessageRecord::new(
            SourceId::new(),
            RemoteMessageId::new("msg-2").unwrap(),
            ConversationId::new(),
            None,
            Utc::now(),
            0,
            0,
            "(no subject)",
            "",
        );
        assert!(message.from_participant_id().is_none());
        assert!(!message.has_attachments());
    }

    #[test]
    fn tombstone_sets_timestamp() {
        let mut message = sample();
        assert!(!message.is_tombstoned());
        let at = Utc::now();
        message.tombstone(at);
        assert!(message.is_tombstoned());
        assert_eq!(message.tombstoned_at(), Some(at));
    }

    #[test]
    fn recipient_kind_display() {
        assert_eq!(RecipientKind::From.to_string(), "from");
        assert_eq!(RecipientKind::Bcc.to_string(), "bcc");
    }
}
