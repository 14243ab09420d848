//! Conversation (thread) domain entity

use serde::{Deserialize, Serialize};

use super::newtypes::{ConversationId, RemoteThreadId, SourceId};

/// A thread grouping of messages, identified by `(source, provider-thread-id)`.
/// Created on first message of a thread; subject is taken from that message
/// and never overwritten by later ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    source_id: SourceId,
    remote_thread_id: RemoteThreadId,
    subject: String,
}

impl Conversation {
    /// Creates a new conversation from its first message's subject.
    pub fn new(source_id: SourceId, remote_thread_id: RemoteThreadId, subject: impl Into<String>) -> Self {
        Self {
            id: ConversationId::new(),
            source_id,
            remote_thread_id,
            subject: subject.into(),
        }
    }

    /// Reconstitutes a conversation from storage.
    pub fn with_id(
        id: ConversationId,
        source_id: SourceId,
        remote_thread_id: RemoteThreadId,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source_id,
            remote_thread_id,
            subject: subject.into(),
        }
    }

    /// Returns the conversation's internal identifier.
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Returns the owning source.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Returns the provider's thread identifier.
    pub fn remote_thread_id(&self) -> &RemoteThreadId {
        &self.remote_thread_id
    }

    /// Returns the thread's subject (from its first message).
    pub fn subject(&self) -> &str {
        &self.subject
    }
}
