//! Attachment domain entity

use super::newtypes::{AttachmentId, ContentHash, MessageId};

/// A file attached to a message, stored content-addressed by its SHA-256
/// hash (§5: `<dir>/<hash[:2]>/<hash>`, deduplicated across messages and
/// sources).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    id: AttachmentId,
    message_id: MessageId,
    content_hash: ContentHash,
    filename: String,
    media_type: String,
    size: u64,
}

impl Attachment {
    /// Creates a new attachment record.
    pub fn new(
        message_id: MessageId,
        content_hash: ContentHash,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: AttachmentId::new(),
            message_id,
            content_hash,
            filename: filename.into(),
            media_type: media_type.into(),
            size,
        }
    }

    /// Reconstitutes an attachment from storage.
    pub fn with_id(
        id: AttachmentId,
        message_id: MessageId,
        content_hash: ContentHash,
        filename: impl Into<String>,
        media_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id,
            message_id,
            content_hash,
            filename: filename.into(),
            media_type: media_type.into(),
            size,
        }
    }

    /// Returns the attachment's internal identifier.
    pub fn id(&self) -> AttachmentId {
        self.id
    }

    /// Returns the owning message.
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// Returns the content hash used for on-disk storage and dedup.
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Returns the declared filename, as seen in the MIME part.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the declared media type (MIME content-type), as seen in the
    /// part; never sniffed or corrected (§4.5).
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Returns the decoded byte size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the on-disk storage path relative to the attachments
    /// directory root: `<hash[:2]>/<hash>`.
    pub fn storage_path(&self) -> String {
        format!("{}/{}", self.content_hash.shard_prefix(), self.content_hash.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_uses_shard_prefix_and_full_hash() {
        let hash = ContentHash::of(b"attachment bytes");
        let attachment = Attachment::new(MessageId::new(), hash.clone(), "report.pdf", "application/pdf", 4096);
        assert_eq!(
            attachment.storage_path(),
            format!("{}/{}", hash.shard_prefix(), hash.as_str())
        );
    }

    #[test]
    fn media_type_is_kept_verbatim() {
        let attachment = Attachment::new(
            MessageId::new(),
            ContentHash::of(b"x"),
            "weird.bin",
            "application/x-made-up",
            1,
        );
        assert_eq!(attachment.media_type(), "application/x-made-up");
    }
}
