//! mailvault-mime - MIME-to-model mapping
//!
//! Maps a message's raw bytes (as returned by any `RemoteAdapter`) into the
//! fields the ingest worker needs to persist: subject, snippet, decoded body,
//! participants, thread key, and attachments (§4.5). Built on `mail-parser`
//! for MIME structure and `encoding_rs` for the charset fallback chain.

pub mod mapper;

pub use mapper::{ensure_utf8, ensure_utf8_with_hint, map_message, MappedAttachment, MappedMessage, MappedParticipant};
