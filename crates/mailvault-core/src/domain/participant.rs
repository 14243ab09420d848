//! Participant domain entity

use serde::{Deserialize, Serialize};

use super::newtypes::{Email, ParticipantId};

/// An email address with an optional display name, deduplicated by
/// lower-cased address across sources.
///
/// The display name stored here is "best seen": whichever non-empty name
/// was last observed for this address. Per-message display names (which may
/// legitimately differ, e.g. a mailing list showing different aliases) are
/// preserved separately on the recipient join row, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    id: ParticipantId,
    email: Email,
    display_name: Option<String>,
}

impl Participant {
    /// Creates a new participant.
    pub fn new(email: Email, display_name: Option<String>) -> Self {
        Self {
            id: ParticipantId::new(),
            email,
            display_name: display_name.filter(|n| !n.is_empty()),
        }
    }

    /// Reconstitutes a participant from storage.
    pub fn with_id(id: ParticipantId, email: Email, display_name: Option<String>) -> Self {
        Self {
            id,
            email,
            display_name,
        }
    }

    /// Returns the participant's internal identifier.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Returns the normalized email address.
    pub fn email(&self) -> &Email {
        &self.email
    }

    /// Returns the best-seen display name, if any.
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Updates the display name if the incoming one is non-empty; an empty
    /// or missing incoming name never overwrites a previously-seen one.
    pub fn observe_display_name(&mut self, name: Option<&str>) {
        if let Some(name) = name {
            if !name.is_empty() {
                self.display_name = Some(name.to_string());
            }
        }
    }
}

/// Prefers a non-empty display name across duplicate occurrences within the
/// same recipient list (§8 boundary cases).
pub fn prefer_non_empty_name<'a>(a: Option<&'a str>, b: Option<&'a str>) -> Option<&'a str> {
    match (a, b) {
        (Some(a), _) if !a.is_empty() => Some(a),
        (_, Some(b)) if !b.is_empty() => Some(b),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        _ => None,
    }
}
