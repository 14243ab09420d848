//! Reason codes for audit log entries
//!
//! Structured codes for categorizing why an ingest or deletion item failed,
//! matching the error-kind vocabulary in §7. Used by `AuditLogger` to enrich
//! `item_error` entries beyond a free-form message.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structured reason codes for per-item failures during ingest or deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// The raw bytes did not parse as MIME; a placeholder was stored instead.
    MimeParseFailure,
    /// A single message's persistence transaction failed; the batch continued.
    PersistenceFailure,
    /// The remote call was rate-limited or throttled.
    ThrottlingExceeded,
    /// A transport-level or timeout failure talking to the remote provider.
    NetworkError,
    /// Credentials were rejected or have expired.
    Unauthorized,
    /// The remote provider reported the item as not found.
    NotFound,
    /// The incremental sync's history cursor expired (§4.8 step 1).
    HistoryExpired,
    /// Deletion failed with a scope/permission error (§4.9, §7).
    PermissionDenied,
    /// Any other error, preserved by the accompanying free-form message.
    Other,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::MimeParseFailure => "mime_parse_failure",
            ReasonCode::PersistenceFailure => "persistence_failure",
            ReasonCode::ThrottlingExceeded => "throttling_exceeded",
            ReasonCode::NetworkError => "network_error",
            ReasonCode::Unauthorized => "unauthorized",
            ReasonCode::NotFound => "not_found",
            ReasonCode::HistoryExpired => "history_expired",
            ReasonCode::PermissionDenied => "permission_denied",
            ReasonCode::Other => "other",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_display() {
        assert_eq!(ReasonCode::MimeParseFailure.to_string(), "mime_parse_failure");
        assert_eq!(ReasonCode::NetworkError.to_string(), "network_error");
        assert_eq!(ReasonCode::PermissionDenied.to_string(), "permission_denied");
    }

    #[test]
    fn reason_code_serialization() {
        let code = ReasonCode::ThrottlingExceeded;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"throttling_exceeded\"");

        let deserialized: ReasonCode = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, code);
    }
}
