//! Label domain entity

use serde::{Deserialize, Serialize};

use super::newtypes::{LabelId, RemoteLabelId, SourceId};

/// A named tag, identified by `(source, provider-label-id)`. A message has a
/// many-to-many set of labels; replacement of that set is atomic per
/// message (§3 invariants).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    id: LabelId,
    source_id: SourceId,
    remote_label_id: RemoteLabelId,
    name: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(source_id: SourceId, remote_label_id: RemoteLabelId, name: impl Into<String>) -> Self {
        Self {
            id: LabelId::new(),
            source_id,
            remote_label_id,
            name: name.into(),
        }
    }

    /// Reconstitutes a label from storage.
    pub fn with_id(
        id: LabelId,
        source_id: SourceId,
        remote_label_id: RemoteLabelId,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            source_id,
            remote_label_id,
            name: name.into(),
        }
    }

    /// Returns the label's internal identifier.
    pub fn id(&self) -> LabelId {
        self.id
    }

    /// Returns the owning source.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Returns the provider's label identifier.
    pub fn remote_label_id(&self) -> &RemoteLabelId {
        &self.remote_label_id
    }

    /// Returns the human-readable label name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_label_round_trips_fields() {
        let source = SourceId::new();
        let remote_id = RemoteLabelId::new("Label_42").unwrap();
        let label = Label::new(source, remote_id.clone(), "Important");
        assert_eq!(label.source_id(), source);
        assert_eq!(label.remote_label_id(), &remote_id);
        assert_eq!(label.name(), "Important");
    }
}
