use super::{Concept, ConceptId, Partition};
use crate::schema::ConceptType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable entry of the append-only revision log
///
/// `state` is `None` when the revision removed the concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub partition: Partition,
    pub concept_id: ConceptId,
    pub concept_type: ConceptType,
    pub revision: u64,
    pub state: Option<Concept>,
    pub committed_at: DateTime<Utc>,
}

/// Point in history for an as-of read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsOf {
    Revision(u64),
    Instant(DateTime<Utc>),
}

impl AsOf {
    /// Whether a record was committed at or before this point
    pub fn includes(&self, record: &RevisionRecord) -> bool {
        match self {
            AsOf::Revision(r) => record.revision <= *r,
            AsOf::Instant(t) => record.committed_at <= *t,
        }
    }
}
