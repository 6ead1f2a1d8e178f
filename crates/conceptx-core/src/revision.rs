//! Revision Manager
//!
//! Allocates per-partition revision numbers, writes the append-only revision
//! log, and answers as-of reads. Revision numbers come from the store inside
//! the batch transaction, so an aborted batch never exposes its number.

use crate::errors::{ConceptXError, ExResult};
use crate::model::{AsOf, Concept, ConceptId, Partition, RevisionRecord};
use crate::schema::ConceptType;
use crate::store::ConceptStore;
use std::collections::BTreeMap;

/// One concept changed by a transaction; `state: None` means removed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedConcept {
    pub id: ConceptId,
    pub concept_type: ConceptType,
    pub state: Option<Concept>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionManager;

impl RevisionManager {
    pub fn new() -> Self {
        Self
    }

    /// Next revision for `partition`, strictly above anything committed there
    ///
    /// # Errors
    ///
    /// `Persistence` if the store cannot allocate, `Internal` if the store
    /// hands back a number that does not advance.
    pub fn next_revision(&self, store: &dyn ConceptStore, partition: &Partition) -> ExResult<u64> {
        let committed = store.current_revision(partition)?;
        let next = store.allocate_revision(partition)?;
        if next <= committed {
            return Err(ConceptXError::Internal {
                message: format!(
                    "revision allocator for {} returned {} after {}",
                    partition, next, committed
                ),
            }
            .into());
        }
        Ok(next)
    }

    /// Durably store one record per changed concept at `revision`
    ///
    /// # Errors
    ///
    /// `Persistence` if the store rejects the write; `Internal` if a state
    /// does not carry `revision`.
    pub fn record_revisions(
        &self,
        store: &dyn ConceptStore,
        partition: &Partition,
        revision: u64,
        changed: &[ChangedConcept],
    ) -> ExResult<Vec<RevisionRecord>> {
        let committed_at = store.transaction_time();
        let mut records = Vec::with_capacity(changed.len());
        for change in changed {
            if let Some(state) = &change.state {
                if state.revision_number != revision {
                    return Err(ConceptXError::Internal {
                        message: format!(
                            "{} carries revision {} but is recorded at {}",
                            change.id, state.revision_number, revision
                        ),
                    }
                    .into());
                }
            }
            records.push(RevisionRecord {
                partition: partition.clone(),
                concept_id: change.id,
                concept_type: change.concept_type,
                revision,
                state: change.state.clone(),
                committed_at,
            });
        }
        store.append_revisions(&records)?;
        Ok(records)
    }

    /// Most recent state of each id at or before `as_of`
    ///
    /// Ids that did not exist yet, or had been removed by then, are absent.
    pub fn resolve_as_of(
        &self,
        store: &dyn ConceptStore,
        partition: &Partition,
        ids: &[ConceptId],
        as_of: AsOf,
    ) -> ExResult<BTreeMap<ConceptId, Concept>> {
        Ok(store
            .revisions_as_of(partition, ids, as_of)?
            .into_iter()
            .filter_map(|r| r.state.map(|state| (r.concept_id, state)))
            .collect())
    }

    pub fn history(
        &self,
        store: &dyn ConceptStore,
        partition: &Partition,
        id: ConceptId,
    ) -> ExResult<Vec<RevisionRecord>> {
        store.history(partition, id)
    }
}
