//! Concept Store Adapter interface
//!
//! The pipeline never talks to a backend directly. A `StoreAdapter` opens one
//! transaction per batch and hands the pipeline a `ConceptStore` view scoped
//! to it; returning `Err` from the closure rolls everything back.

pub mod memory;

pub use memory::MemoryStore;

use crate::errors::ExResult;
use crate::model::{AsOf, Concept, ConceptId, Partition, RevisionRecord};
use crate::schema::ConceptType;
use chrono::{DateTime, Utc};

/// Transaction-scoped primitives against the backend
///
/// Writes are visible to subsequent reads on the same view.
pub trait ConceptStore {
    /// Current state, optionally narrowed by type and ids
    fn read(
        &self,
        partition: &Partition,
        concept_type: Option<ConceptType>,
        ids: Option<&[ConceptId]>,
    ) -> ExResult<Vec<Concept>>;

    /// Last serialized snapshot from the revision log, without touching the
    /// current-state records. Removed or never-revisioned ids are absent.
    fn read_cached(&self, partition: &Partition, ids: &[ConceptId]) -> ExResult<Vec<Concept>>;

    /// Insert a new concept; `false` if the id is already taken
    fn write(&self, partition: &Partition, concept: &Concept) -> ExResult<bool>;

    /// Replace an existing concept; `false` if it does not exist
    fn update(&self, partition: &Partition, concept: &Concept) -> ExResult<bool>;

    /// Physically remove a concept; `false` if it does not exist
    fn delete(&self, partition: &Partition, id: ConceptId) -> ExResult<bool>;

    /// Highest revision allocated in the partition so far (0 if none)
    fn current_revision(&self, partition: &Partition) -> ExResult<u64>;

    /// Reserve the next revision number for the partition
    fn allocate_revision(&self, partition: &Partition) -> ExResult<u64>;

    fn append_revisions(&self, records: &[RevisionRecord]) -> ExResult<()>;

    /// Latest record per id at or before `as_of`
    fn revisions_as_of(
        &self,
        partition: &Partition,
        ids: &[ConceptId],
        as_of: AsOf,
    ) -> ExResult<Vec<RevisionRecord>>;

    /// Every record for one concept, oldest first
    fn history(&self, partition: &Partition, id: ConceptId) -> ExResult<Vec<RevisionRecord>>;

    /// Time stamped on every record committed by this transaction
    fn transaction_time(&self) -> DateTime<Utc>;

    fn get(&self, partition: &Partition, id: ConceptId) -> ExResult<Option<Concept>> {
        Ok(self.read(partition, None, Some(&[id]))?.into_iter().next())
    }
}

/// Owner of the backend connection; runs closures inside transactions
pub trait StoreAdapter {
    /// Read-write transaction: commit on `Ok`, roll back on `Err`
    fn transact<T, F>(&mut self, f: F) -> ExResult<T>
    where
        F: FnOnce(&dyn ConceptStore) -> ExResult<T>;

    /// Read-only view; writes through it fail
    fn snapshot<T, F>(&mut self, f: F) -> ExResult<T>
    where
        F: FnOnce(&dyn ConceptStore) -> ExResult<T>;
}
