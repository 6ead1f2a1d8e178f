//! In-memory Concept Store Adapter
//!
//! Each transaction works on a private copy of the state and swaps it in on
//! commit, which gives the same all-or-nothing behaviour as the SQLite
//! adapter. Not shared across threads.

use super::{ConceptStore, StoreAdapter};
use crate::errors::{ConceptXError, ExError, ExErrorKind, ExResult};
use crate::model::{AsOf, Concept, ConceptId, Partition, RevisionRecord};
use crate::schema::ConceptType;
use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;
use std::collections::BTreeMap;

type Key = (String, ConceptId);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    concepts: BTreeMap<Key, Concept>,
    revisions: Vec<RevisionRecord>,
    counters: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: MemoryState,
    last_time: Option<DateTime<Utc>>,
    unavailable: bool,
    fail_revision_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every transaction fail as if the backend were down
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Make `append_revisions` fail while other writes succeed
    pub fn set_fail_revision_writes(&mut self, fail: bool) {
        self.fail_revision_writes = fail;
    }

    /// Place a concept directly, bypassing the pipeline (fixtures only)
    pub fn seed(&mut self, partition: &Partition, concept: Concept) {
        self.state
            .concepts
            .insert((partition.name().to_string(), concept.id), concept);
    }

    pub fn concept_count(&self) -> usize {
        self.state.concepts.len()
    }

    pub fn revision_count(&self) -> usize {
        self.state.revisions.len()
    }

    fn begin(&mut self, writable: bool) -> ExResult<MemoryTransaction> {
        if self.unavailable {
            return Err(ConceptXError::StoreUnavailable {
                message: "memory store marked unavailable".to_string(),
            }
            .into());
        }
        // Transaction times are strictly increasing so instant reads are exact
        let mut now = Utc::now();
        if let Some(last) = self.last_time {
            if now <= last {
                now = last + Duration::milliseconds(1);
            }
        }
        self.last_time = Some(now);
        Ok(MemoryTransaction {
            state: RefCell::new(self.state.clone()),
            time: now,
            writable,
            fail_revision_writes: self.fail_revision_writes,
        })
    }
}

impl StoreAdapter for MemoryStore {
    fn transact<T, F>(&mut self, f: F) -> ExResult<T>
    where
        F: FnOnce(&dyn ConceptStore) -> ExResult<T>,
    {
        let tx = self.begin(true)?;
        let value = f(&tx)?;
        self.state = tx.state.into_inner();
        Ok(value)
    }

    fn snapshot<T, F>(&mut self, f: F) -> ExResult<T>
    where
        F: FnOnce(&dyn ConceptStore) -> ExResult<T>,
    {
        let tx = self.begin(false)?;
        f(&tx)
    }
}

struct MemoryTransaction {
    state: RefCell<MemoryState>,
    time: DateTime<Utc>,
    writable: bool,
    fail_revision_writes: bool,
}

impl MemoryTransaction {
    fn ensure_writable(&self, op: &str) -> ExResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(ExError::new(ExErrorKind::Persistence)
                .with_op(op)
                .with_message("write attempted on a read-only snapshot"))
        }
    }

    fn latest_record(
        state: &MemoryState,
        partition: &Partition,
        id: ConceptId,
        as_of: Option<AsOf>,
    ) -> Option<RevisionRecord> {
        state
            .revisions
            .iter()
            .filter(|r| &r.partition == partition && r.concept_id == id)
            .filter(|r| as_of.map_or(true, |a| a.includes(r)))
            .max_by_key(|r| r.revision)
            .cloned()
    }
}

impl ConceptStore for MemoryTransaction {
    fn read(
        &self,
        partition: &Partition,
        concept_type: Option<ConceptType>,
        ids: Option<&[ConceptId]>,
    ) -> ExResult<Vec<Concept>> {
        let state = self.state.borrow();
        let matches_type = |c: &Concept| concept_type.map_or(true, |t| c.concept_type == t);
        let found = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| state.concepts.get(&(partition.name().to_string(), *id)))
                .filter(|c| matches_type(c))
                .cloned()
                .collect(),
            None => state
                .concepts
                .iter()
                .filter(|((p, _), c)| p == partition.name() && matches_type(c))
                .map(|(_, c)| c.clone())
                .collect(),
        };
        Ok(found)
    }

    fn read_cached(&self, partition: &Partition, ids: &[ConceptId]) -> ExResult<Vec<Concept>> {
        let state = self.state.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| Self::latest_record(&state, partition, *id, None))
            .filter_map(|r| r.state)
            .collect())
    }

    fn write(&self, partition: &Partition, concept: &Concept) -> ExResult<bool> {
        self.ensure_writable("write")?;
        let mut state = self.state.borrow_mut();
        let key = (partition.name().to_string(), concept.id);
        if state.concepts.contains_key(&key) {
            return Ok(false);
        }
        state.concepts.insert(key, concept.clone());
        Ok(true)
    }

    fn update(&self, partition: &Partition, concept: &Concept) -> ExResult<bool> {
        self.ensure_writable("update")?;
        let mut state = self.state.borrow_mut();
        match state
            .concepts
            .get_mut(&(partition.name().to_string(), concept.id))
        {
            Some(slot) => {
                *slot = concept.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, partition: &Partition, id: ConceptId) -> ExResult<bool> {
        self.ensure_writable("delete")?;
        let mut state = self.state.borrow_mut();
        Ok(state
            .concepts
            .remove(&(partition.name().to_string(), id))
            .is_some())
    }

    fn current_revision(&self, partition: &Partition) -> ExResult<u64> {
        Ok(self
            .state
            .borrow()
            .counters
            .get(partition.name())
            .copied()
            .unwrap_or(0))
    }

    fn allocate_revision(&self, partition: &Partition) -> ExResult<u64> {
        self.ensure_writable("allocate_revision")?;
        let mut state = self.state.borrow_mut();
        let counter = state
            .counters
            .entry(partition.name().to_string())
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn append_revisions(&self, records: &[RevisionRecord]) -> ExResult<()> {
        self.ensure_writable("append_revisions")?;
        if self.fail_revision_writes {
            return Err(ConceptXError::StoreUnavailable {
                message: "revision log rejected the write".to_string(),
            }
            .into());
        }
        let mut state = self.state.borrow_mut();
        for record in records {
            let duplicate = state.revisions.iter().any(|r| {
                r.partition == record.partition
                    && r.concept_id == record.concept_id
                    && r.revision == record.revision
            });
            if duplicate {
                return Err(ExError::new(ExErrorKind::Persistence)
                    .with_op("append_revisions")
                    .with_concept_id(record.concept_id.to_string())
                    .with_message(format!("revision {} already recorded", record.revision)));
            }
            state.revisions.push(record.clone());
        }
        Ok(())
    }

    fn revisions_as_of(
        &self,
        partition: &Partition,
        ids: &[ConceptId],
        as_of: AsOf,
    ) -> ExResult<Vec<RevisionRecord>> {
        let state = self.state.borrow();
        Ok(ids
            .iter()
            .filter_map(|id| Self::latest_record(&state, partition, *id, Some(as_of)))
            .collect())
    }

    fn history(&self, partition: &Partition, id: ConceptId) -> ExResult<Vec<RevisionRecord>> {
        let state = self.state.borrow();
        let mut records: Vec<_> = state
            .revisions
            .iter()
            .filter(|r| &r.partition == partition && r.concept_id == id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.revision);
        Ok(records)
    }

    fn transaction_time(&self) -> DateTime<Utc> {
        self.time
    }
}
