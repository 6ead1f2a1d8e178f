//! Operation Processor
//!
//! Entry point for batches and reads. A batch runs inside one store
//! transaction: every operation is validated, authorized, passed through the
//! side-effect hooks and persisted in order, and any error rolls back the
//! whole batch.

mod transaction;

use crate::errors::ExResult;
use crate::model::{AsOf, Concept, ConceptId, Partition, RevisionRecord};
use crate::operations::{BatchFailure, BatchOutcome, BatchRequest};
use crate::permission::{Actor, PermissionGate, SecurityContext};
use crate::resolve::{ReadOptions, Resolver};
use crate::revision::RevisionManager;
use crate::side_effects::SideEffectRegistry;
use crate::store::{ConceptStore, StoreAdapter};
use crate::{log_op_end, log_op_error, log_op_start};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use transaction::TransactionContext;

pub const DEFAULT_MAX_CASCADE_OPERATIONS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Cascades one client operation may spawn before the batch is rejected
    pub max_cascade_operations: usize,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            max_cascade_operations: DEFAULT_MAX_CASCADE_OPERATIONS,
        }
    }
}

pub struct OperationProcessor<S: StoreAdapter> {
    store: S,
    revisions: RevisionManager,
    gate: Arc<dyn PermissionGate>,
    side_effects: Arc<SideEffectRegistry>,
    settings: ProcessorSettings,
}

impl<S: StoreAdapter> OperationProcessor<S> {
    pub fn new(
        store: S,
        revisions: RevisionManager,
        gate: Arc<dyn PermissionGate>,
        side_effects: Arc<SideEffectRegistry>,
    ) -> Self {
        Self {
            store,
            revisions,
            gate,
            side_effects,
            settings: ProcessorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProcessorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Apply a batch atomically
    ///
    /// # Errors
    ///
    /// Returns a `BatchFailure` carrying the index of the client operation
    /// that failed (cascade failures report the operation that spawned them).
    /// Nothing from the batch is persisted.
    pub fn process(&mut self, request: BatchRequest) -> Result<BatchOutcome, BatchFailure> {
        let start = Instant::now();
        let BatchRequest {
            context,
            actor,
            partition,
            operations,
        } = request;
        log_op_start!(
            "process_batch",
            request_id = %context.request_id,
            partition = %partition,
            operation_count = operations.len(),
            actor = %actor.id,
        );

        let gate = self.gate.as_ref();
        let side_effects = self.side_effects.as_ref();
        let revisions = self.revisions;
        let limit = self.settings.max_cascade_operations;
        let result = self.store.transact(|store| {
            let mut tx =
                TransactionContext::new(store, gate, side_effects, revisions, &actor, limit);
            for (index, operation) in operations.into_iter().enumerate() {
                tx.apply(&partition, operation)
                    .map_err(|e| e.with_operation_index(index))?;
            }
            tx.finish(&partition)
        });

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            Ok(outcome) => {
                log_op_end!(
                    "process_batch",
                    duration_ms = duration_ms,
                    request_id = %context.request_id,
                    revision = ?outcome.revision,
                    changed = outcome.concepts.len(),
                    removed = outcome.removed.len(),
                );
                Ok(outcome)
            }
            Err(err) => {
                let mut err = err.with_request_id(context.request_id.clone());
                if let Some(trace_id) = context.trace_id {
                    err = err.with_trace_id(trace_id);
                }
                log_op_error!(
                    "process_batch",
                    err.clone(),
                    duration_ms = duration_ms,
                    request_id = %context.request_id,
                    operation_index = ?err.operation_index(),
                );
                Err(BatchFailure::from(err))
            }
        }
    }

    /// Requested concepts the actor may read
    pub fn get_shallow(
        &mut self,
        actor: &Actor,
        partition: &Partition,
        ids: &[ConceptId],
        options: ReadOptions,
    ) -> ExResult<Vec<Concept>> {
        let gate = Arc::clone(&self.gate);
        self.read("get_shallow", partition, |store| {
            Resolver::new(store, gate.as_ref(), actor, partition, options).get_shallow(ids, None)
        })
    }

    /// Requested concepts plus their readable containment trees
    pub fn get_deep(
        &mut self,
        actor: &Actor,
        partition: &Partition,
        ids: &[ConceptId],
        options: ReadOptions,
    ) -> ExResult<Vec<Concept>> {
        let gate = Arc::clone(&self.gate);
        self.read("get_deep", partition, |store| {
            Resolver::new(store, gate.as_ref(), actor, partition, options).get_deep(ids, None)
        })
    }

    /// Readable states of `ids` as they were at `as_of`
    pub fn resolve_as_of(
        &mut self,
        actor: &Actor,
        partition: &Partition,
        ids: &[ConceptId],
        as_of: AsOf,
    ) -> ExResult<Vec<Concept>> {
        let gate = Arc::clone(&self.gate);
        let revisions = self.revisions;
        self.read("resolve_as_of", partition, |store| {
            let states = revisions.resolve_as_of(store, partition, ids, as_of)?;
            let mut containers: BTreeMap<ConceptId, Option<Concept>> = BTreeMap::new();
            let mut visible = Vec::new();
            for id in ids {
                let Some(concept) = states.get(id) else {
                    continue;
                };
                let container = match concept.container {
                    Some(cid) => match states.get(&cid) {
                        Some(c) => Some(c.clone()),
                        None => {
                            if !containers.contains_key(&cid) {
                                let found = revisions
                                    .resolve_as_of(store, partition, &[cid], as_of)?
                                    .remove(&cid);
                                containers.insert(cid, found);
                            }
                            containers.get(&cid).cloned().flatten()
                        }
                    },
                    None => None,
                };
                let security = SecurityContext::for_container(
                    gate.as_ref(),
                    actor,
                    partition,
                    container.as_ref(),
                );
                if gate.can_read(actor, concept, partition, &security) {
                    visible.push(concept.clone());
                }
            }
            Ok(visible)
        })
    }

    /// Revision records of one concept, oldest first
    ///
    /// Empty when the actor cannot read the concept's latest recorded state.
    pub fn history(
        &mut self,
        actor: &Actor,
        partition: &Partition,
        id: ConceptId,
    ) -> ExResult<Vec<RevisionRecord>> {
        let gate = Arc::clone(&self.gate);
        let revisions = self.revisions;
        self.read("history", partition, |store| {
            let records = revisions.history(store, partition, id)?;
            let Some(latest) = records.iter().rev().find_map(|r| r.state.as_ref()) else {
                return Ok(Vec::new());
            };
            let container = match latest.container {
                Some(cid) => store.get(partition, cid)?,
                None => None,
            };
            let security =
                SecurityContext::for_container(gate.as_ref(), actor, partition, container.as_ref());
            if gate.can_read(actor, latest, partition, &security) {
                Ok(records)
            } else {
                Ok(Vec::new())
            }
        })
    }

    fn read<T, F>(&mut self, op: &'static str, partition: &Partition, f: F) -> ExResult<T>
    where
        F: FnOnce(&dyn ConceptStore) -> ExResult<T>,
    {
        let start = Instant::now();
        log_op_start!(op, partition = %partition);
        match self.store.snapshot(f) {
            Ok(value) => {
                log_op_end!(op, duration_ms = start.elapsed().as_millis() as u64);
                Ok(value)
            }
            Err(err) => {
                log_op_error!(
                    op,
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(err)
            }
        }
    }
}
