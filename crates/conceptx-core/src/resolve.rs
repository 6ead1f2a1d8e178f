//! Containment-driven read resolution
//!
//! `get_shallow` filters the requested ids through the permission gate;
//! `get_deep` then walks every containment property of each visible concept
//! through one generic `resolve` keyed by the static schema.

use crate::errors::ExResult;
use crate::model::{Concept, ConceptId, Partition};
use crate::operations::OperationKind;
use crate::permission::{Actor, PermissionGate, SecurityContext};
use crate::schema::{containment_entries, ConceptType};
use crate::store::ConceptStore;
use conceptx_core_types::schema::EVENT_READ_DENIED;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Current-state records
    #[default]
    Live,
    /// Last serialized snapshot in the revision log
    Cached,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    #[serde(default)]
    pub mode: ReadMode,
    /// Leave out concepts carrying `is_deleted = true`
    #[serde(default)]
    pub exclude_soft_deleted: bool,
}

impl ReadOptions {
    pub fn cached() -> Self {
        Self {
            mode: ReadMode::Cached,
            ..Self::default()
        }
    }

    pub fn excluding_soft_deleted(mut self) -> Self {
        self.exclude_soft_deleted = true;
        self
    }
}

pub struct Resolver<'a> {
    store: &'a dyn ConceptStore,
    gate: &'a dyn PermissionGate,
    actor: &'a Actor,
    partition: &'a Partition,
    options: ReadOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a dyn ConceptStore,
        gate: &'a dyn PermissionGate,
        actor: &'a Actor,
        partition: &'a Partition,
        options: ReadOptions,
    ) -> Self {
        Self {
            store,
            gate,
            actor,
            partition,
            options,
        }
    }

    /// Readable concepts among `ids`, in request order
    ///
    /// With `security: None` each concept is judged against its own
    /// container; otherwise the given context applies to all of them.
    pub fn get_shallow(
        &self,
        ids: &[ConceptId],
        security: Option<&SecurityContext>,
    ) -> ExResult<Vec<Concept>> {
        let mut visible = Vec::new();
        for concept in self.load(None, ids)? {
            let ctx = match security {
                Some(ctx) => *ctx,
                None => self.container_context(&concept)?,
            };
            if self.admit(&concept, &ctx) {
                visible.push(concept);
            }
        }
        Ok(visible)
    }

    /// `get_shallow` plus the readable part of each result's containment tree
    ///
    /// Children of a concept that is not readable are never visited. Each id
    /// appears at most once.
    pub fn get_deep(
        &self,
        ids: &[ConceptId],
        security: Option<&SecurityContext>,
    ) -> ExResult<Vec<Concept>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut pending = VecDeque::new();

        for concept in self.get_shallow(ids, security)? {
            if seen.insert(concept.id) {
                self.enqueue_children(&concept, &mut pending)?;
                result.push(concept);
            }
        }

        while let Some((concept_type, child_ids, ctx)) = pending.pop_front() {
            let fresh: Vec<ConceptId> = child_ids
                .into_iter()
                .filter(|id| !seen.contains(id))
                .collect();
            for concept in self.resolve(concept_type, &fresh, &ctx)? {
                if seen.insert(concept.id) {
                    self.enqueue_children(&concept, &mut pending)?;
                    result.push(concept);
                }
            }
        }
        Ok(result)
    }

    /// Readable concepts of one type under a known container decision
    pub fn resolve(
        &self,
        concept_type: ConceptType,
        ids: &[ConceptId],
        security: &SecurityContext,
    ) -> ExResult<Vec<Concept>> {
        Ok(self
            .load(Some(concept_type), ids)?
            .into_iter()
            .filter(|c| self.admit(c, security))
            .collect())
    }

    fn enqueue_children(
        &self,
        parent: &Concept,
        pending: &mut VecDeque<(ConceptType, Vec<ConceptId>, SecurityContext)>,
    ) -> ExResult<()> {
        let schema = parent.concept_type.schema();
        if schema.containment.is_empty() {
            return Ok(());
        }
        let parent_ctx = self.container_context(parent)?;
        let ctx = SecurityContext {
            container_read_allowed: true,
            container_write_allowed: self.gate.can_write(
                self.actor,
                parent,
                OperationKind::Update,
                self.partition,
                &parent_ctx,
            ),
        };
        for prop in schema.containment {
            let ids: Vec<ConceptId> = containment_entries(parent, prop)
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            if !ids.is_empty() {
                pending.push_back((prop.target, ids, ctx));
            }
        }
        Ok(())
    }

    fn load(&self, concept_type: Option<ConceptType>, ids: &[ConceptId]) -> ExResult<Vec<Concept>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = match self.options.mode {
            ReadMode::Live => self.store.read(self.partition, concept_type, Some(ids))?,
            ReadMode::Cached => {
                let mut cached = self.store.read_cached(self.partition, ids)?;
                if let Some(t) = concept_type {
                    cached.retain(|c| c.concept_type == t);
                }
                cached
            }
        };
        let mut by_id: HashMap<ConceptId, Concept> = found.into_iter().map(|c| (c.id, c)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    fn container_context(&self, concept: &Concept) -> ExResult<SecurityContext> {
        let container = match concept.container {
            Some(id) => self.store.get(self.partition, id)?,
            None => None,
        };
        Ok(SecurityContext::for_container(
            self.gate,
            self.actor,
            self.partition,
            container.as_ref(),
        ))
    }

    fn admit(&self, concept: &Concept, security: &SecurityContext) -> bool {
        if self.options.exclude_soft_deleted && concept.is_soft_deleted() {
            return false;
        }
        if self.gate.can_read(self.actor, concept, self.partition, security) {
            return true;
        }
        tracing::debug!(
            component = module_path!(),
            event = EVENT_READ_DENIED,
            partition = %self.partition,
            concept_id = %concept.id,
            concept_type = %concept.concept_type,
            actor = %self.actor.id,
        );
        false
    }
}
