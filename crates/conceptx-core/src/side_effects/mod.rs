//! Side-Effect Engine
//!
//! Per-type hooks run around each persistence call. A hook may veto by
//! returning an error, mutate the concept in a before-phase, redirect the
//! operation through a `HookDirective`, or return cascades which the
//! processor feeds back through the same pipeline after the current
//! operation. Hooks read through the transaction but never write or commit.

pub mod engineering_model_setup;
pub mod iteration_setup;

pub use engineering_model_setup::EngineeringModelSetupSideEffect;
pub use iteration_setup::IterationSetupSideEffect;

use crate::errors::{ConceptXError, ExResult};
use crate::model::{Concept, ConceptId, Partition};
use crate::operations::Cascade;
use crate::permission::{Actor, SecurityContext};
use crate::schema::ConceptType;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookPhase {
    pub fn is_before(&self) -> bool {
        matches!(
            self,
            HookPhase::BeforeCreate | HookPhase::BeforeUpdate | HookPhase::BeforeDelete
        )
    }
}

/// What the processor does with the operation after the before-phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum HookDirective {
    #[default]
    Proceed,
    /// Persist the (mutated) concept as an update instead of deleting it
    ConvertToUpdate,
    /// Treat the operation as handled; nothing is persisted
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideEffectOutcome {
    pub directive: HookDirective,
    pub cascades: Vec<Cascade>,
}

impl SideEffectOutcome {
    pub fn proceed() -> Self {
        Self::default()
    }

    pub fn skip() -> Self {
        Self {
            directive: HookDirective::Skip,
            cascades: Vec::new(),
        }
    }

    pub fn convert_to_update() -> Self {
        Self {
            directive: HookDirective::ConvertToUpdate,
            cascades: Vec::new(),
        }
    }

    pub fn with_cascade(mut self, cascade: Cascade) -> Self {
        self.cascades.push(cascade);
        self
    }

    /// Combine with a later hook's outcome: the strongest directive wins,
    /// cascades keep hook order.
    fn merge(&mut self, other: SideEffectOutcome) {
        self.directive = self.directive.max(other.directive);
        self.cascades.extend(other.cascades);
    }
}

/// Read access hooks get into the running transaction
pub trait ConceptReader {
    fn get(&self, partition: &Partition, id: ConceptId) -> ExResult<Option<Concept>>;
}

/// Everything a hook may consult besides the concept itself
pub struct HookContext<'a> {
    pub partition: &'a Partition,
    pub actor: &'a Actor,
    pub transaction_time: DateTime<Utc>,
    pub security: &'a SecurityContext,
    reader: &'a dyn ConceptReader,
}

impl<'a> HookContext<'a> {
    pub fn new(
        partition: &'a Partition,
        actor: &'a Actor,
        transaction_time: DateTime<Utc>,
        security: &'a SecurityContext,
        reader: &'a dyn ConceptReader,
    ) -> Self {
        Self {
            partition,
            actor,
            transaction_time,
            security,
            reader,
        }
    }

    /// Copy of the concept as the transaction currently sees it
    pub fn get(&self, partition: &Partition, id: ConceptId) -> ExResult<Option<Concept>> {
        self.reader.get(partition, id)
    }

    /// Copies of `ids` in the hook's own partition, skipping missing ones
    pub fn get_local(&self, ids: &[ConceptId]) -> ExResult<Vec<Concept>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(c) = self.reader.get(self.partition, *id)? {
                found.push(c);
            }
        }
        Ok(found)
    }
}

/// Hook set for one concept type; every phase defaults to a no-op
#[allow(unused_variables)]
pub trait SideEffect: Send + Sync {
    fn before_create(
        &self,
        concept: &mut Concept,
        container: Option<&Concept>,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        Ok(SideEffectOutcome::proceed())
    }

    fn after_create(
        &self,
        concept: &Concept,
        container: Option<&Concept>,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        Ok(SideEffectOutcome::proceed())
    }

    fn before_update(
        &self,
        concept: &mut Concept,
        container: Option<&Concept>,
        original: &Concept,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        Ok(SideEffectOutcome::proceed())
    }

    fn after_update(
        &self,
        concept: &Concept,
        container: Option<&Concept>,
        original: &Concept,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        Ok(SideEffectOutcome::proceed())
    }

    fn before_delete(
        &self,
        concept: &mut Concept,
        container: Option<&Concept>,
        original: &Concept,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        Ok(SideEffectOutcome::proceed())
    }

    fn after_delete(
        &self,
        concept: &Concept,
        container: Option<&Concept>,
        original: &Concept,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        Ok(SideEffectOutcome::proceed())
    }
}

/// Immutable map from concept type to its hooks, in registration order
#[derive(Default, Clone)]
pub struct SideEffectRegistry {
    hooks: HashMap<ConceptType, Vec<Arc<dyn SideEffect>>>,
}

impl SideEffectRegistry {
    pub fn builder() -> SideEffectRegistryBuilder {
        SideEffectRegistryBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_hooks(&self, concept_type: ConceptType) -> bool {
        self.hooks.get(&concept_type).is_some_and(|h| !h.is_empty())
    }

    /// Run every hook registered for the concept's type in `phase`
    ///
    /// `original` is required for update and delete phases.
    ///
    /// # Errors
    ///
    /// The first hook error, unchanged; later hooks do not run.
    pub fn invoke(
        &self,
        phase: HookPhase,
        concept: &mut Concept,
        container: Option<&Concept>,
        original: Option<&Concept>,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        let mut outcome = SideEffectOutcome::proceed();
        let Some(hooks) = self.hooks.get(&concept.concept_type) else {
            return Ok(outcome);
        };
        let needs_original = || {
            original.ok_or_else(|| ConceptXError::Internal {
                message: format!("{:?} invoked without the original state", phase),
            })
        };

        for hook in hooks {
            let next = match phase {
                HookPhase::BeforeCreate => hook.before_create(concept, container, ctx)?,
                HookPhase::AfterCreate => hook.after_create(concept, container, ctx)?,
                HookPhase::BeforeUpdate => {
                    hook.before_update(concept, container, needs_original()?, ctx)?
                }
                HookPhase::AfterUpdate => {
                    hook.after_update(concept, container, needs_original()?, ctx)?
                }
                HookPhase::BeforeDelete => {
                    hook.before_delete(concept, container, needs_original()?, ctx)?
                }
                HookPhase::AfterDelete => {
                    hook.after_delete(concept, container, needs_original()?, ctx)?
                }
            };
            outcome.merge(next);
        }

        if !phase.is_before() {
            outcome.directive = HookDirective::Proceed;
        }
        Ok(outcome)
    }
}

#[derive(Default)]
pub struct SideEffectRegistryBuilder {
    hooks: HashMap<ConceptType, Vec<Arc<dyn SideEffect>>>,
}

impl SideEffectRegistryBuilder {
    pub fn register(mut self, concept_type: ConceptType, hook: Arc<dyn SideEffect>) -> Self {
        self.hooks.entry(concept_type).or_default().push(hook);
        self
    }

    pub fn build(self) -> SideEffectRegistry {
        SideEffectRegistry { hooks: self.hooks }
    }
}

/// Registry with the built-in engineering-model lifecycle hooks
pub fn default_registry() -> SideEffectRegistry {
    SideEffectRegistry::builder()
        .register(
            ConceptType::EngineeringModelSetup,
            Arc::new(EngineeringModelSetupSideEffect),
        )
        .register(ConceptType::IterationSetup, Arc::new(IterationSetupSideEffect))
        .build()
}
