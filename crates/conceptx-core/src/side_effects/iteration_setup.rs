//! Iteration-setup lifecycle
//!
//! An iteration setup is Active when created, becomes Frozen when a newer
//! sibling is created, and may then only be soft-deleted. The setup named by
//! its container's `active_iteration_setup` is the current one and cannot be
//! deleted. Each setup owns an `Iteration` in the engineering model partition.

use super::{HookContext, SideEffect, SideEffectOutcome};
use crate::errors::{ConceptXError, ExResult};
use crate::model::{Concept, ConceptId, Partition, PropertyValue};
use crate::operations::{Cascade, Operation};
use crate::schema::{containment_entries, props, ConceptType};

pub const RULE_CURRENT_ITERATION_SETUP: &str = "current_iteration_setup";

pub struct IterationSetupSideEffect;

pub fn is_frozen(setup: &Concept) -> bool {
    setup
        .property(props::FROZEN_ON)
        .and_then(PropertyValue::as_timestamp)
        .is_some()
}

pub fn is_current(setup_id: ConceptId, container: Option<&Concept>) -> bool {
    container.and_then(|c| c.ref_property(props::ACTIVE_ITERATION_SETUP)) == Some(setup_id)
}

fn iteration_number(setup: &Concept) -> i64 {
    setup
        .property(props::ITERATION_NUMBER)
        .and_then(PropertyValue::as_int)
        .unwrap_or(0)
}

fn require_container<'c>(setup: &Concept, container: Option<&'c Concept>) -> ExResult<&'c Concept> {
    container.ok_or_else(|| {
        ConceptXError::MissingContainer {
            concept_id: setup.id.to_string(),
            concept_type: setup.concept_type.to_string(),
        }
        .into()
    })
}

/// Canonical partition of the model an engineering model setup describes
pub(crate) fn model_partition(model_setup: &Concept) -> ExResult<(Partition, ConceptId)> {
    let model_id = model_setup
        .ref_property(props::ENGINEERING_MODEL_IID)
        .ok_or_else(|| ConceptXError::InvalidProperty {
            concept_id: model_setup.id.to_string(),
            property: props::ENGINEERING_MODEL_IID.to_string(),
            reason: "engineering model setup has no model".to_string(),
        })?;
    Ok((Partition::engineering_model(model_id.as_uuid()), model_id))
}

fn siblings(setup: &Concept, container: &Concept, ctx: &HookContext<'_>) -> ExResult<Vec<Concept>> {
    let ids: Vec<ConceptId> = container
        .property(props::ITERATION_SETUP)
        .map(PropertyValue::referenced_ids)
        .unwrap_or_default()
        .into_iter()
        .filter(|id| *id != setup.id)
        .collect();
    ctx.get_local(&ids)
}

/// Queue fresh-id copies of everything contained by `source`, parents first
fn copy_contained(
    ctx: &HookContext<'_>,
    partition: &Partition,
    source: &Concept,
    new_parent: ConceptId,
    cascades: &mut Vec<Cascade>,
) -> ExResult<()> {
    for prop in source.concept_type.schema().containment {
        for (child_id, key) in containment_entries(source, prop) {
            let Some(child) = ctx.get(partition, child_id)? else {
                continue;
            };
            let mut copy = child.clone();
            copy.id = ConceptId::new();
            copy.container = Some(new_parent);
            copy.revision_number = 0;
            copy.clear_containment();
            let copy_id = copy.id;
            let operation = match key {
                Some(k) => Operation::create_ordered(copy, k),
                None => Operation::create(copy),
            };
            cascades.push(Cascade::in_partition(partition.clone(), operation));
            copy_contained(ctx, partition, &child, copy_id, cascades)?;
        }
    }
    Ok(())
}

impl SideEffect for IterationSetupSideEffect {
    fn before_create(
        &self,
        concept: &mut Concept,
        container: Option<&Concept>,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        let container = require_container(concept, container)?;
        let prior = siblings(concept, container, ctx)?;

        if concept.ref_property(props::ITERATION_IID).is_none() {
            concept.set_property(props::ITERATION_IID, PropertyValue::Ref(ConceptId::new()));
        }
        let next_number = prior.iter().map(iteration_number).max().unwrap_or(0) + 1;
        concept.set_property(props::ITERATION_NUMBER, PropertyValue::Int(next_number));
        concept.set_property(props::IS_DELETED, PropertyValue::Bool(false));
        concept.set_property(props::FROZEN_ON, PropertyValue::Null);
        let source = prior
            .iter()
            .max_by_key(|s| iteration_number(s))
            .map_or(PropertyValue::Null, |s| PropertyValue::Ref(s.id));
        concept.set_property(props::SOURCE_ITERATION_SETUP, source);

        Ok(SideEffectOutcome::proceed())
    }

    fn after_create(
        &self,
        concept: &Concept,
        container: Option<&Concept>,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        let container = require_container(concept, container)?;
        let (model, model_root) = model_partition(container)?;
        let prior = siblings(concept, container, ctx)?;

        // The selection moves before anything is frozen, so the current setup
        // is never observed frozen.
        let mut selection = container.clone();
        selection.set_property(
            props::ACTIVE_ITERATION_SETUP,
            PropertyValue::Ref(concept.id),
        );
        let mut outcome =
            SideEffectOutcome::proceed().with_cascade(Cascade::local(Operation::update(selection)));

        for sibling in prior.iter().filter(|s| !is_frozen(s) && !s.is_soft_deleted()) {
            let mut frozen = sibling.clone();
            frozen.set_property(
                props::FROZEN_ON,
                PropertyValue::Timestamp(ctx.transaction_time),
            );
            outcome = outcome.with_cascade(Cascade::local(Operation::update(frozen)));
        }

        let iteration_id = concept.ref_property(props::ITERATION_IID).ok_or_else(|| {
            ConceptXError::InvalidProperty {
                concept_id: concept.id.to_string(),
                property: props::ITERATION_IID.to_string(),
                reason: "missing after creation".to_string(),
            }
        })?;
        let previous = match concept.ref_property(props::SOURCE_ITERATION_SETUP) {
            Some(source_id) => match prior.iter().find(|s| s.id == source_id) {
                Some(source) => match source.ref_property(props::ITERATION_IID) {
                    Some(previous_id) => ctx.get(&model, previous_id)?,
                    None => None,
                },
                None => None,
            },
            None => None,
        };

        let mut iteration = match &previous {
            Some(p) => p.clone(),
            None => Concept::new(ConceptType::Iteration),
        };
        iteration.id = iteration_id;
        iteration.container = Some(model_root);
        iteration.revision_number = 0;
        iteration.clear_containment();
        iteration.set_property(props::ITERATION_SETUP, PropertyValue::Ref(concept.id));
        outcome = outcome.with_cascade(Cascade::in_partition(
            model.clone(),
            Operation::create(iteration),
        ));

        if let Some(previous) = previous {
            copy_contained(ctx, &model, &previous, iteration_id, &mut outcome.cascades)?;
        }

        Ok(outcome)
    }

    fn before_update(
        &self,
        concept: &mut Concept,
        container: Option<&Concept>,
        original: &Concept,
        _ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        let invalid = |property: &str, reason: &str| -> ExResult<SideEffectOutcome> {
            Err(ConceptXError::InvalidProperty {
                concept_id: concept.id.to_string(),
                property: property.to_string(),
                reason: reason.to_string(),
            }
            .into())
        };
        for fixed in [
            props::ITERATION_IID,
            props::ITERATION_NUMBER,
            props::SOURCE_ITERATION_SETUP,
        ] {
            if concept.property(fixed) != original.property(fixed) {
                return invalid(fixed, "assigned when the iteration setup is created");
            }
        }
        if is_frozen(concept) && is_current(concept.id, container) {
            return invalid(props::FROZEN_ON, "the current iteration setup cannot be frozen");
        }
        if is_frozen(original) && !is_frozen(concept) {
            return invalid(props::FROZEN_ON, "a frozen iteration setup stays frozen");
        }
        if concept.is_soft_deleted() != original.is_soft_deleted() {
            return invalid(props::IS_DELETED, "only deletion of a frozen setup marks it deleted");
        }
        Ok(SideEffectOutcome::proceed())
    }

    fn before_delete(
        &self,
        concept: &mut Concept,
        container: Option<&Concept>,
        _original: &Concept,
        _ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        match (is_current(concept.id, container), is_frozen(concept)) {
            // Never produced by the pipeline; refuse rather than pick a branch
            (true, true) => Err(ConceptXError::InvalidProperty {
                concept_id: concept.id.to_string(),
                property: props::FROZEN_ON.to_string(),
                reason: "iteration setup is both current and frozen".to_string(),
            }
            .into()),
            (true, false) => Err(ConceptXError::LifecycleVeto {
                rule: RULE_CURRENT_ITERATION_SETUP.to_string(),
                concept_id: concept.id.to_string(),
                operation: "delete".to_string(),
                reason: "it is the active iteration setup of its model".to_string(),
            }
            .into()),
            (false, true) if concept.is_soft_deleted() => Ok(SideEffectOutcome::skip()),
            (false, true) => {
                concept.set_property(props::IS_DELETED, PropertyValue::Bool(true));
                Ok(SideEffectOutcome::convert_to_update())
            }
            (false, false) => Ok(SideEffectOutcome::proceed()),
        }
    }

    fn after_delete(
        &self,
        _concept: &Concept,
        container: Option<&Concept>,
        original: &Concept,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        // Soft-deleted setups keep their iteration
        if is_frozen(original) {
            return Ok(SideEffectOutcome::proceed());
        }
        let (Some(container), Some(iteration_id)) =
            (container, original.ref_property(props::ITERATION_IID))
        else {
            return Ok(SideEffectOutcome::proceed());
        };
        let (model, _) = model_partition(container)?;
        if ctx.get(&model, iteration_id)?.is_none() {
            return Ok(SideEffectOutcome::proceed());
        }
        Ok(SideEffectOutcome::proceed().with_cascade(Cascade::in_partition(
            model,
            Operation::delete(iteration_id, ConceptType::Iteration),
        )))
    }
}
