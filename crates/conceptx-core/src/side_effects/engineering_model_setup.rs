//! Engineering-model-setup lifecycle
//!
//! A setup in the site directory owns one engineering model partition whose
//! root is created and removed together with the setup.

use super::iteration_setup::{is_frozen, model_partition};
use super::{HookContext, SideEffect, SideEffectOutcome};
use crate::errors::{ConceptXError, ExResult};
use crate::model::{Concept, ConceptId, PropertyValue};
use crate::operations::{Cascade, Operation};
use crate::schema::{props, ConceptType};

pub struct EngineeringModelSetupSideEffect;

impl SideEffect for EngineeringModelSetupSideEffect {
    fn before_create(
        &self,
        concept: &mut Concept,
        _container: Option<&Concept>,
        _ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        if concept.ref_property(props::ENGINEERING_MODEL_IID).is_none() {
            concept.set_property(
                props::ENGINEERING_MODEL_IID,
                PropertyValue::Ref(ConceptId::new()),
            );
        }
        concept.set_property(props::ACTIVE_ITERATION_SETUP, PropertyValue::Null);
        Ok(SideEffectOutcome::proceed())
    }

    fn after_create(
        &self,
        concept: &Concept,
        _container: Option<&Concept>,
        _ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        let (model, model_root) = model_partition(concept)?;
        let root = Concept::with_id(model_root, ConceptType::EngineeringModel).with_property(
            props::ENGINEERING_MODEL_SETUP,
            PropertyValue::Ref(concept.id),
        );
        Ok(SideEffectOutcome::proceed()
            .with_cascade(Cascade::in_partition(model, Operation::create(root))))
    }

    fn before_update(
        &self,
        concept: &mut Concept,
        _container: Option<&Concept>,
        original: &Concept,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        let invalid = |property: &str, reason: &str| ConceptXError::InvalidProperty {
            concept_id: concept.id.to_string(),
            property: property.to_string(),
            reason: reason.to_string(),
        };

        if concept.ref_property(props::ENGINEERING_MODEL_IID)
            != original.ref_property(props::ENGINEERING_MODEL_IID)
        {
            return Err(
                invalid(props::ENGINEERING_MODEL_IID, "the model of a setup is fixed").into(),
            );
        }

        let active = concept.ref_property(props::ACTIVE_ITERATION_SETUP);
        if active != original.ref_property(props::ACTIVE_ITERATION_SETUP) {
            if let Some(active) = active {
                let selected = ctx.get_local(&[active])?;
                if selected.iter().any(is_frozen) {
                    return Err(invalid(
                        props::ACTIVE_ITERATION_SETUP,
                        "a frozen iteration setup cannot become current",
                    )
                    .into());
                }
            }
        }
        Ok(SideEffectOutcome::proceed())
    }

    fn after_delete(
        &self,
        _concept: &Concept,
        _container: Option<&Concept>,
        original: &Concept,
        ctx: &HookContext<'_>,
    ) -> ExResult<SideEffectOutcome> {
        let (model, model_root) = model_partition(original)?;
        if ctx.get(&model, model_root)?.is_none() {
            return Ok(SideEffectOutcome::proceed());
        }
        Ok(SideEffectOutcome::proceed().with_cascade(Cascade::in_partition(
            model,
            Operation::delete(model_root, ConceptType::EngineeringModel),
        )))
    }
}
