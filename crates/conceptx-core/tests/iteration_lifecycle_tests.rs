#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Iteration-setup lifecycle: Active -> Frozen -> (soft) Deleted, driven
//! entirely through batches.

mod common;

use chrono::Utc;
use common::*;
use conceptx_core::schema::props;
use conceptx_core::side_effects::iteration_setup::RULE_CURRENT_ITERATION_SETUP;
use conceptx_core::{
    BatchRequest, Concept, ConceptType, ExErrorKind, Operation, Partition, PropertyValue,
    ReadOptions,
};

fn delete_setup(id: conceptx_core::ConceptId) -> Vec<Operation> {
    vec![Operation::delete(id, ConceptType::IterationSetup)]
}

#[test]
fn test_first_iteration_setup_becomes_current() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();

    let setup_id = add_iteration_setup(&mut p, &actor, &site);

    let model_setup = fetch(&mut p, &sd, site.setup).unwrap();
    assert_eq!(
        model_setup.ref_property(props::ACTIVE_ITERATION_SETUP),
        Some(setup_id)
    );
    assert_eq!(refs(&model_setup, props::ITERATION_SETUP), vec![setup_id]);

    let setup = fetch(&mut p, &sd, setup_id).unwrap();
    assert_eq!(
        setup.property(props::ITERATION_NUMBER),
        Some(&PropertyValue::Int(1))
    );
    assert!(!is_frozen(&setup));
    assert!(!setup.is_soft_deleted());
    assert_eq!(
        setup.property(props::SOURCE_ITERATION_SETUP),
        Some(&PropertyValue::Null)
    );

    let iteration_id = setup.ref_property(props::ITERATION_IID).unwrap();
    let iteration = fetch(&mut p, &site.model, iteration_id).unwrap();
    assert_eq!(iteration.container, Some(site.model_root));
    assert_eq!(iteration.ref_property(props::ITERATION_SETUP), Some(setup_id));

    let root = fetch(&mut p, &site.model, site.model_root).unwrap();
    assert_eq!(refs(&root, props::ITERATION), vec![iteration_id]);
}

#[test]
fn test_new_setup_freezes_prior_and_copies_iteration_forward() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();

    let first = add_iteration_setup(&mut p, &actor, &site);
    let first_iteration = fetch(&mut p, &sd, first)
        .and_then(|s| s.ref_property(props::ITERATION_IID))
        .unwrap();

    let element = Concept::new(ConceptType::ElementDefinition)
        .contained_by(first_iteration)
        .with_property("name", PropertyValue::Text("Battery".into()));
    let early = Concept::new(ConceptType::Definition)
        .contained_by(element.id)
        .with_property("content", PropertyValue::Text("first".into()));
    let late = Concept::new(ConceptType::Definition)
        .contained_by(element.id)
        .with_property("content", PropertyValue::Text("second".into()));
    let element_id = element.id;
    submit(
        &mut p,
        &actor,
        site.model.clone(),
        vec![
            Operation::create(element),
            Operation::create_ordered(late, 20),
            Operation::create_ordered(early, 10),
        ],
    );

    let second = add_iteration_setup(&mut p, &actor, &site);

    let first_state = fetch(&mut p, &sd, first).unwrap();
    assert!(is_frozen(&first_state));
    let second_state = fetch(&mut p, &sd, second).unwrap();
    assert!(!is_frozen(&second_state));
    assert_eq!(
        second_state.ref_property(props::SOURCE_ITERATION_SETUP),
        Some(first)
    );
    assert_eq!(
        second_state.property(props::ITERATION_NUMBER),
        Some(&PropertyValue::Int(2))
    );
    let model_setup = fetch(&mut p, &sd, site.setup).unwrap();
    assert_eq!(
        model_setup.ref_property(props::ACTIVE_ITERATION_SETUP),
        Some(second)
    );

    let second_iteration = second_state.ref_property(props::ITERATION_IID).unwrap();
    let deep = p
        .get_deep(&actor, &site.model, &[second_iteration], ReadOptions::default())
        .unwrap();
    assert_eq!(deep.len(), 4);

    let copy = deep
        .iter()
        .find(|c| c.concept_type == ConceptType::ElementDefinition)
        .unwrap();
    assert_ne!(copy.id, element_id);
    assert_eq!(copy.container, Some(second_iteration));
    assert_eq!(
        copy.property("name"),
        Some(&PropertyValue::Text("Battery".into()))
    );

    let copied_definitions: Vec<(i64, PropertyValue)> = match copy.property(props::DEFINITION) {
        Some(PropertyValue::OrderedRefList(items)) => items
            .iter()
            .map(|item| {
                let definition = deep.iter().find(|c| c.id == item.value).unwrap();
                (item.key, definition.property("content").cloned().unwrap())
            })
            .collect(),
        other => panic!("unexpected definition list {:?}", other),
    };
    assert_eq!(
        copied_definitions,
        vec![
            (10, PropertyValue::Text("first".into())),
            (20, PropertyValue::Text("second".into())),
        ]
    );

    let source_element = fetch(&mut p, &site.model, element_id).unwrap();
    assert_eq!(source_element.container, Some(first_iteration));
}

#[test]
fn test_only_the_current_setup_stays_unfrozen() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();

    let mut ids = Vec::new();
    for number in 1..=4 {
        ids.push(add_iteration_setup(&mut p, &actor, &site));
        let current = fetch(&mut p, &sd, site.setup)
            .and_then(|s| s.ref_property(props::ACTIVE_ITERATION_SETUP))
            .unwrap();
        assert_eq!(Some(&current), ids.last());

        for id in &ids {
            let setup = fetch(&mut p, &sd, *id).unwrap();
            assert_eq!(is_frozen(&setup), *id != current);
        }
        let latest = fetch(&mut p, &sd, current).unwrap();
        assert_eq!(
            latest.property(props::ITERATION_NUMBER),
            Some(&PropertyValue::Int(number))
        );
    }
}

#[test]
fn test_deleting_current_setup_is_vetoed() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let current = add_iteration_setup(&mut p, &actor, &site);
    let records_before = p.store().revision_count();

    let failure = p
        .process(BatchRequest::new(actor.clone(), sd.clone(), delete_setup(current)))
        .unwrap_err();

    assert_eq!(failure.kind, ExErrorKind::LifecycleVeto);
    assert_eq!(failure.index, Some(0));
    assert_eq!(failure.error.rule(), Some(RULE_CURRENT_ITERATION_SETUP));
    assert_eq!(p.store().revision_count(), records_before);
    assert!(fetch(&mut p, &sd, current).is_some());
}

#[test]
fn test_deleting_frozen_setup_soft_marks_it() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let frozen = add_iteration_setup(&mut p, &actor, &site);
    add_iteration_setup(&mut p, &actor, &site);
    let iteration = fetch(&mut p, &sd, frozen)
        .and_then(|s| s.ref_property(props::ITERATION_IID))
        .unwrap();

    let outcome = submit(&mut p, &actor, sd.clone(), delete_setup(frozen));
    assert!(outcome.removed.is_empty());
    assert!(outcome.concept(frozen).unwrap().is_soft_deleted());
    assert!(outcome.revision.is_some());

    let visible = p
        .get_shallow(&actor, &sd, &[frozen], ReadOptions::default())
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert!(visible[0].is_soft_deleted());

    let filtered = p
        .get_shallow(
            &actor,
            &sd,
            &[frozen],
            ReadOptions::default().excluding_soft_deleted(),
        )
        .unwrap();
    assert!(filtered.is_empty());

    // created, frozen, marked
    let history = p.history(&actor, &sd, frozen).unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| r.state.is_some()));
    assert!(!history[1].state.as_ref().unwrap().is_soft_deleted());

    assert!(fetch(&mut p, &site.model, iteration).is_some());
    let model_setup = fetch(&mut p, &sd, site.setup).unwrap();
    assert!(refs(&model_setup, props::ITERATION_SETUP).contains(&frozen));
}

#[test]
fn test_deleting_soft_deleted_setup_changes_nothing() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let frozen = add_iteration_setup(&mut p, &actor, &site);
    add_iteration_setup(&mut p, &actor, &site);
    submit(&mut p, &actor, sd.clone(), delete_setup(frozen));
    let records_before = p.store().revision_count();

    let outcome = submit(&mut p, &actor, sd.clone(), delete_setup(frozen));

    assert_eq!(outcome.revision, None);
    assert!(outcome.concepts.is_empty());
    assert_eq!(p.store().revision_count(), records_before);
}

#[test]
fn test_current_and_frozen_setup_is_rejected_not_guessed() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let current = add_iteration_setup(&mut p, &actor, &site);

    // Not reachable through the pipeline; placed directly in the store.
    let mut inconsistent = fetch(&mut p, &sd, current).unwrap();
    inconsistent.set_property(props::FROZEN_ON, PropertyValue::Timestamp(Utc::now()));
    p.store_mut().seed(&sd, inconsistent);

    let failure = p
        .process(BatchRequest::new(actor.clone(), sd.clone(), delete_setup(current)))
        .unwrap_err();

    assert_eq!(failure.kind, ExErrorKind::Validation);
    let still_there = fetch(&mut p, &sd, current).unwrap();
    assert!(!still_there.is_soft_deleted());
}

#[test]
fn test_deleting_unfrozen_non_current_setup_removes_its_iteration() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    add_iteration_setup(&mut p, &actor, &site);

    // A stray active setup that is not the current one, seeded with its iteration
    let iteration = Concept::new(ConceptType::Iteration).contained_by(site.model_root);
    let stray = Concept::new(ConceptType::IterationSetup)
        .contained_by(site.setup)
        .with_property(props::ITERATION_IID, PropertyValue::Ref(iteration.id))
        .with_property(props::FROZEN_ON, PropertyValue::Null)
        .with_property(props::IS_DELETED, PropertyValue::Bool(false));
    let (iteration_id, stray_id) = (iteration.id, stray.id);

    let mut model_setup = fetch(&mut p, &sd, site.setup).unwrap();
    let mut listed = refs(&model_setup, props::ITERATION_SETUP);
    listed.push(stray_id);
    model_setup.set_property(props::ITERATION_SETUP, PropertyValue::RefList(listed));
    let mut root = fetch(&mut p, &site.model, site.model_root).unwrap();
    let mut iterations = refs(&root, props::ITERATION);
    iterations.push(iteration_id);
    root.set_property(props::ITERATION, PropertyValue::RefList(iterations));

    let store = p.store_mut();
    store.seed(&sd, model_setup);
    store.seed(&sd, stray);
    store.seed(&site.model, root);
    store.seed(&site.model, iteration);

    let outcome = submit(&mut p, &actor, sd.clone(), delete_setup(stray_id));

    assert!(outcome.removed.contains(&stray_id));
    assert!(outcome.removed.contains(&iteration_id));
    assert!(outcome.revisions.contains_key(site.model.name()));
    assert!(fetch(&mut p, &sd, stray_id).is_none());
    assert!(fetch(&mut p, &site.model, iteration_id).is_none());

    let model_setup = fetch(&mut p, &sd, site.setup).unwrap();
    assert!(!refs(&model_setup, props::ITERATION_SETUP).contains(&stray_id));
    let root = fetch(&mut p, &site.model, site.model_root).unwrap();
    assert!(!refs(&root, props::ITERATION).contains(&iteration_id));
}

#[test]
fn test_freezing_rules_hold_for_direct_updates() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let first = add_iteration_setup(&mut p, &actor, &site);

    let mut freeze_current = fetch(&mut p, &sd, first).unwrap();
    freeze_current.set_property(props::FROZEN_ON, PropertyValue::Timestamp(Utc::now()));
    let failure = p
        .process(BatchRequest::new(
            actor.clone(),
            sd.clone(),
            vec![Operation::update(freeze_current)],
        ))
        .unwrap_err();
    assert_eq!(failure.kind, ExErrorKind::Validation);

    add_iteration_setup(&mut p, &actor, &site);
    let mut thaw = fetch(&mut p, &sd, first).unwrap();
    thaw.set_property(props::FROZEN_ON, PropertyValue::Null);
    let failure = p
        .process(BatchRequest::new(actor.clone(), sd.clone(), vec![Operation::update(thaw)]))
        .unwrap_err();
    assert_eq!(failure.kind, ExErrorKind::Validation);

    let mut reselect = fetch(&mut p, &sd, site.setup).unwrap();
    reselect.set_property(props::ACTIVE_ITERATION_SETUP, PropertyValue::Ref(first));
    let failure = p
        .process(BatchRequest::new(
            actor.clone(),
            sd.clone(),
            vec![Operation::update(reselect)],
        ))
        .unwrap_err();
    assert_eq!(failure.kind, ExErrorKind::Validation);
}

#[test]
fn test_lifecycle_properties_cannot_be_rewritten() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let first = add_iteration_setup(&mut p, &actor, &site);
    let stored = fetch(&mut p, &sd, first).unwrap();
    let iteration_id = stored.ref_property(props::ITERATION_IID).unwrap();

    let element = Concept::new(ConceptType::ElementDefinition).contained_by(iteration_id);
    submit(&mut p, &actor, site.model.clone(), vec![Operation::create(element)]);

    let mut repointed = stored.clone();
    repointed.set_property(
        props::ITERATION_IID,
        PropertyValue::Ref(conceptx_core::ConceptId::new()),
    );
    let mut renumbered = stored.clone();
    renumbered.properties.remove(props::ITERATION_NUMBER);
    let mut resourced = stored.clone();
    resourced.set_property(props::SOURCE_ITERATION_SETUP, PropertyValue::Ref(site.setup));

    for (property, update) in [
        (props::ITERATION_IID, repointed),
        (props::ITERATION_NUMBER, renumbered),
        (props::SOURCE_ITERATION_SETUP, resourced),
    ] {
        let failure = p
            .process(BatchRequest::new(
                actor.clone(),
                sd.clone(),
                vec![Operation::update(update)],
            ))
            .unwrap_err();
        assert_eq!(failure.kind, ExErrorKind::Validation);
        assert_eq!(failure.index, Some(0));
        assert!(failure.error.message().contains(property));
    }
    assert_eq!(fetch(&mut p, &sd, first).unwrap(), stored);

    // The next setup still copies the untouched iteration forward
    let second = add_iteration_setup(&mut p, &actor, &site);
    let second_iteration = fetch(&mut p, &sd, second)
        .and_then(|s| s.ref_property(props::ITERATION_IID))
        .unwrap();
    let copied = p
        .get_deep(
            &actor,
            &site.model,
            &[second_iteration],
            ReadOptions::default(),
        )
        .unwrap();
    assert_eq!(copied.len(), 2);
    assert!(fetch(&mut p, &site.model, iteration_id).is_some());
}

#[test]
fn test_deleting_model_setup_removes_model_root() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let setup = add_iteration_setup(&mut p, &actor, &site);

    let outcome = submit(
        &mut p,
        &actor,
        sd.clone(),
        vec![Operation::delete(site.setup, ConceptType::EngineeringModelSetup)],
    );

    assert!(outcome.removed.contains(&site.setup));
    assert!(outcome.removed.contains(&setup));
    assert!(outcome.removed.contains(&site.model_root));
    assert!(fetch(&mut p, &site.model, site.model_root).is_none());
    let directory = fetch(&mut p, &sd, site.directory).unwrap();
    assert!(refs(&directory, props::MODEL).is_empty());
}
