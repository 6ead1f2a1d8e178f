#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use conceptx_core::{
    AsOf, BatchRequest, Concept, ConceptId, ConceptType, Operation, Partition, PropertyValue,
};
use proptest::prelude::*;

fn alias_under(container: ConceptId, n: usize) -> Concept {
    Concept::new(ConceptType::Alias)
        .contained_by(container)
        .with_property("content", PropertyValue::Int(n as i64))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Committed batches take consecutive revisions; rejected ones take none
    #[test]
    fn prop_revisions_strictly_increase(
        batches in prop::collection::vec((1usize..4, any::<bool>()), 1..8)
    ) {
        let mut p = new_processor();
        let actor = admin();
        let site = seed_site(&mut p, &actor);
        let sd = Partition::site_directory();
        let mut last = p
            .history(&actor, &sd, site.library)
            .unwrap()
            .last()
            .map(|r| r.revision)
            .unwrap();

        for (size, poisoned) in batches {
            let mut operations: Vec<Operation> = (0..size)
                .map(|n| Operation::create(alias_under(site.library, n)))
                .collect();
            if poisoned {
                operations.push(Operation::create(alias_under(ConceptId::new(), size)));
            }
            let result = p.process(BatchRequest::new(actor.clone(), sd.clone(), operations));
            match result {
                Ok(outcome) => {
                    prop_assert!(!poisoned);
                    let revision = outcome.revision.unwrap();
                    prop_assert_eq!(revision, last + 1);
                    prop_assert!(outcome.concepts.iter().all(|c| c.revision_number == revision));
                    last = revision;
                }
                Err(failure) => {
                    prop_assert!(poisoned);
                    prop_assert_eq!(failure.index, Some(size));
                }
            }
        }
    }
}

#[test]
fn test_as_of_reads_follow_revisions() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();

    let alias = alias_under(site.library, 1);
    let alias_id = alias.id;
    let created = submit(&mut p, &actor, sd.clone(), vec![Operation::create(alias)])
        .revision
        .unwrap();

    let mut edited = fetch(&mut p, &sd, alias_id).unwrap();
    edited.set_property("content", PropertyValue::Int(2));
    let updated = submit(&mut p, &actor, sd.clone(), vec![Operation::update(edited)])
        .revision
        .unwrap();

    let removed = submit(
        &mut p,
        &actor,
        sd.clone(),
        vec![Operation::delete(alias_id, ConceptType::Alias)],
    )
    .revision
    .unwrap();

    let at = |p: &mut Processor, revision: u64| {
        p.resolve_as_of(&actor, &sd, &[alias_id], AsOf::Revision(revision))
            .unwrap()
    };
    assert!(at(&mut p, created - 1).is_empty());
    assert_eq!(
        at(&mut p, created)[0].property("content"),
        Some(&PropertyValue::Int(1))
    );
    assert_eq!(
        at(&mut p, updated)[0].property("content"),
        Some(&PropertyValue::Int(2))
    );
    assert!(at(&mut p, removed).is_empty());

    let history = p.history(&actor, &sd, alias_id).unwrap();
    let revisions: Vec<u64> = history.iter().map(|r| r.revision).collect();
    assert_eq!(revisions, vec![created, updated, removed]);
    assert!(history.last().unwrap().state.is_none());
}

#[test]
fn test_as_of_instant_matches_commit_time() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let sd = Partition::site_directory();
    let library_history = p.history(&actor, &sd, site.library).unwrap();
    let committed_at = library_history[0].committed_at;

    let found = p
        .resolve_as_of(&actor, &sd, &[site.library], AsOf::Instant(committed_at))
        .unwrap();
    assert_eq!(found.len(), 1);

    let before = committed_at - chrono::Duration::milliseconds(1);
    let found = p
        .resolve_as_of(&actor, &sd, &[site.library], AsOf::Instant(before))
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_cross_partition_cascade_gets_its_own_revision() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);

    let setup = Concept::new(ConceptType::IterationSetup).contained_by(site.setup);
    let outcome = submit(
        &mut p,
        &actor,
        Partition::site_directory(),
        vec![Operation::create(setup)],
    );

    assert_eq!(outcome.revisions.len(), 2);
    assert_eq!(
        outcome.revisions.get(Partition::site_directory().name()).copied(),
        outcome.revision
    );
    // the model root was created at revision 1 of its own partition
    assert_eq!(outcome.revisions.get(site.model.name()).copied(), Some(2));
}
