#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Shallow and deep reads, permission filtering, and cached reads.

mod common;

use common::*;
use conceptx_core::permission::{
    AccessRight, PermissionGate, Role, RoleBasedPermissionGate, SecurityContext,
};
use conceptx_core::{
    Actor, Concept, ConceptType, Operation, OperationKind, Partition, PropertyValue, ReadOptions,
};
use proptest::prelude::*;
use uuid::Uuid;

fn populated_library(p: &mut Processor, actor: &Actor) -> (SiteFixture, Vec<Concept>) {
    let site = seed_site(p, actor);
    let unit = Concept::new(ConceptType::SimpleUnit).contained_by(site.library);
    let unit_alias = Concept::new(ConceptType::Alias).contained_by(unit.id);
    let kind = Concept::new(ConceptType::SimpleQuantityKind)
        .contained_by(site.library)
        .with_property(
            conceptx_core::schema::props::DEFAULT_UNIT,
            PropertyValue::Ref(unit.id),
        );
    let created = vec![unit.clone(), unit_alias.clone(), kind.clone()];
    submit(
        p,
        actor,
        Partition::site_directory(),
        vec![
            Operation::create(unit),
            Operation::create(unit_alias),
            Operation::create(kind),
        ],
    );
    (site, created)
}

#[test]
fn test_get_deep_is_idempotent() {
    let mut p = new_processor();
    let actor = admin();
    let (site, _) = populated_library(&mut p, &actor);
    let sd = Partition::site_directory();

    let first = p
        .get_deep(&actor, &sd, &[site.directory], ReadOptions::default())
        .unwrap();
    let second = p
        .get_deep(&actor, &sd, &[site.directory], ReadOptions::default())
        .unwrap();

    assert_eq!(first, second);
    // directory, library, setup, unit, alias, quantity kind
    assert_eq!(first.len(), 6);
}

#[test]
fn test_get_deep_returns_each_concept_once() {
    let mut p = new_processor();
    let actor = admin();
    let (site, created) = populated_library(&mut p, &actor);
    let sd = Partition::site_directory();

    let found = p
        .get_deep(
            &actor,
            &sd,
            &[site.library, created[0].id, site.library],
            ReadOptions::default(),
        )
        .unwrap();
    let mut ids: Vec<_> = found.iter().map(|c| c.id).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert_eq!(total, 4);
}

#[test]
fn test_excluded_actor_sees_nothing_below_exclusion() {
    let mut p = new_processor();
    let actor = admin();
    let (site, created) = populated_library(&mut p, &actor);
    let sd = Partition::site_directory();
    let reader = Actor::new("reader");

    let mut unit = fetch(&mut p, &sd, created[0].id).unwrap();
    unit.access_override.excluded_actors.insert(reader.id);
    submit(&mut p, &actor, sd.clone(), vec![Operation::update(unit)]);

    let visible = p
        .get_deep(&reader, &sd, &[site.library], ReadOptions::default())
        .unwrap();
    let types: Vec<_> = visible.iter().map(|c| c.concept_type).collect();
    assert_eq!(
        types,
        vec![
            ConceptType::SiteReferenceDataLibrary,
            ConceptType::SimpleQuantityKind
        ]
    );

    let shallow = p
        .get_shallow(&reader, &sd, &[created[0].id], ReadOptions::default())
        .unwrap();
    assert!(shallow.is_empty());
    assert!(p.history(&reader, &sd, created[0].id).unwrap().is_empty());
}

#[test]
fn test_non_participant_cannot_read_model() {
    let mut p = new_processor();
    let actor = admin();
    let site = seed_site(&mut p, &actor);
    let outsider = Actor::new("outsider");
    let member = Actor::new("member").participating_in(&site.model);

    let hidden = p
        .get_shallow(&outsider, &site.model, &[site.model_root], ReadOptions::default())
        .unwrap();
    assert!(hidden.is_empty());
    let shown = p
        .get_shallow(&member, &site.model, &[site.model_root], ReadOptions::default())
        .unwrap();
    assert_eq!(shown.len(), 1);
}

#[test]
fn test_cached_reads_match_committed_state() {
    let mut p = new_processor();
    let actor = admin();
    let (site, created) = populated_library(&mut p, &actor);
    let sd = Partition::site_directory();
    let ids = [site.library, created[0].id, created[2].id];

    let live = p
        .get_shallow(&actor, &sd, &ids, ReadOptions::default())
        .unwrap();
    let cached = p
        .get_shallow(&actor, &sd, &ids, ReadOptions::cached())
        .unwrap();
    assert_eq!(live, cached);
}

fn right_strategy() -> impl Strategy<Value = AccessRight> {
    prop_oneof![
        Just(AccessRight::None),
        Just(AccessRight::Read),
        Just(AccessRight::Modify),
        Just(AccessRight::ModifyIfOwner),
        Just(AccessRight::SameAsContainer),
    ]
}

proptest! {
    /// Adding exclusions never makes a concept readable or writable
    #[test]
    fn prop_exclusions_only_narrow_access(
        right in right_strategy(),
        is_admin in any::<bool>(),
        container_read in any::<bool>(),
        exclude_actor in any::<bool>(),
        exclude_domain in any::<bool>(),
        canonical in any::<bool>(),
    ) {
        let gate = RoleBasedPermissionGate::default();
        let partition = if canonical {
            Partition::engineering_model(Uuid::new_v4())
        } else {
            Partition::site_directory()
        };
        let mut role = Role::default();
        role.person_rights.insert(ConceptType::Alias, right);
        role.participant_rights.insert(ConceptType::Alias, right);
        let domain = Uuid::new_v4();
        let mut actor = Actor::new("subject")
            .with_role(role)
            .with_active_domain(domain)
            .participating_in(&partition);
        actor.is_admin = is_admin;
        let ctx = SecurityContext {
            container_read_allowed: container_read,
            container_write_allowed: container_read,
        };

        let open = Concept::new(ConceptType::Alias);
        let mut narrowed = open.clone();
        if exclude_actor {
            narrowed.access_override.excluded_actors.insert(actor.id);
        }
        if exclude_domain {
            narrowed.access_override.excluded_domains.insert(domain);
        }

        if gate.can_read(&actor, &narrowed, &partition, &ctx) {
            prop_assert!(gate.can_read(&actor, &open, &partition, &ctx));
        }
        if gate.can_write(&actor, &narrowed, OperationKind::Update, &partition, &ctx) {
            prop_assert!(gate.can_write(&actor, &open, OperationKind::Update, &partition, &ctx));
        }
        if exclude_actor || exclude_domain {
            prop_assert!(!gate.can_read(&actor, &narrowed, &partition, &ctx));
        }
    }
}
