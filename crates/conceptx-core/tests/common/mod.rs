use conceptx_core::schema::props;
use conceptx_core::{
    default_registry, Actor, BatchOutcome, BatchRequest, Concept, ConceptId, ConceptType,
    MemoryStore, Operation, OperationProcessor, Partition, PropertyValue, ReadOptions,
    RevisionManager, RoleBasedPermissionGate,
};
use std::sync::Arc;

pub type Processor = OperationProcessor<MemoryStore>;

/// Processor over an empty in-memory store with the built-in hooks
#[allow(dead_code)]
pub fn new_processor() -> Processor {
    OperationProcessor::new(
        MemoryStore::new(),
        RevisionManager::new(),
        Arc::new(RoleBasedPermissionGate::default()),
        Arc::new(default_registry()),
    )
}

#[allow(dead_code)]
pub fn admin() -> Actor {
    Actor::admin("site admin")
}

/// A site directory holding one engineering model setup and its model root
#[allow(dead_code)]
pub struct SiteFixture {
    pub directory: ConceptId,
    pub library: ConceptId,
    pub setup: ConceptId,
    pub model: Partition,
    pub model_root: ConceptId,
}

#[allow(dead_code)]
pub fn seed_site(processor: &mut Processor, actor: &Actor) -> SiteFixture {
    let directory = Concept::new(ConceptType::SiteDirectory);
    let library = Concept::new(ConceptType::SiteReferenceDataLibrary).contained_by(directory.id);
    let setup = Concept::new(ConceptType::EngineeringModelSetup).contained_by(directory.id);
    let (directory_id, library_id, setup_id) = (directory.id, library.id, setup.id);

    let outcome = submit(
        processor,
        actor,
        Partition::site_directory(),
        vec![
            Operation::create(directory),
            Operation::create(library),
            Operation::create(setup),
        ],
    );
    let model_root = outcome
        .concept(setup_id)
        .and_then(|s| s.ref_property(props::ENGINEERING_MODEL_IID))
        .expect("setup should carry its model id");

    SiteFixture {
        directory: directory_id,
        library: library_id,
        setup: setup_id,
        model: Partition::engineering_model(model_root.as_uuid()),
        model_root,
    }
}

/// Create one more iteration setup under the fixture's model setup
#[allow(dead_code)]
pub fn add_iteration_setup(
    processor: &mut Processor,
    actor: &Actor,
    site: &SiteFixture,
) -> ConceptId {
    let setup = Concept::new(ConceptType::IterationSetup).contained_by(site.setup);
    let id = setup.id;
    submit(
        processor,
        actor,
        Partition::site_directory(),
        vec![Operation::create(setup)],
    );
    id
}

#[allow(dead_code)]
pub fn submit(
    processor: &mut Processor,
    actor: &Actor,
    partition: Partition,
    operations: Vec<Operation>,
) -> BatchOutcome {
    processor
        .process(BatchRequest::new(actor.clone(), partition, operations))
        .expect("batch should commit")
}

/// Current state as an admin sees it
#[allow(dead_code)]
pub fn fetch(processor: &mut Processor, partition: &Partition, id: ConceptId) -> Option<Concept> {
    processor
        .get_shallow(&admin(), partition, &[id], ReadOptions::default())
        .expect("read should succeed")
        .into_iter()
        .next()
}

#[allow(dead_code)]
pub fn is_frozen(concept: &Concept) -> bool {
    concept
        .property(props::FROZEN_ON)
        .and_then(PropertyValue::as_timestamp)
        .is_some()
}

#[allow(dead_code)]
pub fn refs(concept: &Concept, property: &str) -> Vec<ConceptId> {
    concept
        .property(property)
        .map(PropertyValue::referenced_ids)
        .unwrap_or_default()
}
