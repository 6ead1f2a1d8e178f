//! One batch inside one store transaction
//!
//! Every client operation is expanded into a FIFO queue: the operation
//! itself first, then the cascades its hooks return, each run through the
//! same validate / authorize / hook / persist pipeline.

use crate::errors::{ConceptXError, ExResult};
use crate::model::{Concept, ConceptId, OrderedItem, Partition, PropertyValue};
use crate::operations::{BatchOutcome, Cascade, Operation, OperationKind};
use crate::permission::{Actor, PermissionGate, SecurityContext};
use crate::revision::{ChangedConcept, RevisionManager};
use crate::schema::{containment_entries, validate_shape, ConceptType};
use crate::side_effects::{
    ConceptReader, HookContext, HookDirective, HookPhase, SideEffectOutcome, SideEffectRegistry,
};
use crate::store::ConceptStore;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

type Key = (Partition, ConceptId);

pub(crate) struct TransactionContext<'a> {
    store: &'a dyn ConceptStore,
    gate: &'a dyn PermissionGate,
    side_effects: &'a SideEffectRegistry,
    revisions: RevisionManager,
    actor: &'a Actor,
    max_cascades: usize,
    transaction_time: DateTime<Utc>,
    /// Whether each written concept existed before the transaction
    existed_before: HashMap<Key, bool>,
    /// Written concepts in first-touch order
    touched: Vec<Key>,
    /// Types of physically removed concepts, for their removal records
    removed: HashMap<Key, ConceptType>,
    allocated: BTreeMap<Partition, u64>,
}

impl<'a> ConceptReader for TransactionContext<'a> {
    fn get(&self, partition: &Partition, id: ConceptId) -> ExResult<Option<Concept>> {
        self.store.get(partition, id)
    }
}

impl<'a> TransactionContext<'a> {
    pub(crate) fn new(
        store: &'a dyn ConceptStore,
        gate: &'a dyn PermissionGate,
        side_effects: &'a SideEffectRegistry,
        revisions: RevisionManager,
        actor: &'a Actor,
        max_cascades: usize,
    ) -> Self {
        Self {
            store,
            gate,
            side_effects,
            revisions,
            actor,
            max_cascades,
            transaction_time: store.transaction_time(),
            existed_before: HashMap::new(),
            touched: Vec::new(),
            removed: HashMap::new(),
            allocated: BTreeMap::new(),
        }
    }

    /// Run one client operation and everything it cascades into
    pub(crate) fn apply(&mut self, partition: &Partition, operation: Operation) -> ExResult<()> {
        let mut queue = VecDeque::from([(partition.clone(), operation)]);
        let mut spawned = 0usize;

        while let Some((target, operation)) = queue.pop_front() {
            for Cascade {
                partition: cascade_partition,
                operation: cascaded,
            } in self.execute(&target, operation)?
            {
                spawned += 1;
                if spawned > self.max_cascades {
                    return Err(ConceptXError::CascadeLimitExceeded {
                        limit: self.max_cascades,
                    }
                    .into());
                }
                queue.push_back((cascade_partition.unwrap_or_else(|| target.clone()), cascaded));
            }
        }
        Ok(())
    }

    /// Append revision records and describe what the batch did
    pub(crate) fn finish(self, batch_partition: &Partition) -> ExResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut changes: BTreeMap<&Partition, Vec<ChangedConcept>> = BTreeMap::new();

        for key in &self.touched {
            let (partition, id) = key;
            let state = self.store.get(partition, *id)?;
            let existed = self.existed_before.get(key).copied().unwrap_or(false);
            let concept_type = match (&state, self.removed.get(key)) {
                (Some(c), _) => c.concept_type,
                (None, Some(t)) if existed => *t,
                // created and removed by the same batch
                (None, _) => continue,
            };
            match &state {
                Some(c) => outcome.concepts.push(c.clone()),
                None => outcome.removed.push(*id),
            }
            changes.entry(partition).or_default().push(ChangedConcept {
                id: *id,
                concept_type,
                state,
            });
        }

        for (partition, changed) in changes {
            let revision = self.allocated.get(partition).copied().ok_or_else(|| {
                ConceptXError::Internal {
                    message: format!("no revision allocated in {}", partition),
                }
            })?;
            self.revisions
                .record_revisions(self.store, partition, revision, &changed)?;
        }

        outcome.revision = self.allocated.get(batch_partition).copied();
        outcome.revisions = self
            .allocated
            .iter()
            .map(|(p, r)| (p.name().to_string(), *r))
            .collect();
        Ok(outcome)
    }

    fn execute(&mut self, partition: &Partition, operation: Operation) -> ExResult<Vec<Cascade>> {
        tracing::debug!(
            component = module_path!(),
            op = "execute",
            partition = %partition,
            concept_id = %operation.target_id(),
            concept_type = %operation.concept_type(),
            operation = %operation.kind(),
        );
        match operation {
            Operation::Create { concept, order_key } => self.create(partition, concept, order_key),
            Operation::Update { concept } => self.update(partition, concept),
            Operation::Delete { id, concept_type } => {
                let original = self.require(partition, id)?;
                if original.concept_type != concept_type {
                    return Err(type_mismatch(&original, concept_type));
                }
                self.delete(partition, original)
            }
        }
    }

    fn create(
        &mut self,
        partition: &Partition,
        mut concept: Concept,
        order_key: Option<i64>,
    ) -> ExResult<Vec<Cascade>> {
        if self.store.get(partition, concept.id)?.is_some() {
            return Err(ConceptXError::DuplicateConcept {
                concept_id: concept.id.to_string(),
            }
            .into());
        }
        let container = self.declared_container(partition, &concept)?;
        validate_shape(&concept)?;
        concept.clear_containment();

        let security =
            SecurityContext::for_container(self.gate, self.actor, partition, container.as_ref());
        self.gate
            .authorize_write(self.actor, &concept, OperationKind::Create, partition, &security)?;

        let before = self.invoke(
            HookPhase::BeforeCreate,
            partition,
            &security,
            &mut concept,
            container.as_ref(),
            None,
        )?;
        let mut cascades = before.cascades;
        if before.directive == HookDirective::Skip {
            return Ok(cascades);
        }
        self.check_associations(partition, &concept, None)?;

        let revision = self.revision_for(partition)?;
        concept.revision_number = revision;
        self.touch(partition, concept.id, false);
        if !self.store.write(partition, &concept)? {
            return Err(ConceptXError::DuplicateConcept {
                concept_id: concept.id.to_string(),
            }
            .into());
        }

        let container = match container {
            Some(mut parent) => {
                self.touch(partition, parent.id, true);
                attach(&mut parent, &concept, order_key)?;
                parent.revision_number = revision;
                self.write_back(partition, &parent)?;
                Some(parent)
            }
            None => None,
        };

        let after = self.invoke(
            HookPhase::AfterCreate,
            partition,
            &security,
            &mut concept,
            container.as_ref(),
            None,
        )?;
        cascades.extend(after.cascades);
        Ok(cascades)
    }

    fn update(&mut self, partition: &Partition, mut concept: Concept) -> ExResult<Vec<Cascade>> {
        let original = self.require(partition, concept.id)?;
        if original.concept_type != concept.concept_type {
            return Err(type_mismatch(&original, concept.concept_type));
        }
        if original.container != concept.container {
            return Err(ConceptXError::ContainmentImmutable {
                concept_id: concept.id.to_string(),
                property: "container".to_string(),
                reason: "a concept cannot move to another container".to_string(),
            }
            .into());
        }
        let written_here = self.existed_before.contains_key(&(partition.clone(), concept.id));
        if !written_here && concept.revision_number < original.revision_number {
            return Err(ConceptXError::RevisionConflict {
                concept_id: concept.id.to_string(),
                submitted: concept.revision_number,
                stored: original.revision_number,
            }
            .into());
        }
        validate_shape(&concept)?;
        keep_containment(&mut concept, &original)?;

        let container = self.container_of(partition, &original)?;
        let security =
            SecurityContext::for_container(self.gate, self.actor, partition, container.as_ref());
        self.gate
            .authorize_write(self.actor, &original, OperationKind::Update, partition, &security)?;

        let before = self.invoke(
            HookPhase::BeforeUpdate,
            partition,
            &security,
            &mut concept,
            container.as_ref(),
            Some(&original),
        )?;
        let mut cascades = before.cascades;
        if before.directive == HookDirective::Skip {
            return Ok(cascades);
        }
        self.check_associations(partition, &concept, Some(&original))?;

        if !self.persist_update(partition, &mut concept, &original)? {
            return Ok(cascades);
        }
        let after = self.invoke(
            HookPhase::AfterUpdate,
            partition,
            &security,
            &mut concept,
            container.as_ref(),
            Some(&original),
        )?;
        cascades.extend(after.cascades);
        Ok(cascades)
    }

    fn delete(&mut self, partition: &Partition, original: Concept) -> ExResult<Vec<Cascade>> {
        let container = self.container_of(partition, &original)?;
        let security =
            SecurityContext::for_container(self.gate, self.actor, partition, container.as_ref());
        self.gate
            .authorize_write(self.actor, &original, OperationKind::Delete, partition, &security)?;

        let mut concept = original.clone();
        let before = self.invoke(
            HookPhase::BeforeDelete,
            partition,
            &security,
            &mut concept,
            container.as_ref(),
            Some(&original),
        )?;
        let mut cascades = before.cascades;

        let container = match before.directive {
            HookDirective::Skip => return Ok(cascades),
            HookDirective::ConvertToUpdate => {
                self.persist_update(partition, &mut concept, &original)?;
                container
            }
            HookDirective::Proceed => {
                let revision = self.revision_for(partition)?;
                self.remove_subtree(partition, &original)?;
                match container {
                    Some(mut parent) => {
                        self.touch(partition, parent.id, true);
                        detach(&mut parent, original.id);
                        parent.revision_number = revision;
                        self.write_back(partition, &parent)?;
                        Some(parent)
                    }
                    None => None,
                }
            }
        };

        let after = self.invoke(
            HookPhase::AfterDelete,
            partition,
            &security,
            &mut concept,
            container.as_ref(),
            Some(&original),
        )?;
        cascades.extend(after.cascades);
        Ok(cascades)
    }

    /// Persist a changed state; `false` if nothing differs from `original`
    fn persist_update(
        &mut self,
        partition: &Partition,
        concept: &mut Concept,
        original: &Concept,
    ) -> ExResult<bool> {
        if concept.same_state_as(original) {
            return Ok(false);
        }
        concept.revision_number = self.revision_for(partition)?;
        self.touch(partition, concept.id, true);
        self.write_back(partition, concept)?;
        Ok(true)
    }

    /// Physically remove `root` and everything it contains, children first
    fn remove_subtree(&mut self, partition: &Partition, root: &Concept) -> ExResult<()> {
        let mut seen = HashSet::from([root.id]);
        let mut order = Vec::new();
        self.collect_subtree(partition, root.clone(), &mut seen, &mut order)?;
        for (id, concept_type) in order {
            self.touch(partition, id, true);
            if !self.store.delete(partition, id)? {
                return Err(not_found(partition, id));
            }
            self.removed.insert((partition.clone(), id), concept_type);
        }
        Ok(())
    }

    fn collect_subtree(
        &self,
        partition: &Partition,
        concept: Concept,
        seen: &mut HashSet<ConceptId>,
        order: &mut Vec<(ConceptId, ConceptType)>,
    ) -> ExResult<()> {
        for child_id in concept.contained_ids() {
            if !seen.insert(child_id) {
                continue;
            }
            if let Some(child) = self.store.get(partition, child_id)? {
                self.collect_subtree(partition, child, seen, order)?;
            }
        }
        order.push((concept.id, concept.concept_type));
        Ok(())
    }

    fn declared_container(
        &self,
        partition: &Partition,
        concept: &Concept,
    ) -> ExResult<Option<Concept>> {
        let concept_type = concept.concept_type;
        match (concept_type.is_root(), concept.container) {
            (true, None) => Ok(None),
            (true, Some(_)) => Err(ConceptXError::RootWithContainer {
                concept_id: concept.id.to_string(),
                concept_type: concept_type.to_string(),
            }
            .into()),
            (false, None) => Err(ConceptXError::MissingContainer {
                concept_id: concept.id.to_string(),
                concept_type: concept_type.to_string(),
            }
            .into()),
            (false, Some(container_id)) => {
                let container = self.store.get(partition, container_id)?.ok_or_else(|| {
                    ConceptXError::ContainerNotFound {
                        concept_id: concept.id.to_string(),
                        container_id: container_id.to_string(),
                        partition: partition.name().to_string(),
                    }
                })?;
                if container.concept_type.containment_for(concept_type).is_none() {
                    return Err(ConceptXError::InvalidContainment {
                        concept_id: concept.id.to_string(),
                        concept_type: concept_type.to_string(),
                        container_type: container.concept_type.to_string(),
                    }
                    .into());
                }
                Ok(Some(container))
            }
        }
    }

    fn container_of(&self, partition: &Partition, concept: &Concept) -> ExResult<Option<Concept>> {
        match concept.container {
            Some(id) => self.store.get(partition, id),
            None => Ok(None),
        }
    }

    /// Association values that are new or changed must point at an existing
    /// concept of the declared type in the same partition
    fn check_associations(
        &self,
        partition: &Partition,
        concept: &Concept,
        original: Option<&Concept>,
    ) -> ExResult<()> {
        for prop in concept.concept_type.schema().associations {
            let Some(value) = concept.property(prop.name) else {
                continue;
            };
            if original.and_then(|o| o.property(prop.name)) == Some(value) {
                continue;
            }
            for target_id in value.referenced_ids() {
                match self.store.get(partition, target_id)? {
                    Some(target) if target.concept_type == prop.target => {}
                    Some(target) => {
                        return Err(ConceptXError::InvalidProperty {
                            concept_id: concept.id.to_string(),
                            property: prop.name.to_string(),
                            reason: format!(
                                "expects a {} but {} is a {}",
                                prop.target, target_id, target.concept_type
                            ),
                        }
                        .into())
                    }
                    None => {
                        return Err(ConceptXError::AssociationTargetNotFound {
                            concept_id: concept.id.to_string(),
                            property: prop.name.to_string(),
                            target_id: target_id.to_string(),
                        }
                        .into())
                    }
                }
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        phase: HookPhase,
        partition: &Partition,
        security: &SecurityContext,
        concept: &mut Concept,
        container: Option<&Concept>,
        original: Option<&Concept>,
    ) -> ExResult<SideEffectOutcome> {
        if !self.side_effects.has_hooks(concept.concept_type) {
            return Ok(SideEffectOutcome::proceed());
        }
        let ctx = HookContext::new(partition, self.actor, self.transaction_time, security, self);
        self.side_effects
            .invoke(phase, concept, container, original, &ctx)
    }

    fn revision_for(&mut self, partition: &Partition) -> ExResult<u64> {
        if let Some(revision) = self.allocated.get(partition) {
            return Ok(*revision);
        }
        let revision = self.revisions.next_revision(self.store, partition)?;
        self.allocated.insert(partition.clone(), revision);
        Ok(revision)
    }

    fn touch(&mut self, partition: &Partition, id: ConceptId, existed: bool) {
        let key = (partition.clone(), id);
        if !self.existed_before.contains_key(&key) {
            self.existed_before.insert(key.clone(), existed);
            self.touched.push(key);
        }
    }

    fn require(&self, partition: &Partition, id: ConceptId) -> ExResult<Concept> {
        self.store
            .get(partition, id)?
            .ok_or_else(|| not_found(partition, id))
    }

    fn write_back(&self, partition: &Partition, concept: &Concept) -> ExResult<()> {
        if self.store.update(partition, concept)? {
            Ok(())
        } else {
            Err(not_found(partition, concept.id))
        }
    }
}

fn not_found(partition: &Partition, id: ConceptId) -> crate::errors::ExError {
    ConceptXError::ConceptNotFound {
        concept_id: id.to_string(),
        partition: partition.name().to_string(),
    }
    .into()
}

fn type_mismatch(stored: &Concept, requested: ConceptType) -> crate::errors::ExError {
    ConceptXError::TypeMismatch {
        concept_id: stored.id.to_string(),
        expected: requested.to_string(),
        actual: stored.concept_type.to_string(),
    }
    .into()
}

/// Containment lists may be reordered by an update but never gain or lose
/// members; omitted lists keep their stored value.
fn keep_containment(concept: &mut Concept, original: &Concept) -> ExResult<()> {
    for prop in concept.concept_type.schema().containment {
        if concept.property(prop.name).is_none() {
            if let Some(stored) = original.property(prop.name) {
                concept.set_property(prop.name, stored.clone());
            }
            continue;
        }
        let members = |c: &Concept| -> BTreeSet<ConceptId> {
            containment_entries(c, prop).into_iter().map(|(id, _)| id).collect()
        };
        if members(concept) != members(original) {
            return Err(ConceptXError::ContainmentImmutable {
                concept_id: concept.id.to_string(),
                property: prop.name.to_string(),
                reason: "children are added by create and removed by delete".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn attach(container: &mut Concept, child: &Concept, order_key: Option<i64>) -> ExResult<()> {
    let prop = container
        .concept_type
        .containment_for(child.concept_type)
        .ok_or_else(|| ConceptXError::InvalidContainment {
            concept_id: child.id.to_string(),
            concept_type: child.concept_type.to_string(),
            container_type: container.concept_type.to_string(),
        })?;
    let invalid = |reason: &str| ConceptXError::InvalidProperty {
        concept_id: container.id.to_string(),
        property: prop.name.to_string(),
        reason: reason.to_string(),
    };

    let value = if prop.ordered {
        let mut items = match container.property(prop.name) {
            Some(PropertyValue::OrderedRefList(items)) => items.clone(),
            _ => Vec::new(),
        };
        let key = match (order_key, items.iter().map(|i| i.key).max()) {
            (Some(key), _) => key,
            (None, None) => 1,
            (None, Some(last)) => last
                .checked_add(1)
                .ok_or_else(|| invalid("no order key left after the last sibling"))?,
        };
        if items.iter().any(|i| i.key == key) {
            return Err(invalid("order key already taken").into());
        }
        items.push(OrderedItem {
            key,
            value: child.id,
        });
        items.sort_by_key(|i| i.key);
        PropertyValue::OrderedRefList(items)
    } else {
        if order_key.is_some() {
            return Err(invalid("property is not ordered").into());
        }
        let mut ids = container
            .property(prop.name)
            .map(PropertyValue::referenced_ids)
            .unwrap_or_default();
        ids.push(child.id);
        PropertyValue::RefList(ids)
    };
    container.set_property(prop.name, value);
    Ok(())
}

fn detach(container: &mut Concept, child: ConceptId) {
    for prop in container.concept_type.schema().containment {
        let value = match container.property(prop.name) {
            Some(PropertyValue::RefList(ids)) if ids.contains(&child) => {
                PropertyValue::RefList(ids.iter().copied().filter(|id| *id != child).collect())
            }
            Some(PropertyValue::OrderedRefList(items))
                if items.iter().any(|i| i.value == child) =>
            {
                PropertyValue::OrderedRefList(
                    items.iter().filter(|i| i.value != child).cloned().collect(),
                )
            }
            _ => continue,
        };
        container.set_property(prop.name, value);
    }
}
