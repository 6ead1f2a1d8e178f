//! Permission Gate
//!
//! Decides, per concept instance and operation kind, whether an actor may act.
//! Write denials are hard failures raised through `authorize_write`; read
//! denials are policy and simply filter results.

use crate::errors::{ConceptXError, ExResult};
use crate::model::{Concept, Partition, PartitionScope};
use crate::operations::OperationKind;
use crate::schema::{props, ConceptType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Access right granted by a role for one concept type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRight {
    None,
    Read,
    Modify,
    /// Modify only when the concept's `owner` is the actor's active domain
    ModifyIfOwner,
    /// Inherit the decision made for the container
    SameAsContainer,
}

/// Role grants: person rights apply in reference partitions, participant
/// rights in canonical ones
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub person_rights: BTreeMap<ConceptType, AccessRight>,
    #[serde(default)]
    pub participant_rights: BTreeMap<ConceptType, AccessRight>,
}

impl Role {
    pub fn right_for(
        &self,
        scope: PartitionScope,
        concept_type: ConceptType,
    ) -> Option<AccessRight> {
        match scope {
            PartitionScope::Reference => self.person_rights.get(&concept_type).copied(),
            PartitionScope::Canonical => self.participant_rights.get(&concept_type).copied(),
        }
    }
}

/// The authenticated identity behind a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub active_domain: Option<Uuid>,
    /// Names of the canonical partitions this actor participates in
    #[serde(default)]
    pub participations: BTreeSet<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub role: Role,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            active_domain: None,
            participations: BTreeSet::new(),
            is_admin: false,
            role: Role::default(),
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(name)
        }
    }

    pub fn participating_in(mut self, partition: &Partition) -> Self {
        self.participations.insert(partition.name().to_string());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_active_domain(mut self, domain: Uuid) -> Self {
        self.active_domain = Some(domain);
        self
    }

    pub fn participates_in(&self, partition: &Partition) -> bool {
        match partition.scope() {
            PartitionScope::Reference => true,
            PartitionScope::Canonical => {
                self.is_admin || self.participations.contains(partition.name())
            }
        }
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.id)
    }
}

/// Decisions already made for a concept's container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityContext {
    pub container_read_allowed: bool,
    pub container_write_allowed: bool,
}

impl SecurityContext {
    /// Context for roots, which have no container to inherit from
    pub fn unrestricted() -> Self {
        Self {
            container_read_allowed: true,
            container_write_allowed: true,
        }
    }

    /// Evaluate the gate for `container` one level up
    pub fn for_container(
        gate: &dyn PermissionGate,
        actor: &Actor,
        partition: &Partition,
        container: Option<&Concept>,
    ) -> Self {
        match container {
            None => Self::unrestricted(),
            Some(c) => {
                let parent = Self::unrestricted();
                Self {
                    container_read_allowed: gate.can_read(actor, c, partition, &parent),
                    container_write_allowed: gate.can_write(
                        actor,
                        c,
                        OperationKind::Update,
                        partition,
                        &parent,
                    ),
                }
            }
        }
    }
}

pub trait PermissionGate: Send + Sync {
    fn can_read(
        &self,
        actor: &Actor,
        concept: &Concept,
        partition: &Partition,
        container: &SecurityContext,
    ) -> bool;

    fn can_write(
        &self,
        actor: &Actor,
        concept: &Concept,
        kind: OperationKind,
        partition: &Partition,
        container: &SecurityContext,
    ) -> bool;

    /// `can_write` as a hard stop
    ///
    /// # Errors
    ///
    /// `Authorization` naming the actor, concept type, and operation.
    fn authorize_write(
        &self,
        actor: &Actor,
        concept: &Concept,
        kind: OperationKind,
        partition: &Partition,
        container: &SecurityContext,
    ) -> ExResult<()> {
        if self.can_write(actor, concept, kind, partition, container) {
            return Ok(());
        }
        Err(crate::errors::ExError::from(ConceptXError::AccessDenied {
            actor: actor.label(),
            concept_type: concept.concept_type.to_string(),
            concept_id: concept.id.to_string(),
            operation: kind.to_string(),
        })
        .with_partition(partition.name()))
    }
}

/// Default rights per partition scope when a role names no right for a type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDefaults {
    pub canonical: AccessRight,
    pub reference: AccessRight,
}

impl Default for ScopeDefaults {
    fn default() -> Self {
        Self {
            canonical: AccessRight::Modify,
            reference: AccessRight::Read,
        }
    }
}

/// Role-based gate with per-concept exclusions
///
/// Evaluation order: exclusions, participation, then the role right for the
/// type (or the scope default). Admins skip the role lookup but are still
/// subject to exclusions.
#[derive(Debug, Clone, Default)]
pub struct RoleBasedPermissionGate {
    defaults: ScopeDefaults,
}

impl RoleBasedPermissionGate {
    pub fn new(defaults: ScopeDefaults) -> Self {
        Self { defaults }
    }

    fn effective_right(
        &self,
        actor: &Actor,
        concept_type: ConceptType,
        partition: &Partition,
    ) -> AccessRight {
        if actor.is_admin {
            return AccessRight::Modify;
        }
        let scope = partition.scope();
        actor.role.right_for(scope, concept_type).unwrap_or(match scope {
            PartitionScope::Canonical => self.defaults.canonical,
            PartitionScope::Reference => self.defaults.reference,
        })
    }

    fn admitted(&self, actor: &Actor, concept: &Concept, partition: &Partition) -> bool {
        !concept.access_override.excludes(actor.id, actor.active_domain)
            && actor.participates_in(partition)
    }
}

impl PermissionGate for RoleBasedPermissionGate {
    fn can_read(
        &self,
        actor: &Actor,
        concept: &Concept,
        partition: &Partition,
        container: &SecurityContext,
    ) -> bool {
        if !self.admitted(actor, concept, partition) {
            return false;
        }
        match self.effective_right(actor, concept.concept_type, partition) {
            AccessRight::None => false,
            AccessRight::Read | AccessRight::Modify | AccessRight::ModifyIfOwner => true,
            AccessRight::SameAsContainer => container.container_read_allowed,
        }
    }

    fn can_write(
        &self,
        actor: &Actor,
        concept: &Concept,
        _kind: OperationKind,
        partition: &Partition,
        container: &SecurityContext,
    ) -> bool {
        if !self.admitted(actor, concept, partition) {
            return false;
        }
        match self.effective_right(actor, concept.concept_type, partition) {
            AccessRight::None | AccessRight::Read => false,
            AccessRight::Modify => true,
            AccessRight::ModifyIfOwner => {
                match (concept.ref_property(props::OWNER), actor.active_domain) {
                    (Some(owner), Some(domain)) => owner.as_uuid() == domain,
                    _ => false,
                }
            }
            AccessRight::SameAsContainer => container.container_write_allowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExErrorKind;
    use crate::model::{ConceptId, PropertyValue};

    fn model_partition() -> Partition {
        Partition::engineering_model(Uuid::new_v4())
    }

    #[test]
    fn test_reference_default_is_read_only() {
        let gate = RoleBasedPermissionGate::default();
        let actor = Actor::new("reader");
        let unit = Concept::new(ConceptType::SimpleUnit);
        let p = Partition::site_directory();
        let ctx = SecurityContext::unrestricted();
        assert!(gate.can_read(&actor, &unit, &p, &ctx));
        assert!(!gate.can_write(&actor, &unit, OperationKind::Update, &p, &ctx));
    }

    #[test]
    fn test_canonical_requires_participation() {
        let gate = RoleBasedPermissionGate::default();
        let p = model_partition();
        let outsider = Actor::new("outsider");
        let member = Actor::new("member").participating_in(&p);
        let element = Concept::new(ConceptType::ElementDefinition);
        let ctx = SecurityContext::unrestricted();
        assert!(!gate.can_read(&outsider, &element, &p, &ctx));
        assert!(gate.can_write(&member, &element, OperationKind::Create, &p, &ctx));
    }

    #[test]
    fn test_exclusion_beats_admin() {
        let gate = RoleBasedPermissionGate::default();
        let admin = Actor::admin("admin");
        let mut unit = Concept::new(ConceptType::SimpleUnit);
        unit.access_override.excluded_actors.insert(admin.id);
        let p = Partition::site_directory();
        let ctx = SecurityContext::unrestricted();
        assert!(!gate.can_read(&admin, &unit, &p, &ctx));
        assert!(!gate.can_write(&admin, &unit, OperationKind::Delete, &p, &ctx));
    }

    #[test]
    fn test_same_as_container_inherits() {
        let gate = RoleBasedPermissionGate::default();
        let mut role = Role::default();
        role.person_rights
            .insert(ConceptType::Alias, AccessRight::SameAsContainer);
        let actor = Actor::new("a").with_role(role);
        let alias = Concept::new(ConceptType::Alias);
        let p = Partition::site_directory();
        let denied = SecurityContext {
            container_read_allowed: false,
            container_write_allowed: false,
        };
        assert!(!gate.can_read(&actor, &alias, &p, &denied));
        assert!(gate.can_write(
            &actor,
            &alias,
            OperationKind::Create,
            &p,
            &SecurityContext::unrestricted()
        ));
    }

    #[test]
    fn test_modify_if_owner_compares_active_domain() {
        let gate = RoleBasedPermissionGate::default();
        let p = model_partition();
        let domain = Uuid::new_v4();
        let mut role = Role::default();
        role.participant_rights
            .insert(ConceptType::ElementDefinition, AccessRight::ModifyIfOwner);
        let actor = Actor::new("owner")
            .participating_in(&p)
            .with_role(role)
            .with_active_domain(domain);
        let owned = Concept::new(ConceptType::ElementDefinition).with_property(
            props::OWNER,
            PropertyValue::Ref(ConceptId::from_uuid(domain)),
        );
        let foreign = Concept::new(ConceptType::ElementDefinition).with_property(
            props::OWNER,
            PropertyValue::Ref(ConceptId::new()),
        );
        let ctx = SecurityContext::unrestricted();
        assert!(gate.can_write(&actor, &owned, OperationKind::Update, &p, &ctx));
        assert!(!gate.can_write(&actor, &foreign, OperationKind::Update, &p, &ctx));
        assert!(gate.can_read(&actor, &foreign, &p, &ctx));
    }

    #[test]
    fn test_authorize_write_carries_context() {
        let gate = RoleBasedPermissionGate::default();
        let actor = Actor::new("reader");
        let unit = Concept::new(ConceptType::SimpleUnit);
        let err = gate
            .authorize_write(
                &actor,
                &unit,
                OperationKind::Update,
                &Partition::site_directory(),
                &SecurityContext::unrestricted(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Authorization);
        assert_eq!(err.actor(), Some(actor.label().as_str()));
        assert_eq!(err.concept_type(), Some("SimpleUnit"));
        assert_eq!(err.operation(), Some("update"));
    }
}
