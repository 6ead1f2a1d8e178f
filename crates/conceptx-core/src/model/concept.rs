use crate::schema::{containment_entries, ConceptType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use uuid::Uuid;

/// 128-bit opaque concept identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(Uuid);

impl ConceptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConceptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConceptId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// One entry of an ordered reference list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedItem {
    pub key: i64,
    pub value: ConceptId,
}

/// Type-specific property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Ref(ConceptId),
    RefList(Vec<ConceptId>),
    OrderedRefList(Vec<OrderedItem>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<ConceptId> {
        match self {
            PropertyValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Every concept id this value points at, in stored order
    pub fn referenced_ids(&self) -> Vec<ConceptId> {
        match self {
            PropertyValue::Ref(id) => vec![*id],
            PropertyValue::RefList(ids) => ids.clone(),
            PropertyValue::OrderedRefList(items) => items.iter().map(|i| i.value).collect(),
            _ => Vec::new(),
        }
    }
}

/// Per-concept exclusions that narrow role-based access
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessOverride {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_actors: BTreeSet<Uuid>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_domains: BTreeSet<Uuid>,
}

impl AccessOverride {
    pub fn excludes(&self, actor: Uuid, active_domain: Option<Uuid>) -> bool {
        self.excluded_actors.contains(&actor)
            || active_domain.is_some_and(|d| self.excluded_domains.contains(&d))
    }

    pub fn is_empty(&self) -> bool {
        self.excluded_actors.is_empty() && self.excluded_domains.is_empty()
    }
}

/// The universal addressable entity of the contained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub concept_type: ConceptType,
    #[serde(default)]
    pub revision_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ConceptId>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "AccessOverride::is_empty")]
    pub access_override: AccessOverride,
}

impl Concept {
    pub fn new(concept_type: ConceptType) -> Self {
        Self::with_id(ConceptId::new(), concept_type)
    }

    pub fn with_id(id: ConceptId, concept_type: ConceptType) -> Self {
        Self {
            id,
            concept_type,
            revision_number: 0,
            container: None,
            properties: BTreeMap::new(),
            access_override: AccessOverride::default(),
        }
    }

    pub fn contained_by(mut self, container: ConceptId) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_property(mut self, name: &str, value: PropertyValue) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: &str, value: PropertyValue) {
        self.properties.insert(name.to_string(), value);
    }

    pub fn ref_property(&self, name: &str) -> Option<ConceptId> {
        self.property(name).and_then(PropertyValue::as_ref_id)
    }

    /// Soft-deleted concepts stay readable with `is_deleted = true`
    pub fn is_soft_deleted(&self) -> bool {
        self.property(crate::schema::props::IS_DELETED)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }

    /// Ids of all directly contained children, by schema declaration order
    pub fn contained_ids(&self) -> Vec<ConceptId> {
        self.concept_type
            .schema()
            .containment
            .iter()
            .flat_map(|p| containment_entries(self, p))
            .map(|(id, _)| id)
            .collect()
    }

    /// Reset every containment property to an empty list of the right shape
    pub fn clear_containment(&mut self) {
        for prop in self.concept_type.schema().containment {
            let empty = if prop.ordered {
                PropertyValue::OrderedRefList(Vec::new())
            } else {
                PropertyValue::RefList(Vec::new())
            };
            self.set_property(prop.name, empty);
        }
    }

    /// Equality of persisted state, ignoring the revision stamp
    pub fn same_state_as(&self, other: &Concept) -> bool {
        self.id == other.id
            && self.concept_type == other.concept_type
            && self.container == other.container
            && self.properties == other.properties
            && self.access_override == other.access_override
    }
}
