//! Static containment schema
//!
//! Maps every concept type to the properties through which it contains other
//! concepts and the properties through which it merely references them.
//! Deep resolution, containment validation, and subtree removal are all
//! driven from this one table.

use crate::errors::ConceptXError;
use crate::model::{Concept, ConceptId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Property names with meaning to the pipeline or the built-in side effects
pub mod props {
    pub const ALIAS: &str = "alias";
    pub const DEFINITION: &str = "definition";
    pub const HYPER_LINK: &str = "hyper_link";
    pub const MODEL: &str = "model";
    pub const SITE_REFERENCE_DATA_LIBRARY: &str = "site_reference_data_library";
    pub const UNIT: &str = "unit";
    pub const PARAMETER_TYPE: &str = "parameter_type";
    pub const DEFAULT_UNIT: &str = "default_unit";
    pub const ITERATION_SETUP: &str = "iteration_setup";
    pub const ACTIVE_ITERATION_SETUP: &str = "active_iteration_setup";
    pub const SOURCE_ITERATION_SETUP: &str = "source_iteration_setup";
    pub const ENGINEERING_MODEL_IID: &str = "engineering_model_iid";
    pub const ENGINEERING_MODEL_SETUP: &str = "engineering_model_setup";
    pub const ITERATION: &str = "iteration";
    pub const ITERATION_IID: &str = "iteration_iid";
    pub const ITERATION_NUMBER: &str = "iteration_number";
    pub const FROZEN_ON: &str = "frozen_on";
    pub const IS_DELETED: &str = "is_deleted";
    pub const ELEMENT: &str = "element";
    pub const OWNER: &str = "owner";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConceptType {
    SiteDirectory,
    SiteReferenceDataLibrary,
    SimpleUnit,
    SimpleQuantityKind,
    EngineeringModelSetup,
    IterationSetup,
    EngineeringModel,
    Iteration,
    ElementDefinition,
    Alias,
    Definition,
    HyperLink,
}

/// A property through which a concept owns its children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainmentProperty {
    pub name: &'static str,
    pub target: ConceptType,
    /// Ordered containment is stored as `OrderedRefList`, otherwise `RefList`
    pub ordered: bool,
}

/// A non-owning reference to another concept in the same partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationProperty {
    pub name: &'static str,
    pub target: ConceptType,
}

#[derive(Debug)]
pub struct TypeSchema {
    pub concept_type: ConceptType,
    pub root: bool,
    pub containment: &'static [ContainmentProperty],
    pub associations: &'static [AssociationProperty],
}

const fn contains(name: &'static str, target: ConceptType) -> ContainmentProperty {
    ContainmentProperty {
        name,
        target,
        ordered: false,
    }
}

const fn contains_ordered(name: &'static str, target: ConceptType) -> ContainmentProperty {
    ContainmentProperty {
        name,
        target,
        ordered: true,
    }
}

const fn refers(name: &'static str, target: ConceptType) -> AssociationProperty {
    AssociationProperty { name, target }
}

const ANNOTATIONS: [ContainmentProperty; 3] = [
    contains(props::ALIAS, ConceptType::Alias),
    contains(props::DEFINITION, ConceptType::Definition),
    contains(props::HYPER_LINK, ConceptType::HyperLink),
];

static SCHEMAS: [TypeSchema; 12] = [
    TypeSchema {
        concept_type: ConceptType::SiteDirectory,
        root: true,
        containment: &[
            contains(props::MODEL, ConceptType::EngineeringModelSetup),
            contains(
                props::SITE_REFERENCE_DATA_LIBRARY,
                ConceptType::SiteReferenceDataLibrary,
            ),
        ],
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::SiteReferenceDataLibrary,
        root: false,
        containment: &[
            contains(props::UNIT, ConceptType::SimpleUnit),
            contains(props::PARAMETER_TYPE, ConceptType::SimpleQuantityKind),
            contains(props::ALIAS, ConceptType::Alias),
            contains(props::DEFINITION, ConceptType::Definition),
            contains(props::HYPER_LINK, ConceptType::HyperLink),
        ],
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::SimpleUnit,
        root: false,
        containment: &ANNOTATIONS,
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::SimpleQuantityKind,
        root: false,
        containment: &ANNOTATIONS,
        associations: &[refers(props::DEFAULT_UNIT, ConceptType::SimpleUnit)],
    },
    TypeSchema {
        concept_type: ConceptType::EngineeringModelSetup,
        root: false,
        containment: &[
            contains(props::ITERATION_SETUP, ConceptType::IterationSetup),
            contains(props::ALIAS, ConceptType::Alias),
            contains(props::DEFINITION, ConceptType::Definition),
        ],
        associations: &[refers(
            props::ACTIVE_ITERATION_SETUP,
            ConceptType::IterationSetup,
        )],
    },
    TypeSchema {
        concept_type: ConceptType::IterationSetup,
        root: false,
        containment: &[],
        associations: &[refers(
            props::SOURCE_ITERATION_SETUP,
            ConceptType::IterationSetup,
        )],
    },
    TypeSchema {
        concept_type: ConceptType::EngineeringModel,
        root: true,
        containment: &[contains(props::ITERATION, ConceptType::Iteration)],
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::Iteration,
        root: false,
        containment: &[contains(props::ELEMENT, ConceptType::ElementDefinition)],
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::ElementDefinition,
        root: false,
        containment: &[
            contains_ordered(props::DEFINITION, ConceptType::Definition),
            contains(props::ALIAS, ConceptType::Alias),
            contains(props::HYPER_LINK, ConceptType::HyperLink),
        ],
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::Alias,
        root: false,
        containment: &[],
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::Definition,
        root: false,
        containment: &[],
        associations: &[],
    },
    TypeSchema {
        concept_type: ConceptType::HyperLink,
        root: false,
        containment: &[],
        associations: &[],
    },
];

impl ConceptType {
    pub const ALL: [ConceptType; 12] = [
        ConceptType::SiteDirectory,
        ConceptType::SiteReferenceDataLibrary,
        ConceptType::SimpleUnit,
        ConceptType::SimpleQuantityKind,
        ConceptType::EngineeringModelSetup,
        ConceptType::IterationSetup,
        ConceptType::EngineeringModel,
        ConceptType::Iteration,
        ConceptType::ElementDefinition,
        ConceptType::Alias,
        ConceptType::Definition,
        ConceptType::HyperLink,
    ];

    pub fn schema(&self) -> &'static TypeSchema {
        // SCHEMAS is declared in ALL order
        &SCHEMAS[*self as usize]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConceptType::SiteDirectory => "SiteDirectory",
            ConceptType::SiteReferenceDataLibrary => "SiteReferenceDataLibrary",
            ConceptType::SimpleUnit => "SimpleUnit",
            ConceptType::SimpleQuantityKind => "SimpleQuantityKind",
            ConceptType::EngineeringModelSetup => "EngineeringModelSetup",
            ConceptType::IterationSetup => "IterationSetup",
            ConceptType::EngineeringModel => "EngineeringModel",
            ConceptType::Iteration => "Iteration",
            ConceptType::ElementDefinition => "ElementDefinition",
            ConceptType::Alias => "Alias",
            ConceptType::Definition => "Definition",
            ConceptType::HyperLink => "HyperLink",
        }
    }

    pub fn is_root(&self) -> bool {
        self.schema().root
    }

    /// The property of `self` that may contain concepts of type `child`
    pub fn containment_for(&self, child: ConceptType) -> Option<&'static ContainmentProperty> {
        self.schema().containment.iter().find(|p| p.target == child)
    }

    pub fn containment_property(&self, name: &str) -> Option<&'static ContainmentProperty> {
        self.schema().containment.iter().find(|p| p.name == name)
    }

    pub fn association_property(&self, name: &str) -> Option<&'static AssociationProperty> {
        self.schema().associations.iter().find(|p| p.name == name)
    }
}

impl std::fmt::Display for ConceptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConceptType {
    type Err = ConceptXError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConceptType::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| ConceptXError::Serialization {
                message: format!("unknown concept type '{}'", s),
            })
    }
}

/// Child ids held by one containment property, with ordering keys when ordered
pub fn containment_entries(
    concept: &Concept,
    property: &ContainmentProperty,
) -> Vec<(ConceptId, Option<i64>)> {
    match concept.property(property.name) {
        Some(PropertyValue::RefList(ids)) => ids.iter().map(|id| (*id, None)).collect(),
        Some(PropertyValue::OrderedRefList(items)) => {
            items.iter().map(|i| (i.value, Some(i.key))).collect()
        }
        _ => Vec::new(),
    }
}

/// Check that every containment property holds a list of the declared shape
/// and every association property holds references.
pub fn validate_shape(concept: &Concept) -> crate::errors::Result<()> {
    let schema = concept.concept_type.schema();
    let invalid = |property: &str, reason: &str| ConceptXError::InvalidProperty {
        concept_id: concept.id.to_string(),
        property: property.to_string(),
        reason: reason.to_string(),
    };

    for prop in schema.containment {
        match (concept.property(prop.name), prop.ordered) {
            (None, _)
            | (Some(PropertyValue::RefList(_)), false)
            | (Some(PropertyValue::OrderedRefList(_)), true) => {}
            (Some(_), true) => return Err(invalid(prop.name, "expected an ordered reference list")),
            (Some(_), false) => return Err(invalid(prop.name, "expected a reference list")),
        }
    }

    for prop in schema.associations {
        match concept.property(prop.name) {
            None
            | Some(PropertyValue::Null)
            | Some(PropertyValue::Ref(_))
            | Some(PropertyValue::RefList(_)) => {}
            Some(_) => return Err(invalid(prop.name, "expected a reference")),
        }
    }

    Ok(())
}
