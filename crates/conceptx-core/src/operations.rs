//! Operations, batches, and batch results
//!
//! An `Operation` lives only for one processor invocation; its effects are
//! persisted, never the operation itself.

use crate::errors::{ExError, ExErrorKind};
use crate::model::{Concept, ConceptId, Partition};
use crate::permission::Actor;
use crate::schema::ConceptType;
use conceptx_core_types::RequestContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OperationKind::Read => "read",
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        })
    }
}

/// A create, update, or delete request for one concept
///
/// The declared container of a create is `concept.container`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Create {
        concept: Concept,
        /// Position within an ordered containment property
        #[serde(default, skip_serializing_if = "Option::is_none")]
        order_key: Option<i64>,
    },
    Update {
        concept: Concept,
    },
    Delete {
        id: ConceptId,
        concept_type: ConceptType,
    },
}

impl Operation {
    pub fn create(concept: Concept) -> Self {
        Operation::Create {
            concept,
            order_key: None,
        }
    }

    pub fn create_ordered(concept: Concept, order_key: i64) -> Self {
        Operation::Create {
            concept,
            order_key: Some(order_key),
        }
    }

    pub fn update(concept: Concept) -> Self {
        Operation::Update { concept }
    }

    pub fn delete(id: ConceptId, concept_type: ConceptType) -> Self {
        Operation::Delete { id, concept_type }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Create { .. } => OperationKind::Create,
            Operation::Update { .. } => OperationKind::Update,
            Operation::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn target_id(&self) -> ConceptId {
        match self {
            Operation::Create { concept, .. } | Operation::Update { concept } => concept.id,
            Operation::Delete { id, .. } => *id,
        }
    }

    pub fn concept_type(&self) -> ConceptType {
        match self {
            Operation::Create { concept, .. } | Operation::Update { concept } => {
                concept.concept_type
            }
            Operation::Delete { concept_type, .. } => *concept_type,
        }
    }
}

/// An operation issued by a side effect
///
/// `partition: None` targets the partition of the operation that spawned it.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    pub partition: Option<Partition>,
    pub operation: Operation,
}

impl Cascade {
    pub fn local(operation: Operation) -> Self {
        Self {
            partition: None,
            operation,
        }
    }

    pub fn in_partition(partition: Partition, operation: Operation) -> Self {
        Self {
            partition: Some(partition),
            operation,
        }
    }
}

/// Ordered operations submitted as one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub context: RequestContext,
    pub actor: Actor,
    pub partition: Partition,
    pub operations: Vec<Operation>,
}

impl BatchRequest {
    pub fn new(actor: Actor, partition: Partition, operations: Vec<Operation>) -> Self {
        Self {
            context: RequestContext::new(),
            actor,
            partition,
            operations,
        }
    }
}

/// Result of a committed batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Revision assigned in the batch partition, if it changed
    pub revision: Option<u64>,
    /// Revision assigned per touched partition name
    pub revisions: BTreeMap<String, u64>,
    /// Resulting states of every changed concept, in first-touch order
    pub concepts: Vec<Concept>,
    /// Ids physically removed by the batch
    pub removed: Vec<ConceptId>,
}

impl BatchOutcome {
    pub fn concept(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.iter().find(|c| c.id == id)
    }
}

/// A rolled-back batch
///
/// `index` is the client operation at fault; failures that belong to no
/// single operation (e.g. commit) have none.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub index: Option<usize>,
    pub kind: ExErrorKind,
    pub error: ExError,
}

impl From<ExError> for BatchFailure {
    fn from(error: ExError) -> Self {
        Self {
            index: error.operation_index(),
            kind: error.kind(),
            error,
        }
    }
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(i) => write!(f, "batch rejected at operation {}: {}", i, self.error),
            None => write!(f, "batch rejected: {}", self.error),
        }
    }
}

impl std::error::Error for BatchFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_wire_shape() {
        let id = ConceptId::new();
        let op = Operation::delete(id, ConceptType::Alias);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "delete");
        assert_eq!(json["concept_type"], "Alias");
        let back: Operation = serde_json::from_value(json).unwrap();
        assert_eq!(back.target_id(), id);
        assert_eq!(back.kind(), OperationKind::Delete);
    }

    #[test]
    fn test_failure_takes_index_from_error() {
        let failure =
            BatchFailure::from(ExError::new(ExErrorKind::NotFound).with_operation_index(3));
        assert_eq!(failure.index, Some(3));
        assert_eq!(failure.kind, ExErrorKind::NotFound);
        assert!(failure.to_string().contains("operation 3"));
    }
}
