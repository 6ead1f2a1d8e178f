use conceptx_core_types::{RequestId, TraceId};
use thiserror::Error;

/// Result type alias using the domain error enum
pub type Result<T> = std::result::Result<T, ConceptXError>;

/// Result type alias used by the processing pipeline
pub type ExResult<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Every failure surfaced by the operation pipeline is classified into one of
/// these kinds. Each kind maps to a stable code used by callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExErrorKind {
    /// Actor lacks rights for a write; never retried
    Authorization,
    /// Payload violates type or containment invariants
    Validation,
    /// A side-effect hook rejected the lifecycle transition
    LifecycleVeto,
    /// Store unavailable, conflicting, or timed out; the whole batch may be retried
    Persistence,
    /// Referenced concept, container, or association target is missing
    NotFound,
    Serialization,
    Io,
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Authorization => "ERR_AUTHORIZATION",
            ExErrorKind::Validation => "ERR_VALIDATION",
            ExErrorKind::LifecycleVeto => "ERR_LIFECYCLE_VETO",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether the caller may resubmit the whole batch unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExErrorKind::Persistence)
    }
}

/// Canonical structured error type
///
/// Carries the classification plus whatever pipeline context was known at the
/// point of failure. The processor stamps the failing operation index before
/// the error leaves the transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    concept_id: Option<String>,
    concept_type: Option<String>,
    operation: Option<String>,
    actor: Option<String>,
    partition: Option<String>,
    operation_index: Option<usize>,
    rule: Option<String>,
    request_id: Option<RequestId>,
    trace_id: Option<TraceId>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            concept_id: None,
            concept_type: None,
            operation: None,
            actor: None,
            partition: None,
            operation_index: None,
            rule: None,
            request_id: None,
            trace_id: None,
            message: String::new(),
        }
    }

    /// Add operation context (the internal step that failed, e.g. "sqlite")
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    pub fn with_concept_id(mut self, id: impl Into<String>) -> Self {
        self.concept_id = Some(id.into());
        self
    }

    pub fn with_concept_type(mut self, concept_type: impl Into<String>) -> Self {
        self.concept_type = Some(concept_type.into());
        self
    }

    /// Add the attempted operation kind (create/update/delete/read)
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    /// Add the position of the failing client operation within its batch
    ///
    /// The first index stamped wins, so a cascade failure keeps the index of
    /// the client operation that spawned it.
    pub fn with_operation_index(mut self, index: usize) -> Self {
        self.operation_index.get_or_insert(index);
        self
    }

    /// Add the name of the lifecycle rule that vetoed the transition
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn concept_id(&self) -> Option<&str> {
        self.concept_id.as_deref()
    }

    pub fn concept_type(&self) -> Option<&str> {
        self.concept_type.as_deref()
    }

    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    pub fn operation_index(&self) -> Option<usize> {
        self.operation_index
    }

    pub fn rule(&self) -> Option<&str> {
        self.rule.as_deref()
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(index) = self.operation_index {
            write!(f, " (operation #{})", index)?;
        }
        if let Some(id) = &self.concept_id {
            write!(f, " (concept_id: {})", id)?;
        }
        if let Some(rule) = &self.rule {
            write!(f, " (rule: {})", rule)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Domain error taxonomy for concept processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConceptXError {
    // ===== Lookup =====
    #[error("Concept not found: {concept_id} in {partition}")]
    ConceptNotFound {
        concept_id: String,
        partition: String,
    },

    #[error("Container {container_id} of {concept_id} not found in {partition}")]
    ContainerNotFound {
        concept_id: String,
        container_id: String,
        partition: String,
    },

    #[error("Association {property} of {concept_id} references missing concept {target_id}")]
    AssociationTargetNotFound {
        concept_id: String,
        property: String,
        target_id: String,
    },

    // ===== Validation =====
    #[error("{concept_type} {concept_id} cannot be contained by {container_type}")]
    InvalidContainment {
        concept_id: String,
        concept_type: String,
        container_type: String,
    },

    #[error("{concept_type} {concept_id} requires a container")]
    MissingContainer {
        concept_id: String,
        concept_type: String,
    },

    #[error("Root {concept_type} {concept_id} cannot have a container")]
    RootWithContainer {
        concept_id: String,
        concept_type: String,
    },

    #[error("Concept already exists: {concept_id}")]
    DuplicateConcept { concept_id: String },

    #[error("Concept {concept_id} is a {actual}, not a {expected}")]
    TypeMismatch {
        concept_id: String,
        expected: String,
        actual: String,
    },

    #[error("Containment of {concept_id} cannot change through {property}: {reason}")]
    ContainmentImmutable {
        concept_id: String,
        property: String,
        reason: String,
    },

    #[error("Property {property} of {concept_id} is invalid: {reason}")]
    InvalidProperty {
        concept_id: String,
        property: String,
        reason: String,
    },

    #[error("Unknown partition name: {name}")]
    InvalidPartition { name: String },

    #[error("Batch exceeded {limit} cascaded operations")]
    CascadeLimitExceeded { limit: usize },

    // ===== Authorization =====
    #[error("{actor} is not allowed to {operation} {concept_type} {concept_id}")]
    AccessDenied {
        actor: String,
        concept_type: String,
        concept_id: String,
        operation: String,
    },

    // ===== Lifecycle =====
    #[error("Lifecycle rule {rule} rejected {operation} of {concept_id}: {reason}")]
    LifecycleVeto {
        rule: String,
        concept_id: String,
        operation: String,
        reason: String,
    },

    // ===== Persistence =====
    #[error("Revision conflict on {concept_id}: submitted {submitted}, stored {stored}")]
    RevisionConflict {
        concept_id: String,
        submitted: u64,
        stored: u64,
    },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    // ===== Generic =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<ConceptXError> for ExError {
    fn from(err: ConceptXError) -> Self {
        let message = err.to_string();
        match err {
            ConceptXError::ConceptNotFound {
                concept_id,
                partition,
            } => ExError::new(ExErrorKind::NotFound)
                .with_concept_id(concept_id)
                .with_partition(partition)
                .with_message(message),

            ConceptXError::ContainerNotFound {
                concept_id,
                partition,
                ..
            } => ExError::new(ExErrorKind::NotFound)
                .with_concept_id(concept_id)
                .with_partition(partition)
                .with_op("resolve_container")
                .with_message(message),

            ConceptXError::AssociationTargetNotFound { concept_id, .. } => {
                ExError::new(ExErrorKind::NotFound)
                    .with_concept_id(concept_id)
                    .with_op("resolve_association")
                    .with_message(message)
            }

            ConceptXError::InvalidContainment {
                concept_id,
                concept_type,
                ..
            }
            | ConceptXError::MissingContainer {
                concept_id,
                concept_type,
            }
            | ConceptXError::RootWithContainer {
                concept_id,
                concept_type,
            } => ExError::new(ExErrorKind::Validation)
                .with_concept_id(concept_id)
                .with_concept_type(concept_type)
                .with_message(message),

            ConceptXError::DuplicateConcept { concept_id }
            | ConceptXError::TypeMismatch { concept_id, .. }
            | ConceptXError::ContainmentImmutable { concept_id, .. }
            | ConceptXError::InvalidProperty { concept_id, .. } => {
                ExError::new(ExErrorKind::Validation)
                    .with_concept_id(concept_id)
                    .with_message(message)
            }

            ConceptXError::InvalidPartition { name } => ExError::new(ExErrorKind::Validation)
                .with_partition(name)
                .with_message(message),

            ConceptXError::CascadeLimitExceeded { .. } => ExError::new(ExErrorKind::Validation)
                .with_op("cascade")
                .with_message(message),

            ConceptXError::AccessDenied {
                actor,
                concept_type,
                concept_id,
                operation,
            } => ExError::new(ExErrorKind::Authorization)
                .with_actor(actor)
                .with_concept_type(concept_type)
                .with_concept_id(concept_id)
                .with_operation(operation)
                .with_message(message),

            ConceptXError::LifecycleVeto {
                rule,
                concept_id,
                operation,
                ..
            } => ExError::new(ExErrorKind::LifecycleVeto)
                .with_rule(rule)
                .with_concept_id(concept_id)
                .with_operation(operation)
                .with_message(message),

            ConceptXError::RevisionConflict { concept_id, .. } => {
                ExError::new(ExErrorKind::Persistence)
                    .with_op("revision_check")
                    .with_concept_id(concept_id)
                    .with_message(message)
            }

            ConceptXError::StoreUnavailable { .. } => {
                ExError::new(ExErrorKind::Persistence).with_message(message)
            }

            ConceptXError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            ConceptXError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        ExError::new(ExErrorKind::Serialization).with_message(err.to_string())
    }
}
