//! ConceptX Core - operation processing engine for a contained concept model
//!
//! This crate provides:
//! - The concept model: identifiers, properties, partitions, revision records
//! - The static containment schema and type-specific validation
//! - The operation processor (validate, authorize, hooks, persist, cascade)
//! - Per-instance permission evaluation
//! - Lifecycle side effects for engineering model and iteration setups
//! - Shallow, deep, and as-of read resolution
//! - An in-memory store adapter; the SQLite adapter lives in `conceptx-store`

pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod operations;
pub mod permission;
pub mod processor;
pub mod resolve;
pub mod revision;
pub mod schema;
pub mod side_effects;
pub mod store;

// Re-export commonly used types
pub use errors::{ConceptXError, ExError, ExErrorKind, ExResult, Result};
pub use model::{AsOf, Concept, ConceptId, Partition, PartitionScope, PropertyValue, RevisionRecord};
pub use operations::{BatchFailure, BatchOutcome, BatchRequest, Operation, OperationKind};
pub use permission::{Actor, PermissionGate, RoleBasedPermissionGate};
pub use processor::{OperationProcessor, ProcessorSettings};
pub use resolve::{ReadMode, ReadOptions};
pub use revision::RevisionManager;
pub use schema::ConceptType;
pub use side_effects::{default_registry, SideEffect, SideEffectRegistry};
pub use store::{ConceptStore, MemoryStore, StoreAdapter};
