pub mod concept;
pub mod partition;
pub mod revision;

pub use concept::{AccessOverride, Concept, ConceptId, OrderedItem, PropertyValue};
pub use partition::{Partition, PartitionScope};
pub use revision::{AsOf, RevisionRecord};
