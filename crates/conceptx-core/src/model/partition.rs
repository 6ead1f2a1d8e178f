//! Partitions: named scopes with their own revision sequence and default
//! permission policy

use crate::errors::ConceptXError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

const SITE_DIRECTORY: &str = "SiteDirectory";
const ENGINEERING_MODEL_PREFIX: &str = "EngineeringModel_";

/// Which default permission policy applies inside a partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionScope {
    /// One engineering model; access requires participation
    Canonical,
    /// The shared directory and reference libraries
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Partition {
    name: String,
    scope: PartitionScope,
}

impl Partition {
    pub fn site_directory() -> Self {
        Self {
            name: SITE_DIRECTORY.to_string(),
            scope: PartitionScope::Reference,
        }
    }

    pub fn engineering_model(model_id: Uuid) -> Self {
        Self {
            name: format!("{}{}", ENGINEERING_MODEL_PREFIX, model_id.simple()),
            scope: PartitionScope::Canonical,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> PartitionScope {
        self.scope
    }

    /// The engineering model id encoded in a canonical partition name
    pub fn model_id(&self) -> Option<Uuid> {
        self.name
            .strip_prefix(ENGINEERING_MODEL_PREFIX)
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

impl FromStr for Partition {
    type Err = ConceptXError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name == SITE_DIRECTORY {
            return Ok(Self::site_directory());
        }
        name.strip_prefix(ENGINEERING_MODEL_PREFIX)
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Self::engineering_model)
            .ok_or_else(|| ConceptXError::InvalidPartition {
                name: name.to_string(),
            })
    }
}

impl TryFrom<String> for Partition {
    type Error = ConceptXError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<Partition> for String {
    fn from(p: Partition) -> Self {
        p.name
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
