//! Engine-level read-only query surface.
//!
//! Reads never fail on permissions: concepts the actor may not see are
//! simply absent from the result.

#![allow(clippy::result_large_err)]

use crate::engine::Engine;
use conceptx_core::errors::ExResult;
use conceptx_core::{Actor, AsOf, Concept, ConceptId, Partition, ReadOptions, RevisionRecord};
use serde::Serialize;

/// Read-only queries supported by the engine.
#[derive(Debug, Clone)]
pub enum EngineQuery {
    /// Current states of the given ids.
    ConceptGet {
        actor: Actor,
        partition: Partition,
        ids: Vec<ConceptId>,
        options: ReadOptions,
    },
    /// Current states of the given ids and everything they contain.
    ConceptGetDeep {
        actor: Actor,
        partition: Partition,
        ids: Vec<ConceptId>,
        options: ReadOptions,
    },
    /// States of the given ids as of a past revision or instant.
    ConceptGetAsOf {
        actor: Actor,
        partition: Partition,
        ids: Vec<ConceptId>,
        as_of: AsOf,
    },
    /// Revision records of one concept, oldest first.
    ConceptHistory {
        actor: Actor,
        partition: Partition,
        id: ConceptId,
    },
}

/// Result of an engine query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EngineQueryResult {
    Concepts(Vec<Concept>),
    History(Vec<RevisionRecord>),
}

/// Apply a read-only engine query.
///
/// # Errors
///
/// `Persistence` if the store cannot be read.
pub fn apply_engine_query(query: EngineQuery, engine: &mut Engine) -> ExResult<EngineQueryResult> {
    let processor = engine.processor_mut();
    match query {
        EngineQuery::ConceptGet {
            actor,
            partition,
            ids,
            options,
        } => processor
            .get_shallow(&actor, &partition, &ids, options)
            .map(EngineQueryResult::Concepts),
        EngineQuery::ConceptGetDeep {
            actor,
            partition,
            ids,
            options,
        } => processor
            .get_deep(&actor, &partition, &ids, options)
            .map(EngineQueryResult::Concepts),
        EngineQuery::ConceptGetAsOf {
            actor,
            partition,
            ids,
            as_of,
        } => processor
            .resolve_as_of(&actor, &partition, &ids, as_of)
            .map(EngineQueryResult::Concepts),
        EngineQuery::ConceptHistory {
            actor,
            partition,
            id,
        } => processor
            .history(&actor, &partition, id)
            .map(EngineQueryResult::History),
    }
}
