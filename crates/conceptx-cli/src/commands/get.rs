//! Concept read command

use super::{actor_or_local, print_json, CliResult, GlobalArgs};
use clap::Args;
use conceptx_core::{AsOf, ConceptId, Partition, ReadOptions};
use conceptx_engine::commands::engine_query::{apply_engine_query, EngineQuery};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Partition name, e.g. SiteDirectory
    pub partition: Partition,

    #[arg(required = true)]
    pub ids: Vec<ConceptId>,

    /// Include everything the concepts contain
    #[arg(long, conflicts_with = "as_of_revision")]
    pub deep: bool,

    /// Read the states recorded at or before this revision
    #[arg(long)]
    pub as_of_revision: Option<u64>,

    /// Read from the revision log snapshots instead of current state
    #[arg(long, conflicts_with = "as_of_revision")]
    pub cached: bool,

    /// Omit soft-deleted concepts
    #[arg(long, conflicts_with = "as_of_revision")]
    pub exclude_deleted: bool,

    /// JSON file describing the reading identity (default: local administrator)
    #[arg(long)]
    pub actor: Option<PathBuf>,
}

pub fn execute(global: &GlobalArgs, args: GetArgs) -> CliResult {
    let actor = actor_or_local(args.actor.as_deref())?;
    let mut options = if args.cached {
        ReadOptions::cached()
    } else {
        ReadOptions::default()
    };
    options.exclude_soft_deleted = args.exclude_deleted;

    let query = match args.as_of_revision {
        Some(revision) => EngineQuery::ConceptGetAsOf {
            actor,
            partition: args.partition,
            ids: args.ids,
            as_of: AsOf::Revision(revision),
        },
        None if args.deep => EngineQuery::ConceptGetDeep {
            actor,
            partition: args.partition,
            ids: args.ids,
            options,
        },
        None => EngineQuery::ConceptGet {
            actor,
            partition: args.partition,
            ids: args.ids,
            options,
        },
    };

    let mut engine = global.open_engine()?;
    print_json(&apply_engine_query(query, &mut engine)?)
}
