//! Revision history command

use super::{actor_or_local, print_json, CliResult, GlobalArgs};
use clap::Args;
use conceptx_core::{ConceptId, Partition};
use conceptx_engine::commands::engine_query::{apply_engine_query, EngineQuery};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct HistoryArgs {
    pub partition: Partition,

    pub id: ConceptId,

    /// JSON file describing the reading identity (default: local administrator)
    #[arg(long)]
    pub actor: Option<PathBuf>,
}

pub fn execute(global: &GlobalArgs, args: HistoryArgs) -> CliResult {
    let actor = actor_or_local(args.actor.as_deref())?;
    let query = EngineQuery::ConceptHistory {
        actor,
        partition: args.partition,
        id: args.id,
    };
    let mut engine = global.open_engine()?;
    print_json(&apply_engine_query(query, &mut engine)?)
}
