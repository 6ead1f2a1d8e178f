//! Batch submission command

use super::{print_json, read_json, CliResult, GlobalArgs};
use clap::Args;
use conceptx_core::{Actor, BatchRequest, Operation, Partition};
use conceptx_engine::commands::engine_command::{
    apply_engine_command, EngineCommand, EngineCommandResult,
};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// JSON file describing the acting identity
    #[arg(long)]
    pub actor: PathBuf,

    /// JSON file with `partition` and `operations`
    #[arg(long)]
    pub batch: PathBuf,
}

/// On-disk batch shape; the actor is supplied separately
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BatchFile {
    partition: Partition,
    operations: Vec<Operation>,
}

pub fn execute(global: &GlobalArgs, args: SubmitArgs) -> CliResult {
    let actor: Actor = read_json(&args.actor)?;
    let batch: BatchFile = read_json(&args.batch)?;

    let mut engine = global.open_engine()?;
    let request = BatchRequest::new(actor, batch.partition, batch.operations);
    match apply_engine_command(EngineCommand::SubmitBatch(request), &mut engine)? {
        EngineCommandResult::BatchCommitted(outcome) => print_json(&outcome),
    }
}
