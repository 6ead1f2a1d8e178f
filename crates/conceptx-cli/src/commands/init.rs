//! Database initialization command

use super::{CliResult, GlobalArgs};
use clap::Args;

#[derive(Debug, Args)]
pub struct InitArgs {}

pub fn execute(global: &GlobalArgs, _args: InitArgs) -> CliResult {
    let engine = global.open_engine()?;
    println!(
        "Initialized store at {}",
        engine.config().database.display()
    );
    Ok(())
}
