//! Engine-level write commands.

use crate::engine::Engine;
use conceptx_core::{BatchFailure, BatchOutcome, BatchRequest};

/// Engine-level commands that change the store.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Apply a batch of operations as one transaction.
    SubmitBatch(BatchRequest),
}

/// Result of applying an engine command.
#[derive(Debug, Clone)]
pub enum EngineCommandResult {
    /// The batch committed.
    BatchCommitted(BatchOutcome),
}

/// Apply an engine command.
///
/// # Errors
///
/// The batch failure when the transaction was rolled back.
pub fn apply_engine_command(
    cmd: EngineCommand,
    engine: &mut Engine,
) -> Result<EngineCommandResult, BatchFailure> {
    match cmd {
        EngineCommand::SubmitBatch(request) => engine
            .submit(request)
            .map(EngineCommandResult::BatchCommitted),
    }
}
