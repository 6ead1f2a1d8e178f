//! Engine facade
//!
//! Owns one operation processor over the SQLite store. Collaborators are
//! built explicitly from the configuration; there is no global state.

#![allow(clippy::result_large_err)]

use crate::config::EngineConfig;
use conceptx_core::errors::ExResult;
use conceptx_core::permission::RoleBasedPermissionGate;
use conceptx_core::{
    default_registry, BatchFailure, BatchOutcome, BatchRequest, OperationProcessor,
    RevisionManager,
};
use conceptx_store::SqliteStoreAdapter;
use std::sync::Arc;

pub struct Engine {
    config: EngineConfig,
    processor: OperationProcessor<SqliteStoreAdapter>,
}

impl Engine {
    /// Open the configured database, applying pending migrations
    ///
    /// # Errors
    ///
    /// `Persistence` or `Io` if the database cannot be opened or migrated.
    pub fn open(config: EngineConfig) -> ExResult<Self> {
        let store = SqliteStoreAdapter::open(&config.database)?;
        tracing::debug!(database = %config.database.display(), "engine opened");
        Ok(Self::with_store(config, store))
    }

    /// Engine over a private in-memory database; `config.database` is ignored
    ///
    /// # Errors
    ///
    /// `Persistence` if the schema cannot be created.
    pub fn open_in_memory(config: EngineConfig) -> ExResult<Self> {
        let store = SqliteStoreAdapter::open_in_memory()?;
        Ok(Self::with_store(config, store))
    }

    fn with_store(config: EngineConfig, store: SqliteStoreAdapter) -> Self {
        let gate = RoleBasedPermissionGate::new(config.permissions.scope_defaults());
        let processor = OperationProcessor::new(
            store,
            RevisionManager::new(),
            Arc::new(gate),
            Arc::new(default_registry()),
        )
        .with_settings(config.processing.settings());
        Self { config, processor }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn processor(&self) -> &OperationProcessor<SqliteStoreAdapter> {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut OperationProcessor<SqliteStoreAdapter> {
        &mut self.processor
    }

    /// Process one batch atomically
    ///
    /// # Errors
    ///
    /// The rolled-back batch's failure, with the index of the operation at
    /// fault when one is known.
    pub fn submit(&mut self, request: BatchRequest) -> Result<BatchOutcome, BatchFailure> {
        self.processor.process(request)
    }
}
