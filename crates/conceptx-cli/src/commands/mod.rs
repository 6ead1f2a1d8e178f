//! Subcommands and the options they share

pub mod get;
pub mod history;
pub mod init;
pub mod submit;

use clap::Args;
use conceptx_core::logging_facility;
use conceptx_core::Actor;
use conceptx_engine::{Engine, EngineConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path, overriding the configuration
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        let mut config = EngineConfig::load_or_default(self.config.as_deref())?;
        if let Some(db) = &self.db {
            config = config.with_database(db);
        }
        Ok(config)
    }

    /// Load configuration, start logging, and open the engine
    pub fn open_engine(&self) -> Result<Engine, Box<dyn std::error::Error>> {
        let config = self.engine_config()?;
        logging_facility::init(config.logging.profile);
        Ok(Engine::open(config)?)
    }
}

/// Parse a JSON file into `T`, naming the file on failure
pub fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let value = serde_json::from_str(&text)
        .map_err(|e| format!("invalid JSON in {}: {}", path.display(), e))?;
    Ok(value)
}

/// The actor from `--actor`, or a local administrator for direct database access
pub fn actor_or_local(path: Option<&Path>) -> Result<Actor, Box<dyn std::error::Error>> {
    match path {
        Some(path) => read_json(path),
        None => Ok(Actor::admin("local")),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
