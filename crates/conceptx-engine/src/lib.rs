//! ConceptX Engine - Orchestration layer
//!
//! Wires the operation pipeline to the SQLite store from a TOML
//! configuration and exposes the command and query surface used by the CLI.

pub mod commands;
pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::Engine;
