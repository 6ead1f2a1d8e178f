//! ConceptX Store - SQLite persistence for the operation pipeline
//!
//! Provides:
//! - SQLite schema with a checksummed migrations framework
//! - Repository layer mapping concepts and revision records to rows
//! - `SqliteStoreAdapter`, the durable Concept Store Adapter

pub mod adapter;
pub mod db;
pub mod errors;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use adapter::SqliteStoreAdapter;
pub use errors::Result;
