//! Repository layer for persisting concepts to SQLite

pub mod sqlite_repo;

pub use sqlite_repo::SqliteRepo;
