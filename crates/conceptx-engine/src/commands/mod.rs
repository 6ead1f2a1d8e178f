//! Command orchestration layer.
//!
//! `apply_engine_command` is the single write entry point and
//! `apply_engine_query` the single read entry point over an `Engine`.

pub mod engine_command;
pub mod engine_query;
