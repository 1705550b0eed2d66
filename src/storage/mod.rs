//! Storage layer for Ferret
//!
//! SQLite persistence for security records and their embeddings

pub mod database;
pub mod records;

pub use database::{Database, DbPool};
pub use records::{ImportSummary, RecordStore, StoreStats};
