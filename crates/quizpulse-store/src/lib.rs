//! # QuizPulse Store
//!
//! Concrete backends for the core's storage traits: a SQLite store for
//! chat sessions, used questions, and daily counters; a JSON-file
//! question catalog; and an in-memory store used by tests.

pub mod catalog;
pub mod memory;
pub mod sqlite;

pub use catalog::StaticCatalog;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
