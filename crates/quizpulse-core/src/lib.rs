//! # QuizPulse Core
//!
//! Shared foundation for the QuizPulse quiz delivery engine:
//! configuration, error type, domain types, and the trait seams the
//! scheduler uses to talk to its collaborators (chat store, transport,
//! question catalog, usage/counter stores).

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::QuizPulseConfig;
pub use error::{QuizPulseError, Result};
