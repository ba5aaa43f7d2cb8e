//! QuizPulse error type.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, QuizPulseError>;

/// Errors surfaced by QuizPulse subsystems.
#[derive(Debug, thiserror::Error)]
pub enum QuizPulseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
