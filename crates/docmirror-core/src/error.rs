//! Error types for docmirror-core

use thiserror::Error;

/// Result type alias using docmirror-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in docmirror-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Mirror database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Primary document store error (unreachable, unreadable, rejected write)
    #[error("Document store error: {0}")]
    Source(String),

    /// Mirror row or ledger record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error aborts a whole backup run rather than one collection.
    ///
    /// Losing the primary store mid-run makes every later collection fail the
    /// same way, so it is treated as fatal.
    pub const fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::Source(_) | Self::Io(_))
    }

    /// Whether a libSQL failure is a UNIQUE/PRIMARY KEY conflict.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::LibSql(error) => {
                let message = error.to_string();
                message.contains("UNIQUE constraint failed")
                    || message.contains("PRIMARY KEY constraint failed")
            }
            _ => false,
        }
    }
}
