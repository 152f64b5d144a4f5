//! Crate-wide error type and result alias.

use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the player core and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed range expression or command line.
    #[error("parse error: {0}")]
    Parse(String),

    /// Track, slot, or index could not be resolved.
    #[error("{0} not found")]
    NotFound(String),

    /// Engine unreachable or returned a non-success response.
    #[error("engine request failed: {0}")]
    Transport(String),

    /// Catalog request failed or returned an unusable payload.
    #[error("catalog request failed: {0}")]
    Catalog(String),

    /// Terminal or filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a `NotFound` error for a named entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
