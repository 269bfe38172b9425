//! Review error types

use thiserror::Error;

/// Errors surfaced by review-state operations.
///
/// None of these are fatal to the process. `Persistence` and the wrapped I/O
/// errors are logged by background tasks; in-memory state stays authoritative.
#[derive(Error, Debug)]
pub enum ReviewError {
    /// The path is not tracked by this session
    #[error("Unknown file: {0}")]
    UnknownFile(String),

    /// No live comment with this id on the path
    #[error("Comment {id} not found on {path}")]
    NotFound { path: String, id: u64 },

    /// Request parameters failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The waiting peer went away
    #[error("Peer disconnected")]
    Disconnected,

    /// Durable storage rejected a write
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session database error
    #[error("Database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
}

impl ReviewError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ReviewError::UnknownFile(_) => codes::UNKNOWN_FILE,
            ReviewError::NotFound { .. } => codes::NOT_FOUND,
            ReviewError::InvalidInput(_) => codes::INVALID_INPUT,
            ReviewError::Disconnected => codes::DISCONNECTED,
            ReviewError::Persistence(_) | ReviewError::Db(_) => codes::PERSISTENCE,
            ReviewError::Io(_) => codes::IO_ERROR,
            ReviewError::Json(_) => codes::INTERNAL,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;

/// Error codes returned to HTTP clients
pub mod codes {
    pub const UNKNOWN_FILE: &str = "unknown_file";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const DISCONNECTED: &str = "disconnected";
    pub const PERSISTENCE: &str = "persistence_failure";
    pub const IO_ERROR: &str = "io_error";
    pub const INTERNAL: &str = "internal";
}
