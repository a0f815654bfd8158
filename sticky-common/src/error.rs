//! Common error types for StickyWall

use thiserror::Error;

/// Common result type for StickyWall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the StickyWall crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Identity already submitted within the rolling window.
    /// Carries the remaining wait so callers can render a precise message.
    #[error("rate limited: next post allowed in {remaining_ms}ms")]
    RateLimited {
        /// Milliseconds until the identity may post again
        remaining_ms: i64,
    },

    /// Candidate placement violates the overlap policy
    #[error("placement overlap fraction {fraction:.2} exceeds the allowed maximum")]
    Overlap {
        /// Worst-case overlap fraction against any single neighbor
        fraction: f64,
    },

    /// Image persistence failed; fatal to the current submission attempt
    #[error("image upload failed: {0}")]
    Upload(String),

    /// Admin credential missing or invalid
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (e.g. duplicate visible id)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
