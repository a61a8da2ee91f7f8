//! Error types for Vigil.
//!
//! Predicate mismatches, debounced events, and preempted work items are
//! deliberate no-ops rather than errors, so they have no variant here.
//! Transient call failures are recovered inside the client and only
//! surface as `ServerUnavailable` once a whole retry sequence fails.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    /// The capability server's circuit is open, or a full retry
    /// sequence was exhausted without a success.
    #[error("capability server '{0}' unavailable")]
    ServerUnavailable(String),

    /// A single call attempt failed (network error or timeout).
    #[error("capability call failed: {0}")]
    CallFailed(String),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;
