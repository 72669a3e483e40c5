//! Error types for flowmesh-registry.

use thiserror::Error;

/// Errors surfaced by registry operations.
///
/// Health-probe failures are deliberately absent: they only affect strike
/// counts and are never visible to callers.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A newly announced peer did not answer the identity probe and was not
    /// admitted.
    #[error("identity probe failed for {endpoint}: {reason}")]
    IdentityProbeFailed { endpoint: String, reason: String },

    /// The background health loop was started twice.
    #[error("health loop already running")]
    AlreadyRunning,
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
