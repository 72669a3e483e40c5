//! Error types for flowmesh-decider.

use thiserror::Error;

/// Input errors of the decision entry points.
///
/// Network failures never show up here: an unreachable peer is simply absent
/// from the recommendation, and an expired wait terminates the fan-in
/// normally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeciderError {
    /// A decision was requested without the process information it needs.
    #[error("process information missing")]
    MissingProcessInfo,

    /// A decision was requested without the execution token it needs.
    #[error("decision token missing")]
    MissingToken,
}

/// Result type for decider operations.
pub type DeciderResult<T> = Result<T, DeciderError>;
