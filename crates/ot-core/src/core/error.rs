//! Error types for OT operations.

use thiserror::Error;

/// Result type for OT operations.
pub type Result<T> = std::result::Result<T, OtError>;

/// Errors that can occur in the OT algebra, the commit-graph algorithms and
/// the client state machine.
///
/// `OtError` is `Clone` so a coalesced `sync()` run can hand the same outcome
/// to every caller it served.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OtError {
    #[error("Not found transformer for \"{left}\" and \"{right}\"")]
    MissingTransformer { left: String, right: String },

    #[error("Not found inverter for \"{0}\"")]
    MissingInverter(String),

    #[error("Operation variant mismatch for \"{0}\"")]
    VariantMismatch(String),

    #[error("Checkout has not been called")]
    NotCheckedOut,

    #[error("No pending commit to push")]
    NoPendingCommit,

    #[error("A commit is already pending, push it first")]
    CommitPending,

    #[error("Apply error: {0}")]
    Apply(String),

    #[error("Can't merge. Root not found in remote")]
    NoCommonRoot,

    #[error("Unknown commit \"{0}\"")]
    CommitNotFound(String),

    #[error("No checkpoint found for HEAD")]
    CheckpointNotFound,

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request aborted")]
    Aborted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for OtError {
    fn from(err: serde_json::Error) -> Self {
        OtError::Json(err.to_string())
    }
}

impl OtError {
    /// Check if this error signals an incomplete `OtSystem` registration.
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            OtError::MissingTransformer { .. }
                | OtError::MissingInverter(_)
                | OtError::VariantMismatch(_)
        )
    }

    /// Check if this error is retryable.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, OtError::Transport(_))
    }

    /// Check if this error is a cancelled request.
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, OtError::Aborted)
    }

    pub(crate) fn missing_transformer(left: impl std::fmt::Debug, right: impl std::fmt::Debug) -> Self {
        OtError::MissingTransformer {
            left: format!("{:?}", left),
            right: format!("{:?}", right),
        }
    }
}
