//! Store error types.
//!
//! [`Error::NotFound`] is the only condition callers are expected to branch
//! on: it marks an exact-key miss. A prefix or suffix query that matches
//! nothing is a successful, empty result and never produces it.

use super::types::Namespace;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by [`Store`](super::Store) implementations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Exact-key read found no live record.
    #[error("not found")]
    NotFound,

    /// The backend could not bind to the requested namespace.
    #[error("failed to initialize namespace '{namespace}': {source}")]
    Init {
        namespace: Namespace,
        #[source]
        source: anyhow::Error,
    },

    /// The caller's cancellation token fired before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// Failure of the underlying medium (disk, connection, task join).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    /// Create an initialization error for `namespace`.
    pub fn init(namespace: Namespace, source: impl Into<anyhow::Error>) -> Self {
        Self::Init {
            namespace,
            source: source.into(),
        }
    }

    /// Returns true for the exact-key miss sentinel.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true if the operation was abandoned because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
