//! Error types for grouplink-sync.

use std::path::PathBuf;

use thiserror::Error;

use grouplink_core::{RegistryError, Side};

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort an engine operation.
///
/// Per-item failures never show up here; they become
/// [`crate::outcome::OutcomeKind::Failed`] outcomes and the step carries on.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A registry is not initialised or cannot be reached. The step did not
    /// advance; calling it again retries the same page.
    #[error("{side} registry unavailable: {reason}")]
    RegistryUnavailable { side: Side, reason: String },

    /// Any other registry failure outside a per-item write.
    #[error("registry error: {0}")]
    Registry(RegistryError),

    /// A job identifier that cannot name a batch file.
    #[error("invalid job identifier '{0}'; use letters, digits, '_' or '-'")]
    InvalidIdentifier(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Batch state JSON error.
    #[error("batch state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// True when calling the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::RegistryUnavailable { .. })
    }
}

impl From<RegistryError> for SyncError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable { side, reason } => {
                SyncError::RegistryUnavailable { side, reason }
            }
            other => SyncError::Registry(other),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
