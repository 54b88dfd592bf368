//! Error types for grouplink-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Side;

/// All errors that can arise from registry and settings operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry cannot be reached or is not initialised. Retryable.
    #[error("{side} registry unavailable: {reason}")]
    Unavailable { side: Side, reason: String },

    /// A referenced record does not exist.
    #[error("{side} registry has no {what}")]
    NotFound { side: Side, what: String },

    /// The registry refused the operation (validation, constraint).
    #[error("{side} registry rejected the operation: {reason}")]
    Rejected { side: Side, reason: String },

    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

impl RegistryError {
    pub fn unavailable(side: Side, reason: impl Into<String>) -> Self {
        RegistryError::Unavailable {
            side,
            reason: reason.into(),
        }
    }

    pub fn not_found(side: Side, what: impl Into<String>) -> Self {
        RegistryError::NotFound {
            side,
            what: what.into(),
        }
    }

    /// True when retrying later may succeed without any change of input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Unavailable { .. })
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
