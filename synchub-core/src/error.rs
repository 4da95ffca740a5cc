//! Error types for synchub-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from record persistence.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// JSON error in the activity ledger.
    #[error("activity JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// An update targeted a provider with no record.
    #[error("no record for provider '{id}'")]
    RecordNotFound { id: String },

    /// The provider id cannot be used as a record key.
    #[error("invalid provider id '{id}'")]
    InvalidId { id: String },
}

/// Convenience constructor for [`RecordError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RecordError {
    RecordError::Io {
        path: path.into(),
        source,
    }
}
