use std::path::PathBuf;

use thiserror::Error;

/// Startup failure while loading the model artifact.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model artifact is invalid: {0}")]
    Invalid(String),
}

impl ModelLoadError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ModelLoadError::Invalid(msg.into())
    }
}
