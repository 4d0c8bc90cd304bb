//! Errors from the orchestration layer.

use barvault_core::error::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no bundle registered with the name '{name}'")]
    UnknownBundle { name: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Whatever the external ingest routine raised. The coordinator does not
    /// interpret it — any routine failure discards the pending snapshot and
    /// preserves the cache.
    #[error("ingest routine failed: {0:#}")]
    Routine(anyhow::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl IngestError {
    /// The underlying store error, if this failure came from a sink or the
    /// snapshot store — including sink errors surfaced through a routine.
    pub fn as_store_error(&self) -> Option<&StoreError> {
        match self {
            IngestError::Store(e) => Some(e),
            IngestError::Routine(e) => e.downcast_ref::<StoreError>(),
            _ => None,
        }
    }
}
