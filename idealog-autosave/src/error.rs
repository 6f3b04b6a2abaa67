//! Error types for the autosave layer.

use idealog_storage::StorageError;
use thiserror::Error;

/// All errors that can surface from a save round.
#[derive(Debug, Error)]
pub enum AutosaveError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The blocking save task died before reporting a result.
    #[error("save task panicked: {0}")]
    TaskPanicked(String),
}

pub type AutosaveResult<T> = Result<T, AutosaveError>;
