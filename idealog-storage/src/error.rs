//! Error types for the storage layer.

use thiserror::Error;

/// All errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The engine could not be opened at all. Fatal — nothing else can
    /// proceed without a connection.
    #[error("storage initialization failed: {0}")]
    Initialization(String),

    /// A versioned migration step failed. The version store is left at the
    /// last successfully recorded step, so a retry resumes from there.
    #[error("migration step {version} failed: {message}")]
    Migration { version: i64, message: String },

    /// The step registry has no entry for a version inside the migration
    /// range. Skipping would leave the schema permanently below its declared
    /// target, so this fails startup instead.
    #[error("no registered migration step for version {0}")]
    UnknownMigrationVersion(i64),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
