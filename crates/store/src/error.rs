use common::Version;
use thiserror::Error;

/// Errors that can occur when interacting with a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An optimistic-concurrency check failed: the record changed under the
    /// writer. Retryable after a re-read.
    #[error("Version conflict on {entity} {key}: expected version {expected}, found {actual}")]
    VersionConflict {
        entity: &'static str,
        key: String,
        expected: Version,
        actual: Version,
    },

    /// The addressed record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Insert of a record whose key already exists.
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True for failures worth retrying after a re-read (lost CAS races).
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
