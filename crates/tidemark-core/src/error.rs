//! Error types for tidemark-core

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type alias using tidemark-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tidemark-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store failure (user-actionable, never retried automatically)
    #[error(transparent)]
    LocalStore(#[from] LocalStoreError),

    /// Remote store failure
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note not found
    #[error("Note not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures of the local persistent store.
#[derive(Error, Debug)]
pub enum LocalStoreError {
    /// The device ran out of space for the database
    #[error("Local storage is full: {0}")]
    QuotaExceeded(String),

    /// The database file is unreadable
    #[error("Local database is corrupted: {0}")]
    Corrupted(String),

    /// Attempt to move a sync cursor backward
    #[error("Sync cursor for {owner} cannot move from {current} back to {requested}")]
    CursorRegression {
        owner: String,
        current: i64,
        requested: i64,
    },

    /// Any other SQLite failure
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// Stored field could not be decoded
    #[error("Stored record could not be decoded: {0}")]
    Decode(String),

    /// Filesystem error around the database file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for LocalStoreError {
    fn from(error: rusqlite::Error) -> Self {
        if let rusqlite::Error::FromSqlConversionFailure(column, _, source) = &error {
            return Self::Decode(format!("column {column}: {source}"));
        }
        match error.sqlite_error_code() {
            Some(ErrorCode::DiskFull) => Self::QuotaExceeded(error.to_string()),
            Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => {
                Self::Corrupted(error.to_string())
            }
            _ => Self::Sqlite(error),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Self::LocalStore(error.into())
    }
}

/// Failures reported by the remote store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connectivity-level failure; the whole pass is retried later
    #[error("Remote unreachable: {0}")]
    Network(String),

    /// The remote refused one record (validation or per-record authorization)
    #[error("Remote rejected record: {0}")]
    Rejected(String),

    /// Session is no longer valid; every call would fail the same way
    #[error("Remote authorization failed: {0}")]
    Unauthorized(String),

    /// A single remote call exceeded the configured timeout
    #[error("Remote call timed out after {0} ms")]
    Timeout(u64),
}

impl RemoteError {
    /// Whether the failure only concerns the record being pushed.
    pub const fn is_per_record(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn disk_full_maps_to_quota_exceeded() {
        let error = LocalStoreError::from(sqlite_failure(rusqlite::ffi::SQLITE_FULL));
        assert!(matches!(error, LocalStoreError::QuotaExceeded(_)));
    }

    #[test]
    fn corrupt_file_maps_to_corrupted() {
        let error = LocalStoreError::from(sqlite_failure(rusqlite::ffi::SQLITE_NOTADB));
        assert!(matches!(error, LocalStoreError::Corrupted(_)));

        let error = LocalStoreError::from(sqlite_failure(rusqlite::ffi::SQLITE_CORRUPT));
        assert!(matches!(error, LocalStoreError::Corrupted(_)));
    }

    #[test]
    fn conversion_failure_maps_to_decode() {
        let error = LocalStoreError::from(rusqlite::Error::FromSqlConversionFailure(
            8,
            rusqlite::types::Type::Text,
            "unknown sync state 'bogus'".into(),
        ));
        assert!(
            matches!(&error, LocalStoreError::Decode(message) if message.contains("column 8"))
        );
    }

    #[test]
    fn per_record_remote_errors() {
        assert!(RemoteError::Rejected("bad title".into()).is_per_record());
        assert!(RemoteError::Timeout(10).is_per_record());
        assert!(!RemoteError::Network("down".into()).is_per_record());
        assert!(!RemoteError::Unauthorized("expired".into()).is_per_record());
    }
}
