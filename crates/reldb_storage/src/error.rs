//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A relation table is missing from the store.
    #[error("store has no relation table {name:?}")]
    UnknownRelation {
        /// The missing relation name.
        name: String,
    },

    /// A relation table already exists.
    #[error("relation table {name:?} already exists")]
    RelationExists {
        /// The duplicate relation name.
        name: String,
    },

    /// A row's cells do not match the table's columns.
    #[error("row columns do not match table {name:?}: expected {expected:?}, got {got:?}")]
    ColumnMismatch {
        /// The relation name.
        name: String,
        /// Columns declared for the table.
        expected: Vec<String>,
        /// Columns present in the rejected row.
        got: Vec<String>,
    },

    /// A commit or rollback was issued with no transaction open.
    #[error("no store transaction is open")]
    NoTransaction,

    /// A begin was issued while a transaction is already open.
    #[error("a store transaction is already open")]
    TransactionOpen,

    /// The store has been closed.
    #[error("store is closed")]
    Closed,

    /// Another process holds the database lock.
    #[error("database is locked by another process: {path}")]
    Locked {
        /// Path of the lock file.
        path: String,
    },

    /// The on-disk image could not be understood.
    #[error("store file corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

impl StoreError {
    /// Creates an unknown-relation error.
    pub fn unknown_relation(name: impl Into<String>) -> Self {
        Self::UnknownRelation { name: name.into() }
    }

    /// Creates a corrupted-store error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl From<reldb_codec::CodecError> for StoreError {
    fn from(err: reldb_codec::CodecError) -> Self {
        Self::Corrupted {
            message: err.to_string(),
        }
    }
}
