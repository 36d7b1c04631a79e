//! Store backend trait definition.

use crate::error::StoreResult;
use std::collections::BTreeMap;
use std::fmt;

/// Synthetic row identifier assigned by the store.
///
/// Every stored row carries a `RowId` in addition to its attribute cells;
/// identifiers are unique within one relation table and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub u64);

impl RowId {
    /// Creates a row identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid:{}", self.0)
    }
}

/// One stored row: column name to encoded cell bytes.
///
/// Cells are opaque to the store; the engine's codec layer owns their
/// interpretation.
pub type StoredRow = BTreeMap<String, Vec<u8>>;

/// A row-oriented storage backend.
///
/// Backends persist relation tables (one column per attribute plus the
/// synthetic [`RowId`]) and an opaque metadata blob map. They interpret
/// neither cells nor metadata; the engine owns every format decision.
///
/// # Transactions
///
/// Backends are single-writer. `begin` opens one store-level transaction;
/// every mutation between `begin` and `commit` becomes visible (and, for
/// persistent backends, durable) atomically at `commit`. `rollback`
/// restores the pre-transaction state. Mutations issued outside a
/// transaction apply immediately.
///
/// # Implementors
///
/// - [`super::MemoryStore`] for tests and ephemeral databases
/// - [`super::FileStore`] for persistent storage
pub trait StoreBackend: Send {
    /// Creates an empty relation table with the given columns.
    ///
    /// # Errors
    ///
    /// Fails with `RelationExists` if a table of that name exists.
    fn create_rel(&mut self, name: &str, columns: &[String]) -> StoreResult<()>;

    /// Removes a relation table and all its rows.
    fn drop_rel(&mut self, name: &str) -> StoreResult<()>;

    /// Atomically replaces every row of one relation table.
    fn bulk_replace(&mut self, name: &str, rows: Vec<StoredRow>) -> StoreResult<()>;

    /// Appends rows to a relation table, returning their new identifiers.
    fn insert_rows(&mut self, name: &str, rows: Vec<StoredRow>) -> StoreResult<Vec<RowId>>;

    /// Deletes rows from a relation table by identifier.
    ///
    /// Unknown identifiers are ignored.
    fn delete_rows(&mut self, name: &str, rids: &[RowId]) -> StoreResult<()>;

    /// Reads every row of a relation table.
    fn scan(&self, name: &str) -> StoreResult<Vec<(RowId, StoredRow)>>;

    /// Lists the names of all relation tables.
    fn relation_names(&self) -> StoreResult<Vec<String>>;

    /// Stores an opaque metadata blob under `key`, replacing any previous
    /// value.
    fn save_meta(&mut self, key: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Loads the metadata blob stored under `key`, if any.
    fn load_meta(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Removes the metadata blob stored under `key`, if any.
    fn delete_meta(&mut self, key: &str) -> StoreResult<()>;

    /// Lists all metadata entries whose key starts with `prefix`.
    fn list_meta(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;

    /// Opens the single store-level transaction.
    ///
    /// # Errors
    ///
    /// Fails with `TransactionOpen` if one is already open.
    fn begin(&mut self) -> StoreResult<()>;

    /// Publishes the open transaction.
    fn commit(&mut self) -> StoreResult<()>;

    /// Discards the open transaction, restoring the prior state.
    fn rollback(&mut self) -> StoreResult<()>;

    /// Pushes pending state to durable storage.
    fn flush(&mut self) -> StoreResult<()>;

    /// Flushes and releases the store. Subsequent operations fail with
    /// `Closed`.
    fn close(&mut self) -> StoreResult<()>;
}
