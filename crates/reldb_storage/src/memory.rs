//! In-memory storage backend.

use crate::backend::{RowId, StoreBackend, StoredRow};
use crate::error::{StoreError, StoreResult};
use crate::state::StoreState;
use tracing::trace;

/// An in-memory storage backend.
///
/// Holds all relation tables and metadata in process memory. Suitable for
/// unit tests and for ephemeral databases that do not need persistence.
///
/// Transactions snapshot the whole state at `begin`; `rollback` restores
/// the snapshot and `commit` discards it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
    backup: Option<StoreState>,
    closed: bool,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StoreBackend for MemoryStore {
    fn create_rel(&mut self, name: &str, columns: &[String]) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(rel = name, ?columns, "create_rel");
        self.state.create_rel(name, columns)
    }

    fn drop_rel(&mut self, name: &str) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(rel = name, "drop_rel");
        self.state.drop_rel(name)
    }

    fn bulk_replace(&mut self, name: &str, rows: Vec<StoredRow>) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(rel = name, rows = rows.len(), "bulk_replace");
        self.state.bulk_replace(name, rows)
    }

    fn insert_rows(&mut self, name: &str, rows: Vec<StoredRow>) -> StoreResult<Vec<RowId>> {
        self.ensure_open()?;
        trace!(rel = name, rows = rows.len(), "insert_rows");
        self.state.insert_rows(name, rows)
    }

    fn delete_rows(&mut self, name: &str, rids: &[RowId]) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(rel = name, rows = rids.len(), "delete_rows");
        self.state.delete_rows(name, rids)
    }

    fn scan(&self, name: &str) -> StoreResult<Vec<(RowId, StoredRow)>> {
        self.ensure_open()?;
        trace!(rel = name, "scan");
        self.state.scan(name)
    }

    fn relation_names(&self) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.state.relation_names())
    }

    fn save_meta(&mut self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(key, len = bytes.len(), "save_meta");
        self.state.save_meta(key, bytes);
        Ok(())
    }

    fn load_meta(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        trace!(key, "load_meta");
        Ok(self.state.load_meta(key))
    }

    fn delete_meta(&mut self, key: &str) -> StoreResult<()> {
        self.ensure_open()?;
        trace!(key, "delete_meta");
        self.state.delete_meta(key);
        Ok(())
    }

    fn list_meta(&self, prefix: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        self.ensure_open()?;
        Ok(self.state.list_meta(prefix))
    }

    fn begin(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        if self.backup.is_some() {
            return Err(StoreError::TransactionOpen);
        }
        trace!("begin");
        self.backup = Some(self.state.clone());
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        if self.backup.take().is_none() {
            return Err(StoreError::NoTransaction);
        }
        trace!("commit");
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        match self.backup.take() {
            Some(saved) => {
                trace!("rollback");
                self.state = saved;
                Ok(())
            }
            None => Err(StoreError::NoTransaction),
        }
    }

    fn flush(&mut self) -> StoreResult<()> {
        self.ensure_open()
    }

    fn close(&mut self) -> StoreResult<()> {
        if !self.closed {
            trace!("close");
            self.closed = true;
            self.backup = None;
        }
        Ok(())
    }
}
