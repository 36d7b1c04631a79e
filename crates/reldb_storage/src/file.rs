//! File-based storage backend.

use crate::backend::{RowId, StoreBackend, StoredRow};
use crate::error::{StoreError, StoreResult};
use crate::state::StoreState;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Magic bytes at the start of a store file.
const STORE_MAGIC: [u8; 4] = *b"RLDB";
/// Current store file format version.
const STORE_VERSION: u16 = 1;

/// File names inside the database directory.
const STORE_FILE: &str = "store.rdb";
const STORE_TEMP: &str = "store.rdb.tmp";
const LOCK_FILE: &str = "LOCK";

/// A file-based storage backend.
///
/// The whole store lives in one file inside the database directory:
///
/// ```text
/// <path>/
/// ├─ store.rdb    # magic + version + encoded tables and metadata
/// └─ LOCK         # advisory lock, one process at a time
/// ```
///
/// The live image stays in memory; every commit rewrites the file through
/// a temp-file-then-rename sequence, so a crash mid-write leaves the
/// previous committed image intact. The advisory lock is held for the
/// lifetime of the backend.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    state: StoreState,
    backup: Option<StoreState>,
    sync_on_commit: bool,
    closed: bool,
    // Held, never read: keeps the advisory lock alive.
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a file store in the given directory.
    ///
    /// # Errors
    ///
    /// Fails with `Locked` if another process holds the directory lock,
    /// or with `Corrupted` if the store file cannot be decoded.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_options(path, true)
    }

    /// Opens a file store, controlling whether commits sync to disk.
    pub fn open_with_options(path: &Path, sync_on_commit: bool) -> StoreResult<Self> {
        fs::create_dir_all(path)?;

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(|_| StoreError::Locked {
            path: lock_path.display().to_string(),
        })?;

        let store_path = path.join(STORE_FILE);
        let state = if store_path.exists() {
            Self::read_snapshot(&store_path)?
        } else {
            StoreState::default()
        };

        trace!(path = %path.display(), "open");
        Ok(Self {
            dir: path.to_path_buf(),
            state,
            backup: None,
            sync_on_commit,
            closed: false,
            _lock_file: lock_file,
        })
    }

    /// Checks whether a store file already exists under `path`.
    #[must_use]
    pub fn exists(path: &Path) -> bool {
        path.join(STORE_FILE).exists()
    }

    fn read_snapshot(path: &Path) -> StoreResult<StoreState> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.len() < 6 || data[0..4] != STORE_MAGIC {
            return Err(StoreError::corrupted("bad store file magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version > STORE_VERSION {
            return Err(StoreError::corrupted(format!(
                "unsupported store file version {version}"
            )));
        }

        let value = reldb_codec::from_bytes(&data[6..])?;
        StoreState::from_value(&value)
    }

    fn write_snapshot(&self, state: &StoreState) -> StoreResult<()> {
        let mut data = Vec::new();
        data.extend_from_slice(&STORE_MAGIC);
        data.extend_from_slice(&STORE_VERSION.to_le_bytes());
        data.extend_from_slice(&reldb_codec::to_bytes(&state.to_value())?);

        let temp_path = self.dir.join(STORE_TEMP);
        let final_path = self.dir.join(STORE_FILE);
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&data)?;
            file.flush()?;
            if self.sync_on_commit {
                file.sync_all()?;
            }
        }
        fs::rename(&temp_path, &final_path)?;
        Ok(())
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StoreBackend for FileStore {
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
        let backup = self.backup.take().ok_or(StoreError::NoTransaction)?;
        trace!("commit");
        if let Err(err) = self.write_snapshot(&self.state) {
            // Disk image still holds the old state: fall back to it.
            self.state = backup;
            return Err(err);
        }
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
        self.ensure_open()?;
        // Mid-transaction, the committed image is the backup.
        let committed = self.backup.as_ref().unwrap_or(&self.state);
        self.write_snapshot(committed)
    }

    fn close(&mut self) -> StoreResult<()> {
        if self.closed {
            return Ok(());
        }
        trace!("close");
        let committed = self.backup.take().unwrap_or_else(|| self.state.clone());
        self.write_snapshot(&committed)?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
