//! # reldb storage
//!
//! Row-oriented storage backends for reldb.
//!
//! A backend persists **relation tables** (one column per attribute plus a
//! synthetic row identifier) and an opaque metadata blob map used by the
//! engine for headers, constraint dictionaries and key declarations.
//! Backends never interpret cell contents and expose no query surface;
//! everything above row granularity belongs to the engine.
//!
//! ## Design principles
//!
//! - Backends are single-writer: one store-level transaction at a time,
//!   with snapshot/rollback semantics.
//! - Every statement a backend executes is published on the `tracing`
//!   stream at `TRACE` level.
//! - [`MemoryStore`] serves tests and ephemeral databases, [`FileStore`]
//!   persists to a locked single-file image.
//!
//! ## Example
//!
//! ```
//! use reldb_storage::{MemoryStore, StoreBackend, StoredRow};
//!
//! let mut store = MemoryStore::new();
//! store.create_rel("is_called", &["name".into(), "student".into()]).unwrap();
//! let mut row = StoredRow::new();
//! row.insert("name".into(), b"Anne".to_vec());
//! row.insert("student".into(), b"S1".to_vec());
//! store.insert_rows("is_called", vec![row]).unwrap();
//! assert_eq!(store.scan("is_called").unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod state;

pub use backend::{RowId, StoreBackend, StoredRow};
pub use error::{StoreError, StoreResult};
pub use file::FileStore;
pub use memory::MemoryStore;
