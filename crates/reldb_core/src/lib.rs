//! # reldb core
//!
//! An embedded relational database engine whose query language is the
//! relational algebra, not SQL.
//!
//! Clients build typed relation values in memory, bind them to names in
//! a database backed by a row-oriented store, declare row constraints
//! and keys, and mutate them through insert/update/delete and
//! transactional assignment. The engine guarantees that every row of
//! every stored relation satisfies the declared header type, every row
//! predicate, and the declared key.
//!
//! - [`algebra`]: headers, rows, relation values and operators
//! - [`Database`]: the facade for catalog, constraints and transactions
//! - [`RelVar`]: handles to persistent relations
//! - predicates are source text, compiled on the way in and persisted
//!   verbatim
//!
//! ## Example
//!
//! ```
//! use reldb_core::{header, row, AttrType, Database};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.register_domain("SID", AttrType::Text).unwrap();
//!
//! db.set("exam_marks", header! { student: AttrType::Text, mark: AttrType::Int })
//!     .unwrap();
//! db.constrain_rows("exam_marks", [("valid_mark", "0 <= mark <= 100")])
//!     .unwrap();
//!
//! let marks = db.get("exam_marks").unwrap();
//! marks.insert(row! { student: "S1", mark: 85 }).unwrap();
//! assert!(marks.insert(row! { student: "S1", mark: 102 }).is_err());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod algebra;
mod catalog;
mod codec;
mod config;
mod constraint;
mod database;
mod error;
mod expr;
mod namespace;
mod relvar;
mod transaction;

pub use algebra::{AttrType, AttrValue, Header, Relation, Row};
pub use config::Config;
pub use database::{Database, NativePredicate, Predicate, RelationSource};
pub use error::{Error, Result};
pub use expr::{Compiled, ExprError};
pub use namespace::{default_registry, DomainDef, Namespace};
pub use relvar::{RelVar, Rows};
