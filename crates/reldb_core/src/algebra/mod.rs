//! The in-memory relational algebra kernel.
//!
//! Headers, rows and relation values, plus the operators the engine and
//! its clients work with. Everything here is a plain value: relations are
//! immutable, operators return fresh results, and nothing at this layer
//! knows about the catalog or the store.

mod header;
mod ops;
mod relation;
mod row;
mod value;

pub use header::{is_identifier, Header};
pub use relation::Relation;
pub use row::Row;
pub use value::{AttrType, AttrValue};
