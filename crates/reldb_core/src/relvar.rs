//! Persistent relation handles.

use crate::algebra::{Header, Relation, Row};
use crate::database::Session;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};

/// Rows accepted by [`RelVar::insert`]: a single row or a whole relation
/// value.
#[derive(Debug, Clone)]
pub enum Rows {
    /// One row.
    One(Row),
    /// Every row of a relation value.
    Relation(Relation),
}

impl From<Row> for Rows {
    fn from(row: Row) -> Self {
        Rows::One(row)
    }
}

impl From<Relation> for Rows {
    fn from(relation: Relation) -> Self {
        Rows::Relation(relation)
    }
}

/// A handle to one persistent relation.
///
/// The handle refers back to the session it came from; it holds no
/// relation data itself. Reads return freshly built relation values that
/// are independent of the database, and every mutation routes through the
/// session's transaction stack. A handle that outlives its session, or
/// whose database has been closed, fails every operation with
/// [`Error::Disconnected`].
#[derive(Clone)]
pub struct RelVar {
    name: String,
    session: Weak<Session>,
}

impl RelVar {
    pub(crate) fn new(name: String, session: Weak<Session>) -> Self {
        Self { name, session }
    }

    fn session(&self) -> Result<Arc<Session>> {
        self.session.upgrade().ok_or(Error::Disconnected)
    }

    /// The relation's name in the catalog.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current relation value, as seen by this client.
    pub fn value(&self) -> Result<Relation> {
        Ok(self.session()?.view_entry(&self.name)?.relation)
    }

    /// The declared header.
    pub fn header(&self) -> Result<Header> {
        Ok(self.session()?.view_entry(&self.name)?.header)
    }

    /// The declared key attributes; empty means no key declared.
    pub fn key(&self) -> Result<BTreeSet<String>> {
        Ok(self.session()?.view_entry(&self.name)?.key)
    }

    /// A read-only copy of the row-constraint dictionary
    /// (name to predicate source).
    pub fn row_constraints(&self) -> Result<BTreeMap<String, String>> {
        let entry = self.session()?.view_entry(&self.name)?;
        Ok(entry
            .constraints
            .iter()
            .map(|(name, compiled)| (name.clone(), compiled.source().to_string()))
            .collect())
    }

    /// Current number of rows.
    pub fn count(&self) -> Result<usize> {
        Ok(self.session()?.view_entry(&self.name)?.relation.len())
    }

    /// Inserts a row or a relation value's rows.
    ///
    /// The incoming header must equal the declared header; the grown
    /// relation must satisfy every row constraint and the key invariant.
    pub fn insert(&self, rows: impl Into<Rows>) -> Result<()> {
        self.session()?.insert(&self.name, rows.into())
    }

    /// Rebuilds every row matching `where_src` by evaluating each
    /// assignment's right-hand side in that row's scope.
    pub fn update(&self, where_src: &str, assignments: &[(&str, &str)]) -> Result<()> {
        self.session()?.update(&self.name, where_src, assignments)
    }

    /// Deletes every row matching `where_src`.
    pub fn delete(&self, where_src: &str) -> Result<()> {
        self.session()?.delete(&self.name, where_src)
    }

    /// Wholesale replacement by a relation value with an equal header.
    pub fn assign(&self, value: Relation) -> Result<()> {
        self.session()?.assign(&self.name, value)
    }
}

impl fmt::Debug for RelVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelVar")
            .field("name", &self.name)
            .field("connected", &(self.session.strong_count() > 0))
            .finish()
    }
}
