//! Relation values.

use crate::algebra::{Header, Row};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fmt;

/// A relation value: a set of rows sharing one header.
///
/// Relations are immutable at the algebra level: every operator returns
/// a fresh value. Rows are kept in a `BTreeSet`, so iteration order is
/// deterministic and duplicate rows collapse.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Relation {
    header: Header,
    rows: BTreeSet<Row>,
}

impl Relation {
    /// Creates an empty relation with the given header.
    #[must_use]
    pub fn empty(header: Header) -> Self {
        Self {
            header,
            rows: BTreeSet::new(),
        }
    }

    /// Builds a relation from a header and rows.
    ///
    /// # Errors
    ///
    /// Fails with `HeaderMismatch` if any row's derived header differs
    /// from `header`.
    pub fn from_rows<I>(header: Header, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut set = BTreeSet::new();
        for row in rows {
            let row_header = row.header();
            if row_header != header {
                return Err(Error::HeaderMismatch {
                    relation: String::new(),
                    expected: header,
                    actual: row_header,
                });
            }
            set.insert(row);
        }
        Ok(Self { header, rows: set })
    }

    /// The relation's header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Iterates rows in deterministic order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Number of rows (the relation's cardinality).
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Checks whether the relation has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Checks row membership.
    #[must_use]
    pub fn contains(&self, row: &Row) -> bool {
        self.rows.contains(row)
    }

    /// Inserts a row known to match the header.
    pub(crate) fn insert_unchecked(&mut self, row: Row) {
        self.rows.insert(row);
    }
}

impl fmt::Display for Relation {
    /// Renders the relation as a text table, columns and rows sorted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self.header.names().collect();
        let mut cells: Vec<Vec<String>> = vec![columns.iter().map(|c| (*c).to_string()).collect()];
        for row in &self.rows {
            cells.push(
                columns
                    .iter()
                    .map(|c| row.get(c).map(ToString::to_string).unwrap_or_default())
                    .collect(),
            );
        }

        let mut widths = vec![0usize; columns.len()];
        for line in &cells {
            for (i, cell) in line.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let sep = {
            let mut s = String::from("+");
            for w in &widths {
                s.push_str(&"-".repeat(w + 2));
                s.push('+');
            }
            s
        };
        let line = |cells: &[String]| {
            let mut s = String::from("|");
            for (cell, w) in cells.iter().zip(&widths) {
                s.push(' ');
                s.push_str(cell);
                s.push_str(&" ".repeat(w - cell.len() + 1));
                s.push('|');
            }
            s
        };

        writeln!(f, "{sep}")?;
        writeln!(f, "{}", line(&cells[0]))?;
        writeln!(f, "{sep}")?;
        for row_cells in &cells[1..] {
            writeln!(f, "{}", line(row_cells))?;
        }
        write!(f, "{sep}")
    }
}
