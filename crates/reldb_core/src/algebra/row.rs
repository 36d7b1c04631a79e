//! Row values.

use crate::algebra::{AttrValue, Header};
use std::collections::BTreeMap;
use std::fmt;

/// One row: a mapping from attribute name to attribute value.
///
/// Rows are plain values: structural equality, total ordering (so a set
/// of rows iterates deterministically) and hashing all follow from the
/// attribute contents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Row {
    values: BTreeMap<String, AttrValue>,
}

impl Row {
    /// Builds a row from attribute assignments.
    ///
    /// Later duplicates of a name replace earlier ones.
    pub fn new<N, I>(values: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, AttrValue)>,
    {
        Self {
            values: values.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    /// Looks up an attribute's value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    /// The header this row inhabits, derived from its value types.
    #[must_use]
    pub fn header(&self) -> Header {
        Header::from_attrs_unchecked(
            self.values
                .iter()
                .map(|(n, v)| (n.clone(), v.attr_type()))
                .collect(),
        )
    }

    /// Iterates attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Iterates (name, value) pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Checks whether the row has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The sub-row over the given attribute names.
    ///
    /// Names absent from the row are skipped.
    #[must_use]
    pub fn project<'a, I>(&self, names: I) -> Row
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values = BTreeMap::new();
        for name in names {
            if let Some(value) = self.values.get(name) {
                values.insert(name.to_string(), value.clone());
            }
        }
        Self { values }
    }

    /// A copy of this row with one attribute replaced or added.
    #[must_use]
    pub fn with(&self, name: impl Into<String>, value: AttrValue) -> Row {
        let mut values = self.values.clone();
        values.insert(name.into(), value);
        Self { values }
    }

    /// A copy of this row without the given attribute.
    #[must_use]
    pub fn without(&self, name: &str) -> Row {
        let mut values = self.values.clone();
        values.remove(name);
        Self { values }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

/// Builds a [`Row`] from `name: value` assignments; values go through
/// `AttrValue::from`.
///
/// ```
/// use reldb_core::row;
///
/// let r = row! { student: "S1", mark: 85 };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! row {
    { $($name:ident : $value:expr),* $(,)? } => {
        $crate::Row::new([
            $((stringify!($name), $crate::AttrValue::from($value))),*
        ])
    };
}
