//! Relation headers.

use crate::algebra::AttrType;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Checks whether `name` is a valid identifier: a letter or underscore
/// followed by letters, digits or underscores.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// An unordered mapping from attribute name to attribute type.
///
/// Two headers are equal iff their name-to-type maps are equal; attribute
/// order never matters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    attrs: BTreeMap<String, AttrType>,
}

impl Header {
    /// Creates an empty header (the header of a nullary relation).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a header from attribute declarations.
    ///
    /// # Errors
    ///
    /// Fails with `NameInvalid` if an attribute name is not an identifier
    /// or is declared twice.
    pub fn from_attrs<N, I>(attrs: I) -> Result<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, AttrType)>,
    {
        let mut map = BTreeMap::new();
        for (name, attr_type) in attrs {
            let name = name.into();
            if !is_identifier(&name) {
                return Err(Error::name_invalid(&name, "not an identifier"));
            }
            if map.insert(name.clone(), attr_type).is_some() {
                return Err(Error::name_invalid(&name, "duplicate attribute"));
            }
        }
        Ok(Self { attrs: map })
    }

    /// Builds a header without name validation, for headers derived from
    /// values that already exist.
    pub(crate) fn from_attrs_unchecked(attrs: BTreeMap<String, AttrType>) -> Self {
        Self { attrs }
    }

    /// Looks up an attribute's type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttrType> {
        self.attrs.get(name)
    }

    /// Checks whether an attribute is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Iterates attribute names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Iterates (name, type) pairs in sorted name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrType)> {
        self.attrs.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Number of attributes (the relation's degree).
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Checks whether the header has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, attr_type)) in self.attrs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {attr_type}")?;
        }
        write!(f, "}}")
    }
}

/// Builds a [`Header`] from `name: type` declarations.
///
/// ```
/// use reldb_core::{header, AttrType};
///
/// let h = header! { student: AttrType::Domain("SID".into()), mark: AttrType::Int };
/// assert_eq!(h.len(), 2);
/// ```
///
/// # Panics
///
/// Panics on duplicate attribute names; the macro is meant for literal
/// headers, where that is a programming error.
#[macro_export]
macro_rules! header {
    { $($name:ident : $attr_type:expr),* $(,)? } => {
        $crate::Header::from_attrs([
            $((stringify!($name), $attr_type)),*
        ]).expect("invalid header literal")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("mark"));
        assert!(is_identifier("_key"));
        assert!(is_identifier("a1_b2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier("dash-ed"));
    }

    #[test]
    fn equality_ignores_declaration_order() {
        let a = Header::from_attrs([("x", AttrType::Int), ("y", AttrType::Text)]).unwrap();
        let b = Header::from_attrs([("y", AttrType::Text), ("x", AttrType::Int)]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn differing_types_differ() {
        let a = Header::from_attrs([("x", AttrType::Int)]).unwrap();
        let b = Header::from_attrs([("x", AttrType::Text)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn invalid_attr_name_rejected() {
        let result = Header::from_attrs([("not ok", AttrType::Int)]);
        assert!(matches!(result, Err(Error::NameInvalid { .. })));
    }

    #[test]
    fn duplicate_attr_rejected() {
        let result = Header::from_attrs([("x", AttrType::Int), ("x", AttrType::Int)]);
        assert!(matches!(result, Err(Error::NameInvalid { .. })));
    }

    #[test]
    fn display_is_sorted() {
        let h = Header::from_attrs([("b", AttrType::Int), ("a", AttrType::Text)]).unwrap();
        assert_eq!(h.to_string(), "{a: text, b: int}");
    }
}
