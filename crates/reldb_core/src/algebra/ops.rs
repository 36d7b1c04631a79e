//! Relational operators.
//!
//! Operators are methods on [`Relation`] and always return fresh values.
//! Filtering and computation take host-language closures; the textual
//! predicate surface lives in the expression compiler, not here.

use crate::algebra::{AttrType, AttrValue, Header, Relation, Row};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

impl Relation {
    /// Set union. Both operands must share this relation's header.
    pub fn union(&self, other: &Relation) -> Result<Relation> {
        self.check_same_header(other)?;
        let mut result = self.clone();
        for row in other.rows() {
            result.insert_unchecked(row.clone());
        }
        Ok(result)
    }

    /// Set difference: rows of `self` not present in `other`.
    pub fn minus(&self, other: &Relation) -> Result<Relation> {
        self.check_same_header(other)?;
        let mut result = Relation::empty(self.header().clone());
        for row in self.rows() {
            if !other.contains(row) {
                result.insert_unchecked(row.clone());
            }
        }
        Ok(result)
    }

    /// Projection onto the given attribute names.
    pub fn project<'a, I>(&self, names: I) -> Result<Relation>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut attrs = BTreeMap::new();
        for name in names {
            let attr_type = self
                .header()
                .get(name)
                .ok_or_else(|| Error::unknown_attribute("", name))?;
            attrs.insert(name.to_string(), attr_type.clone());
        }
        let header = Header::from_attrs_unchecked(attrs);
        let mut result = Relation::empty(header.clone());
        let names: Vec<&str> = header.names().collect();
        for row in self.rows() {
            result.insert_unchecked(row.project(names.iter().copied()));
        }
        Ok(result)
    }

    /// Restriction: the rows for which `predicate` holds.
    #[must_use]
    pub fn restrict<F>(&self, predicate: F) -> Relation
    where
        F: Fn(&Row) -> bool,
    {
        let mut result = Relation::empty(self.header().clone());
        for row in self.rows() {
            if predicate(row) {
                result.insert_unchecked(row.clone());
            }
        }
        result
    }

    /// Extension: adds attribute `name` of type `attr_type`, computed per
    /// row.
    pub fn extend<F>(&self, name: &str, attr_type: AttrType, f: F) -> Result<Relation>
    where
        F: Fn(&Row) -> AttrValue,
    {
        if self.header().contains(name) {
            return Err(Error::name_invalid(name, "attribute already present"));
        }
        let mut attrs: BTreeMap<String, AttrType> = self
            .header()
            .iter()
            .map(|(n, t)| (n.to_string(), t.clone()))
            .collect();
        attrs.insert(name.to_string(), attr_type.clone());
        let mut result = Relation::empty(Header::from_attrs_unchecked(attrs));
        for row in self.rows() {
            let value = f(row);
            if value.attr_type() != attr_type {
                return Err(Error::AttrTypeMismatch {
                    relation: String::new(),
                    attr: name.to_string(),
                    expected: attr_type,
                    actual: value.attr_type(),
                });
            }
            result.insert_unchecked(row.with(name, value));
        }
        Ok(result)
    }

    /// Renames attributes; `renames` maps old name to new name.
    pub fn rename(&self, renames: &[(&str, &str)]) -> Result<Relation> {
        let mut attrs: BTreeMap<String, AttrType> = self
            .header()
            .iter()
            .map(|(n, t)| (n.to_string(), t.clone()))
            .collect();
        for (old, new) in renames {
            let attr_type = attrs
                .remove(*old)
                .ok_or_else(|| Error::unknown_attribute("", *old))?;
            if attrs.insert((*new).to_string(), attr_type).is_some() {
                return Err(Error::name_invalid(*new, "attribute already present"));
            }
        }
        let header = Header::from_attrs(attrs)?;
        let mut result = Relation::empty(header);
        for row in self.rows() {
            let mut renamed = row.clone();
            for (old, new) in renames {
                if let Some(value) = row.get(old) {
                    renamed = renamed.without(old).with(*new, value.clone());
                }
            }
            result.insert_unchecked(renamed);
        }
        Ok(result)
    }

    /// Natural join on the attributes common to both headers.
    ///
    /// Common attributes must agree on type. With no common attributes
    /// this is the cross product.
    pub fn join(&self, other: &Relation) -> Result<Relation> {
        let common = self.common_attrs(other)?;

        let mut attrs: BTreeMap<String, AttrType> = self
            .header()
            .iter()
            .map(|(n, t)| (n.to_string(), t.clone()))
            .collect();
        for (name, attr_type) in other.header().iter() {
            attrs.insert(name.to_string(), attr_type.clone());
        }
        let mut result = Relation::empty(Header::from_attrs_unchecked(attrs));

        for left in self.rows() {
            for right in other.rows() {
                if common
                    .iter()
                    .all(|name| left.get(name) == right.get(name))
                {
                    let mut merged = left.clone();
                    for (name, value) in right.iter() {
                        merged = merged.with(name, value.clone());
                    }
                    result.insert_unchecked(merged);
                }
            }
        }
        Ok(result)
    }

    /// Semijoin: the rows of `self` that match some row of `other` on
    /// their common attributes.
    pub fn matching(&self, other: &Relation) -> Result<Relation> {
        let common = self.common_attrs(other)?;
        Ok(self.restrict(|row| {
            other
                .rows()
                .any(|o| common.iter().all(|name| row.get(name) == o.get(name)))
        }))
    }

    /// Antijoin: the rows of `self` that match no row of `other` on their
    /// common attributes.
    pub fn not_matching(&self, other: &Relation) -> Result<Relation> {
        let common = self.common_attrs(other)?;
        Ok(self.restrict(|row| {
            !other
                .rows()
                .any(|o| common.iter().all(|name| row.get(name) == o.get(name)))
        }))
    }

    /// Computes one value per row, in row order.
    #[must_use]
    pub fn compute<F, T>(&self, f: F) -> Vec<T>
    where
        F: Fn(&Row) -> T,
    {
        self.rows().map(f).collect()
    }

    fn check_same_header(&self, other: &Relation) -> Result<()> {
        if self.header() != other.header() {
            return Err(Error::HeaderMismatch {
                relation: String::new(),
                expected: self.header().clone(),
                actual: other.header().clone(),
            });
        }
        Ok(())
    }

    fn common_attrs(&self, other: &Relation) -> Result<Vec<String>> {
        let mut common = Vec::new();
        for (name, attr_type) in self.header().iter() {
            if let Some(other_type) = other.header().get(name) {
                if other_type != attr_type {
                    return Err(Error::AttrTypeMismatch {
                        relation: String::new(),
                        attr: name.to_string(),
                        expected: attr_type.clone(),
                        actual: other_type.clone(),
                    });
                }
                common.push(name.to_string());
            }
        }
        Ok(common)
    }
}
