//! Mapping between engine values and the store's wire values.
//!
//! Attribute cells, headers, constraint dictionaries and key declarations
//! all lower to `reldb_codec::Value` here. Decoding is expectation-driven:
//! a cell is decoded against its attribute's declared type, and domain
//! values re-validate through the namespace's registered constructor.

use crate::algebra::{AttrType, AttrValue, Header, Row};
use crate::error::{Error, Result};
use crate::expr::Compiled;
use crate::namespace::Namespace;
use reldb_codec::{from_bytes, to_bytes, CodecError, Value};
use reldb_storage::StoredRow;
use std::collections::{BTreeMap, BTreeSet};

fn attr_to_value(attr: &AttrValue) -> Value {
    match attr {
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Int(n) => Value::Int(*n),
        AttrValue::Text(s) => Value::Text(s.clone()),
        AttrValue::Domain { name, value } => Value::List(vec![
            Value::Text(name.clone()),
            attr_to_value(value),
        ]),
    }
}

fn value_to_attr(value: &Value, ns: &Namespace) -> Result<AttrValue> {
    match value {
        Value::Bool(b) => Ok(AttrValue::Bool(*b)),
        Value::Int(n) => Ok(AttrValue::Int(*n)),
        Value::Text(s) => Ok(AttrValue::Text(s.clone())),
        Value::List(items) => match items.as_slice() {
            [Value::Text(name), inner] => {
                let inner = value_to_attr(inner, ns)?;
                ns.wrap_domain(name, inner).map_err(Error::Expr)
            }
            _ => Err(bad_cell("malformed domain value")),
        },
        other => Err(bad_cell(format!("unexpected {} in cell", other.kind()))),
    }
}

fn bad_cell(message: impl Into<String>) -> Error {
    Error::Codec(CodecError::invalid_structure(message))
}

/// Encodes one attribute value to cell bytes.
pub(crate) fn encode_attr(attr: &AttrValue) -> Result<Vec<u8>> {
    Ok(to_bytes(&attr_to_value(attr))?)
}

/// Decodes cell bytes against a declared attribute type.
pub(crate) fn decode_attr(
    bytes: &[u8],
    expected: &AttrType,
    ns: &Namespace,
) -> Result<AttrValue> {
    let attr = value_to_attr(&from_bytes(bytes)?, ns)?;
    let actual = attr.attr_type();
    if actual != *expected {
        return Err(bad_cell(format!(
            "cell holds {actual}, header declares {expected}"
        )));
    }
    Ok(attr)
}

/// Encodes a row to its stored cells.
pub(crate) fn encode_row(row: &Row) -> Result<StoredRow> {
    let mut cells = StoredRow::new();
    for (name, value) in row.iter() {
        cells.insert(name.to_string(), encode_attr(value)?);
    }
    Ok(cells)
}

/// Decodes stored cells against a header.
pub(crate) fn decode_row(cells: &StoredRow, header: &Header, ns: &Namespace) -> Result<Row> {
    let mut values = Vec::with_capacity(header.len());
    for (name, attr_type) in header.iter() {
        let bytes = cells
            .get(name)
            .ok_or_else(|| bad_cell(format!("row is missing cell {name:?}")))?;
        values.push((name.to_string(), decode_attr(bytes, attr_type, ns)?));
    }
    Ok(Row::new(values))
}

/// Encodes a header as a name-to-type-tag map.
pub(crate) fn encode_header(header: &Header) -> Result<Vec<u8>> {
    let value = Value::Map(
        header
            .iter()
            .map(|(name, attr_type)| (name.to_string(), Value::Text(attr_type.tag().to_string())))
            .collect(),
    );
    Ok(to_bytes(&value)?)
}

/// Decodes a header blob.
pub(crate) fn decode_header(bytes: &[u8]) -> Result<Header> {
    let value = from_bytes(bytes)?;
    let map = value
        .as_map()
        .ok_or_else(|| bad_cell("header blob is not a map"))?;
    let mut attrs = Vec::with_capacity(map.len());
    for (name, tag) in map {
        let tag = tag
            .as_text()
            .ok_or_else(|| bad_cell(format!("type tag for {name:?} is not text")))?;
        attrs.push((name.clone(), AttrType::from_tag(tag)));
    }
    Header::from_attrs(attrs)
}

/// Encodes a constraint dictionary as a name-to-source map.
pub(crate) fn encode_constraints(constraints: &BTreeMap<String, Compiled>) -> Result<Vec<u8>> {
    let value = Value::Map(
        constraints
            .iter()
            .map(|(name, compiled)| (name.clone(), Value::Text(compiled.source().to_string())))
            .collect(),
    );
    Ok(to_bytes(&value)?)
}

/// Decodes a constraint dictionary blob, compiling each predicate.
pub(crate) fn decode_constraints(bytes: &[u8]) -> Result<BTreeMap<String, Compiled>> {
    let value = from_bytes(bytes)?;
    let map = value
        .as_map()
        .ok_or_else(|| bad_cell("constraint blob is not a map"))?;
    let mut constraints = BTreeMap::new();
    for (name, source) in map {
        let source = source
            .as_text()
            .ok_or_else(|| bad_cell(format!("constraint {name:?} source is not text")))?;
        constraints.insert(name.clone(), Compiled::compile(source)?);
    }
    Ok(constraints)
}

/// Encodes a key declaration as a sorted list of attribute names.
pub(crate) fn encode_key(key: &BTreeSet<String>) -> Result<Vec<u8>> {
    let value = Value::List(key.iter().map(|name| Value::Text(name.clone())).collect());
    Ok(to_bytes(&value)?)
}

/// Decodes a key declaration blob.
pub(crate) fn decode_key(bytes: &[u8]) -> Result<BTreeSet<String>> {
    let value = from_bytes(bytes)?;
    let items = value
        .as_list()
        .ok_or_else(|| bad_cell("key blob is not a list"))?;
    let mut key = BTreeSet::new();
    for item in items {
        let name = item
            .as_text()
            .ok_or_else(|| bad_cell("key attribute is not text"))?;
        key.insert(name.to_string());
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{header, row};

    fn sid(s: &str) -> AttrValue {
        AttrValue::domain("SID", AttrValue::from(s))
    }

    #[test]
    fn attr_roundtrip_primitives() {
        let ns = Namespace::new();
        for (value, attr_type) in [
            (AttrValue::from(85), AttrType::Int),
            (AttrValue::from("Anne"), AttrType::Text),
            (AttrValue::from(true), AttrType::Bool),
        ] {
            let bytes = encode_attr(&value).unwrap();
            assert_eq!(decode_attr(&bytes, &attr_type, &ns).unwrap(), value);
        }
    }

    #[test]
    fn attr_roundtrip_domain() {
        let mut ns = Namespace::new();
        ns.register_domain("SID", AttrType::Text).unwrap();
        let value = sid("S1");
        let bytes = encode_attr(&value).unwrap();
        let decoded = decode_attr(&bytes, &AttrType::Domain("SID".into()), &ns).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn decode_validates_against_registered_domain() {
        let mut ns = Namespace::new();
        ns.register_domain_with("SID", AttrType::Text, |v| {
            if v.as_text().is_some_and(|s| s.starts_with('S')) {
                Ok(())
            } else {
                Err("must start with S".into())
            }
        })
        .unwrap();

        let bytes = encode_attr(&AttrValue::domain("SID", AttrValue::from("X9"))).unwrap();
        let result = decode_attr(&bytes, &AttrType::Domain("SID".into()), &ns);
        assert!(result.is_err());
    }

    #[test]
    fn decode_rejects_type_drift() {
        let ns = Namespace::new();
        let bytes = encode_attr(&AttrValue::from(85)).unwrap();
        assert!(decode_attr(&bytes, &AttrType::Text, &ns).is_err());
    }

    #[test]
    fn row_roundtrip() {
        let mut ns = Namespace::new();
        ns.register_domain("SID", AttrType::Text).unwrap();
        let header = header! { student: AttrType::Domain("SID".into()), mark: AttrType::Int };
        let row = Row::new([("student", sid("S1")), ("mark", AttrValue::from(85))]);

        let cells = encode_row(&row).unwrap();
        assert_eq!(decode_row(&cells, &header, &ns).unwrap(), row);
    }

    #[test]
    fn row_missing_cell_rejected() {
        let ns = Namespace::new();
        let header = header! { a: AttrType::Int, b: AttrType::Int };
        let cells = encode_row(&row! { a: 1 }).unwrap();
        assert!(decode_row(&cells, &header, &ns).is_err());
    }

    #[test]
    fn header_roundtrip() {
        let header = header! {
            course: AttrType::Domain("CID".into()),
            mark: AttrType::Int,
            name: AttrType::Text,
        };
        let bytes = encode_header(&header).unwrap();
        assert_eq!(decode_header(&bytes).unwrap(), header);
    }

    #[test]
    fn constraints_roundtrip_and_recompile() {
        let mut constraints = BTreeMap::new();
        constraints.insert(
            "valid_mark".to_string(),
            Compiled::compile("0 <= mark <= 100").unwrap(),
        );
        let bytes = encode_constraints(&constraints).unwrap();
        let decoded = decode_constraints(&bytes).unwrap();
        assert_eq!(decoded["valid_mark"].source(), "0 <= mark <= 100");
    }

    #[test]
    fn key_roundtrip() {
        let key: BTreeSet<String> = ["student".to_string(), "course".to_string()].into();
        let bytes = encode_key(&key).unwrap();
        assert_eq!(decode_key(&bytes).unwrap(), key);
        assert_eq!(decode_key(&encode_key(&BTreeSet::new()).unwrap()).unwrap(), BTreeSet::new());
    }
}
