//! Binary decoder.

use crate::encoder::tag;
use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// Decodes a single value from `data`.
///
/// The entire input must be consumed; trailing bytes are an error.
pub fn from_bytes(data: &[u8]) -> CodecResult<Value> {
    let mut decoder = Decoder::new(data);
    let value = decoder.decode()?;
    let remaining = decoder.remaining();
    if remaining != 0 {
        return Err(CodecError::TrailingBytes { remaining });
    }
    Ok(value)
}

/// A cursor-style decoder over a byte slice.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Decodes the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let offset = self.pos;
        let tag_byte = self.take_u8()?;
        match tag_byte {
            tag::NULL => Ok(Value::Null),
            tag::FALSE => Ok(Value::Bool(false)),
            tag::TRUE => Ok(Value::Bool(true)),
            tag::INT => {
                let raw = self.take_slice(8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(raw);
                Ok(Value::Int(i64::from_le_bytes(buf)))
            }
            tag::TEXT => {
                let len = self.take_len()?;
                let raw = self.take_slice(len)?;
                let text = std::str::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            tag::BYTES => {
                let len = self.take_len()?;
                Ok(Value::Bytes(self.take_slice(len)?.to_vec()))
            }
            tag::LIST => {
                let count = self.take_len()?;
                let mut items = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    items.push(self.decode()?);
                }
                Ok(Value::List(items))
            }
            tag::MAP => {
                let count = self.take_len()?;
                let mut pairs = BTreeMap::new();
                let mut last_key: Option<String> = None;
                for _ in 0..count {
                    let key_len = self.take_len()?;
                    let raw = self.take_slice(key_len)?;
                    let key = std::str::from_utf8(raw)
                        .map_err(|_| CodecError::InvalidUtf8)?
                        .to_string();
                    if let Some(ref prev) = last_key {
                        if *prev >= key {
                            return Err(CodecError::invalid_structure(format!(
                                "map keys out of order: {prev:?} then {key:?}"
                            )));
                        }
                    }
                    let val = self.decode()?;
                    last_key = Some(key.clone());
                    pairs.insert(key, val);
                }
                Ok(Value::Map(pairs))
            }
            other => Err(CodecError::UnknownTag { tag: other, offset }),
        }
    }

    fn take_u8(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::unexpected_eof(self.pos));
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    fn take_len(&mut self) -> CodecResult<usize> {
        let raw = self.take_slice(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(raw);
        let len = u32::from_le_bytes(buf);
        usize::try_from(len).map_err(|_| CodecError::LengthOverflow {
            length: u64::from(len),
        })
    }

    fn take_slice(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(CodecError::LengthOverflow { length: len as u64 })?;
        if end > self.data.len() {
            return Err(CodecError::unexpected_eof(self.data.len()));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::to_bytes;

    #[test]
    fn empty_input_is_eof() {
        assert!(matches!(
            from_bytes(&[]),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn unknown_tag_reports_offset() {
        let err = from_bytes(&[0x7f]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::UnknownTag {
                tag: 0x7f,
                offset: 0
            }
        ));
    }

    #[test]
    fn truncated_int_fails() {
        let result = from_bytes(&[tag::INT, 1, 2, 3]);
        assert!(matches!(result, Err(CodecError::UnexpectedEof { .. })));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = to_bytes(&Value::Int(5)).unwrap();
        bytes.push(0x00);
        assert!(matches!(
            from_bytes(&bytes),
            Err(CodecError::TrailingBytes { remaining: 1 })
        ));
    }

    #[test]
    fn invalid_utf8_rejected() {
        let bytes = vec![tag::TEXT, 1, 0, 0, 0, 0xff];
        assert!(matches!(from_bytes(&bytes), Err(CodecError::InvalidUtf8)));
    }

    #[test]
    fn out_of_order_map_keys_rejected() {
        // Hand-built map with keys "b" then "a".
        let mut bytes = vec![tag::MAP, 2, 0, 0, 0];
        bytes.extend_from_slice(&[1, 0, 0, 0, b'b', tag::NULL]);
        bytes.extend_from_slice(&[1, 0, 0, 0, b'a', tag::NULL]);
        assert!(matches!(
            from_bytes(&bytes),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn duplicate_map_keys_rejected() {
        let mut bytes = vec![tag::MAP, 2, 0, 0, 0];
        bytes.extend_from_slice(&[1, 0, 0, 0, b'a', tag::NULL]);
        bytes.extend_from_slice(&[1, 0, 0, 0, b'a', tag::NULL]);
        assert!(matches!(
            from_bytes(&bytes),
            Err(CodecError::InvalidStructure { .. })
        ));
    }
}
