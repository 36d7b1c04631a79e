//! Binary encoder.

use crate::error::CodecResult;
use crate::value::Value;

/// Tag bytes of the wire format, one per value shape.
pub(crate) mod tag {
    pub const NULL: u8 = 0x00;
    pub const FALSE: u8 = 0x01;
    pub const TRUE: u8 = 0x02;
    pub const INT: u8 = 0x03;
    pub const TEXT: u8 = 0x04;
    pub const BYTES: u8 = 0x05;
    pub const LIST: u8 = 0x06;
    pub const MAP: u8 = 0x07;
}

/// Encodes a value to its deterministic binary form.
///
/// The format is tag + payload; integers are little-endian and lengths are
/// 32-bit prefixes. Map entries are written in key order, so two equal
/// values always produce identical bytes.
pub fn to_bytes(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = Encoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A streaming encoder over an owned buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    /// Creates a new empty encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder with the given buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Encodes one value into the buffer.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(tag::NULL),
            Value::Bool(false) => self.buffer.push(tag::FALSE),
            Value::Bool(true) => self.buffer.push(tag::TRUE),
            Value::Int(n) => {
                self.buffer.push(tag::INT);
                self.buffer.extend_from_slice(&n.to_le_bytes());
            }
            Value::Text(s) => {
                self.buffer.push(tag::TEXT);
                self.put_len(s.len());
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                self.buffer.push(tag::BYTES);
                self.put_len(b.len());
                self.buffer.extend_from_slice(b);
            }
            Value::List(items) => {
                self.buffer.push(tag::LIST);
                self.put_len(items.len());
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(pairs) => {
                self.buffer.push(tag::MAP);
                self.put_len(pairs.len());
                // BTreeMap iteration is already key-ordered.
                for (key, val) in pairs {
                    self.put_len(key.len());
                    self.buffer.extend_from_slice(key.as_bytes());
                    self.encode(val)?;
                }
            }
        }
        Ok(())
    }

    /// Consumes the encoder and returns the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Returns the bytes encoded so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn put_len(&mut self, len: usize) {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        self.buffer.extend_from_slice(&len.to_le_bytes());
    }
}
