//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of a value.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof {
        /// Offset at which more bytes were required.
        offset: usize,
    },

    /// The input carries a tag byte this codec does not define.
    #[error("unknown value tag {tag:#04x} at offset {offset}")]
    UnknownTag {
        /// The unrecognized tag byte.
        tag: u8,
        /// Offset of the tag byte.
        offset: usize,
    },

    /// A text payload was not valid UTF-8.
    #[error("invalid UTF-8 in text value")]
    InvalidUtf8,

    /// A length prefix does not fit in this platform's address space.
    #[error("length {length} exceeds supported maximum")]
    LengthOverflow {
        /// The declared length.
        length: u64,
    },

    /// Decoding finished but bytes remained after the value.
    #[error("{remaining} trailing bytes after value")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        remaining: usize,
    },

    /// The decoded structure violates a codec rule.
    #[error("invalid value structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Creates an unexpected-EOF error.
    pub fn unexpected_eof(offset: usize) -> Self {
        Self::UnexpectedEof { offset }
    }

    /// Creates an invalid-structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
