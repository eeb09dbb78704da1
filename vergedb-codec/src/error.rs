//! Codec error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire values.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,

    #[error("nesting depth exceeds limit of {limit}")]
    DepthLimitExceeded { limit: u32 },

    #[error("array length {len} exceeds limit of {limit}")]
    ArrayTooLong { len: u64, limit: u64 },

    #[error("map length {len} exceeds limit of {limit}")]
    MapTooLong { len: u64, limit: u64 },

    #[error("indefinite-length items are not supported")]
    IndefiniteLength,

    #[error("reserved additional information {0:#04x} in item head")]
    InvalidHead(u8),

    #[error("integer out of range")]
    IntegerOverflow,

    #[error("cannot encode value with unknown tag {0}")]
    UnknownTag(u64),

    #[error("table name is required")]
    TableNameRequired,

    #[error("unmarshal not supported")]
    UnmarshalNotSupported,

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl CodecError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CodecError::InvalidData(msg.into())
    }
}
