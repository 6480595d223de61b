//! The closed error taxonomy returned by every fallible codec operation.

use std::fmt;

use thiserror::Error;

use crate::tag::Tag;

/// One side of a [`CodecError::TypeMismatch`]: either a wire type tag or a
/// schema struct type id, the two things a mismatch can be reported between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatched {
    /// A type tag, from a typed read or a schema field comparison.
    Tag(Tag),
    /// A `STRUCT`'s wire `type_id`, from a schema decode.
    StructId(u16),
}

impl fmt::Display for Mismatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatched::Tag(tag) => write!(f, "{tag}"),
            Mismatched::StructId(id) => write!(f, "struct type_id {id}"),
        }
    }
}

/// A codec error.
///
/// Every fallible operation in this crate returns `Result<T, CodecError>`.
/// There is no `Ok`/`OK` variant. Success is simply `Result::Ok`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A borrowed (fixed-buffer) encoder ran out of space.
    #[error("buffer full: needed {needed} bytes, {available} available")]
    BufferFull {
        /// Bytes the failing write needed.
        needed: usize,
        /// Bytes actually available in the buffer.
        available: usize,
    },

    /// An owning encoder could not grow its buffer without exceeding `MAX_MESSAGE`.
    #[error("allocation failed growing to {requested} bytes")]
    AllocFail {
        /// The capacity that was requested.
        requested: usize,
    },

    /// A value exceeded `MAX_MESSAGE`, `MAX_STRING`, or `MAX_ARRAY`.
    #[error("value of {actual} bytes/elements exceeds limit of {limit}")]
    TooLarge {
        /// The limit that was exceeded.
        limit: usize,
        /// The size that was attempted.
        actual: usize,
    },

    /// A container open would exceed `MAX_DEPTH`, or a container close
    /// without a matching open.
    #[error("nesting depth {depth} exceeds maximum {max}")]
    DepthExceeded {
        /// The depth that would have resulted.
        depth: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The header's magic field did not match `MAGIC`.
    #[error("invalid magic: expected {expected:#010x}, got {actual:#010x}")]
    InvalidMagic {
        /// The expected magic value.
        expected: u32,
        /// The magic value actually read.
        actual: u32,
    },

    /// The header's version major byte did not match `VERSION`'s major byte.
    #[error("version mismatch: expected major {expected_major:#04x}, got {actual:#06x}")]
    VersionMismatch {
        /// The major version this crate implements.
        expected_major: u8,
        /// The full version field read from the wire.
        actual: u16,
    },

    /// Fewer bytes are available than the header or frame requires.
    #[error("truncated: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to complete the operation.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The trailing CRC32 did not match the computed checksum.
    #[error("CRC mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// The CRC32 read from the wire.
        expected: u32,
        /// The CRC32 computed over the received bytes.
        computed: u32,
    },

    /// A tag byte in the stream did not correspond to any known `Tag`, or a
    /// schema field declared a tag the bridge does not support.
    #[error("invalid type tag {0:#04x}")]
    InvalidType(u8),

    /// A varint shifted past bit 63, or a copy destination was too small.
    #[error("overflow: {0}")]
    Overflow(&'static str),

    /// A container was closed without a matching open, or a sentinel did
    /// not have the expected shape.
    #[error("malformed stream: {0}")]
    Malformed(&'static str),

    /// The caller passed an argument that violates the operation's
    /// contract (e.g. a zero-sized schema field).
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    /// In-band signal: `read_field` reached the struct's sentinel.
    ///
    /// Not latched as `last_error`. This is an expected control-flow value,
    /// not a fault.
    #[error("field not found (end of struct)")]
    NotFound,

    /// A typed read's tag did not match the tag the caller expected, or a
    /// schema decode found a wire `type_id` that didn't match the schema's.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// What the operation required.
        expected: Mismatched,
        /// What was actually present.
        actual: Mismatched,
    },
}

impl CodecError {
    /// Whether this error is the in-band "end of struct" signal rather
    /// than a genuine fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CodecError::NotFound)
    }
}
