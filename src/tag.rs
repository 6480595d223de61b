//! The wire's self-describing type tag, written before every value.

use std::fmt;

use enum_primitive_derive::Primitive;
use num_traits::FromPrimitive;

use crate::error::CodecError;

/// The one-byte discriminator preceding every typed value on the wire.
///
/// Tag values are normative wire constants (see the data model) and must
/// not be renumbered.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Primitive)]
pub enum Tag {
    /// The absence of a value. Also used as the sentinel field's type.
    Null = 0x00,
    /// `bool`, one byte, 0 or 1.
    Bool = 0x01,
    /// `u8`.
    U8 = 0x02,
    /// `i8`.
    I8 = 0x03,
    /// `u16`, big-endian.
    U16 = 0x04,
    /// `i16`, big-endian.
    I16 = 0x05,
    /// `u32`, big-endian.
    U32 = 0x06,
    /// `i32`, big-endian.
    I32 = 0x07,
    /// `u64`, big-endian.
    U64 = 0x08,
    /// `i64`, big-endian.
    I64 = 0x09,
    /// `f32`, IEEE 754 bit pattern, big-endian.
    F32 = 0x0A,
    /// `f64`, IEEE 754 bit pattern, big-endian.
    F64 = 0x0B,
    /// Unsigned LEB128 varint (or ZigZag-mapped signed varint).
    Varint = 0x10,
    /// `u32` length prefix then `length` UTF-8 bytes.
    String = 0x11,
    /// `u32` length prefix then `length` opaque bytes.
    Bytes = 0x12,
    /// 16 raw, uninterpreted bytes.
    Uuid = 0x13,
    /// `u8 elem_type`, `u32 count`, then `count` tag-prefixed values.
    Array = 0x20,
    /// `u8 key_type`, `u8 val_type`, `u32 count`, then `count` pairs.
    Map = 0x21,
    /// `u16 type_id`, then sentinel-terminated `(field_id, tag, value)` triples.
    Struct = 0x22,
    /// Reserved; grammar not yet defined.
    Tuple = 0x23,
    /// `u64` microseconds since the Unix epoch.
    Timestamp = 0x30,
    /// `u64` nanoseconds.
    Duration = 0x31,
    /// Reserved; grammar not yet defined.
    Optional = 0x32,
    /// Reserved; grammar not yet defined.
    Enum = 0x33,
    /// Reserved; grammar not yet defined.
    Extension = 0xFE,
    /// Never written; denotes a deliberately invalid tag byte.
    Invalid = 0xFF,
}

impl Tag {
    /// Parses a tag byte, failing `InvalidType` if it does not correspond
    /// to a known tag.
    pub fn from_byte(b: u8) -> Result<Tag, CodecError> {
        Tag::from_u8(b).ok_or(CodecError::InvalidType(b))
    }

    /// The fixed on-wire payload size for this tag, or `None` if the tag's
    /// payload is variable-length (strings, bytes, and all containers).
    pub fn fixed_size(self) -> Option<usize> {
        use Tag::*;
        match self {
            Null => Some(0),
            Bool | U8 | I8 => Some(1),
            U16 | I16 => Some(2),
            U32 | I32 | F32 => Some(4),
            U64 | I64 | F64 | Timestamp | Duration => Some(8),
            Uuid => Some(16),
            Varint | String | Bytes | Array | Map | Struct | Tuple | Optional | Enum
            | Extension | Invalid => None,
        }
    }

    /// Whether this tag's grammar is reserved for a future revision (see
    /// the design notes): declared, parseable, but not yet writable or
    /// skippable.
    pub fn is_reserved(self) -> bool {
        matches!(self, Tag::Tuple | Tag::Optional | Tag::Enum | Tag::Extension)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_declared_tag() {
        let all = [
            Tag::Null,
            Tag::Bool,
            Tag::U8,
            Tag::I8,
            Tag::U16,
            Tag::I16,
            Tag::U32,
            Tag::I32,
            Tag::U64,
            Tag::I64,
            Tag::F32,
            Tag::F64,
            Tag::Varint,
            Tag::String,
            Tag::Bytes,
            Tag::Uuid,
            Tag::Array,
            Tag::Map,
            Tag::Struct,
            Tag::Tuple,
            Tag::Timestamp,
            Tag::Duration,
            Tag::Optional,
            Tag::Enum,
            Tag::Extension,
            Tag::Invalid,
        ];

        for tag in all {
            assert_eq!(Tag::from_byte(tag as u8).unwrap(), tag);
        }
    }

    #[test]
    fn rejects_unknown_byte() {
        assert_eq!(Tag::from_byte(0x99), Err(CodecError::InvalidType(0x99)));
    }

    #[test]
    fn fixed_size_matches_data_model() {
        assert_eq!(Tag::Null.fixed_size(), Some(0));
        assert_eq!(Tag::Bool.fixed_size(), Some(1));
        assert_eq!(Tag::U16.fixed_size(), Some(2));
        assert_eq!(Tag::U32.fixed_size(), Some(4));
        assert_eq!(Tag::U64.fixed_size(), Some(8));
        assert_eq!(Tag::Uuid.fixed_size(), Some(16));
        assert_eq!(Tag::String.fixed_size(), None);
        assert_eq!(Tag::Array.fixed_size(), None);
    }
}
