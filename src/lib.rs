//! A framed, self-describing binary message codec.
//!
//! Every message is a fixed 17-byte header, a tag-prefixed payload stream,
//! and an optional CRC32 trailer. The payload stream is built from a small
//! set of self-describing primitives (see [`Tag`]) plus three container
//! grammars (`ARRAY`, `MAP`, `STRUCT`). [`Encoder`] writes a message;
//! [`Decoder`] reads one back, borrowing strings and byte blobs directly
//! from the input buffer. [`Schema`] bridges the tag stream to a
//! fixed-layout, field-table-described record for callers who'd rather not
//! hand-write a typed read/write per field.
//!
//! This crate is a codec only: it defines the wire format and the types
//! that read and write it, and performs no I/O of its own. A transport
//! layer reads the first 17 bytes, computes the full frame length via
//! [`message_length`], reads the remainder, and hands the whole buffer to
//! a [`Decoder`].

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod crc32;
pub mod decoder;
pub mod encoder;
pub mod endian;
pub mod error;
pub mod header;
pub mod schema;
pub mod tag;
pub mod varint;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{CodecError, Mismatched};
pub use header::{Flags, Header};
pub use schema::{FieldFlags, Schema, SchemaField};
pub use tag::Tag;

/// The fixed on-wire payload size for `tag`, or `None` if it is
/// variable-length (strings, bytes, and all containers).
pub fn type_fixed_size(tag: Tag) -> Option<usize> {
    tag.fixed_size()
}

/// Validates a complete framed message: header magic and version, overall
/// length, and (unless `NO_CRC` is set) the CRC32 trailer.
///
/// A thin convenience over constructing a [`Decoder`] and calling
/// [`Decoder::validate`], for callers that only need a yes/no answer.
pub fn validate_message(bytes: &[u8]) -> Result<(), CodecError> {
    Decoder::new(bytes).validate()
}

/// Reads just enough of `header_bytes` to report the full framed message
/// length (header + payload + CRC trailer if present).
pub fn message_length(header_bytes: &[u8]) -> Result<usize, CodecError> {
    header::message_length(header_bytes)
}
