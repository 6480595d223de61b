//! The streaming reader half of the codec.
//!
//! Grounded on `TagStructReader` (tag-checked typed reads over a borrowed
//! buffer) and on `read_descriptor`/the teacher crate's ack/error message
//! parsing in `protocol.rs` for header validation and CRC handling.

use byteorder::{ByteOrder, NetworkEndian};

use crate::crc32;
use crate::error::{CodecError, Mismatched};
use crate::header::{read_header, Header, CRC_SIZE, HEADER_SIZE, MAGIC, MAX_DEPTH};
use crate::tag::Tag;
use crate::varint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    Array,
    Map,
    Struct,
}

/// A zero-copy reader over one framed message.
///
/// Construct with [`Decoder::new`], call [`Decoder::validate`] once, then
/// issue typed reads. Strings and byte blobs borrow directly from the
/// input buffer; every other value is copied out as a plain Rust value.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
    payload_end: usize,
    header: Option<Header>,
    stack: Vec<ContainerKind>,
    last_error: Option<CodecError>,
}

impl<'a> Decoder<'a> {
    /// Wraps `buf` for decoding. No validation happens until
    /// [`Decoder::validate`] is called.
    pub fn new(buf: &'a [u8]) -> Decoder<'a> {
        Decoder {
            buf,
            pos: 0,
            payload_end: 0,
            header: None,
            stack: Vec::new(),
            last_error: None,
        }
    }

    fn fail<T>(&mut self, err: CodecError) -> Result<T, CodecError> {
        self.last_error = Some(err.clone());
        Err(err)
    }

    /// Validates the header: magic, major version, overall length, and
    /// (unless `NO_CRC` is set) the trailing CRC32. Must be called before
    /// any typed read.
    pub fn validate(&mut self) -> Result<(), CodecError> {
        if self.buf.len() < HEADER_SIZE {
            return self.fail(CodecError::Truncated {
                needed: HEADER_SIZE,
                available: self.buf.len(),
            });
        }

        let header = read_header(&self.buf[0..HEADER_SIZE]);

        if header.magic != MAGIC {
            log::warn!("dcfs decoder: bad magic {:#010x}", header.magic);
            return self.fail(CodecError::InvalidMagic {
                expected: MAGIC,
                actual: header.magic,
            });
        }

        if !Header::is_compatible_version(header.version) {
            log::warn!("dcfs decoder: incompatible version {:#06x}", header.version);
            return self.fail(CodecError::VersionMismatch {
                expected_major: Header::major_version(),
                actual: header.version,
            });
        }

        let total = header.message_length();
        if self.buf.len() < total {
            return self.fail(CodecError::Truncated {
                needed: total,
                available: self.buf.len(),
            });
        }

        if header.has_crc() {
            let covered = HEADER_SIZE + header.payload_len as usize;
            let expected = NetworkEndian::read_u32(&self.buf[covered..covered + CRC_SIZE]);
            let computed = crc32::crc32(&self.buf[0..covered]);
            if expected != computed {
                log::warn!(
                    "dcfs decoder: CRC mismatch (expected {:#010x}, computed {:#010x})",
                    expected,
                    computed
                );
                return self.fail(CodecError::CrcMismatch { expected, computed });
            }
        }

        log::debug!(
            "dcfs decoder validated frame: msg_type={} seq={} payload_len={}",
            header.msg_type,
            header.sequence,
            header.payload_len
        );

        self.pos = HEADER_SIZE;
        self.payload_end = HEADER_SIZE + header.payload_len as usize;
        self.header = Some(header);
        Ok(())
    }

    /// The validated header.
    ///
    /// # Panics
    ///
    /// Panics if called before [`Decoder::validate`] succeeds.
    pub fn header(&self) -> &Header {
        self.header
            .as_ref()
            .expect("Decoder::validate must succeed before Decoder::header")
    }

    /// The message's application-defined type. See [`Decoder::header`].
    pub fn msg_type(&self) -> u16 {
        self.header().msg_type
    }

    /// Bytes of payload left to read.
    pub fn remaining(&self) -> usize {
        self.payload_end - self.pos
    }

    /// Whether the cursor has reached the end of the payload region.
    pub fn at_end(&self) -> bool {
        self.pos >= self.payload_end
    }

    /// The error latched by the last failing operation, if any.
    pub fn last_error(&self) -> Option<&CodecError> {
        self.last_error.as_ref()
    }

    /// Reads the tag byte at the cursor without consuming it.
    pub fn peek_type(&self) -> Result<Tag, CodecError> {
        if self.pos >= self.payload_end {
            return Err(CodecError::Truncated {
                needed: 1,
                available: 0,
            });
        }
        Tag::from_byte(self.buf[self.pos])
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let avail = self.payload_end.saturating_sub(self.pos);
        if avail < n {
            return self.fail(CodecError::Truncated {
                needed: n,
                available: avail,
            });
        }
        let start = self.pos;
        self.pos += n;
        let whole: &'a [u8] = self.buf;
        Ok(&whole[start..start + n])
    }

    fn read_tag(&mut self) -> Result<Tag, CodecError> {
        let b = self.take(1)?[0];
        match Tag::from_byte(b) {
            Ok(t) => Ok(t),
            Err(e) => self.fail(e),
        }
    }

    fn expect_tag(&mut self, expected: Tag) -> Result<(), CodecError> {
        let actual = self.read_tag()?;
        if actual != expected {
            return self.fail(CodecError::TypeMismatch {
                expected: Mismatched::Tag(expected),
                actual: Mismatched::Tag(actual),
            });
        }
        Ok(())
    }

    fn read_len_prefix(&mut self) -> Result<usize, CodecError> {
        Ok(NetworkEndian::read_u32(self.take(4)?) as usize)
    }

    fn check_depth(&mut self) -> Result<(), CodecError> {
        if self.stack.len() >= MAX_DEPTH {
            return self.fail(CodecError::DepthExceeded {
                depth: self.stack.len() + 1,
                max: MAX_DEPTH,
            });
        }
        Ok(())
    }

    // -- primitive reads --------------------------------------------------

    /// Reads a `bool`.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        self.expect_tag(Tag::Bool)?;
        Ok(self.take(1)?[0] != 0)
    }

    /// Reads a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.expect_tag(Tag::U8)?;
        Ok(self.take(1)?[0])
    }

    /// Reads an `i8`.
    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        self.expect_tag(Tag::I8)?;
        Ok(self.take(1)?[0] as i8)
    }

    /// Reads a `u16`, big-endian.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.expect_tag(Tag::U16)?;
        Ok(NetworkEndian::read_u16(self.take(2)?))
    }

    /// Reads an `i16`, big-endian.
    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        self.expect_tag(Tag::I16)?;
        Ok(NetworkEndian::read_i16(self.take(2)?))
    }

    /// Reads a `u32`, big-endian.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.expect_tag(Tag::U32)?;
        Ok(NetworkEndian::read_u32(self.take(4)?))
    }

    /// Reads an `i32`, big-endian.
    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.expect_tag(Tag::I32)?;
        Ok(NetworkEndian::read_i32(self.take(4)?))
    }

    /// Reads a `u64`, big-endian.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.expect_tag(Tag::U64)?;
        Ok(NetworkEndian::read_u64(self.take(8)?))
    }

    /// Reads an `i64`, big-endian.
    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.expect_tag(Tag::I64)?;
        Ok(NetworkEndian::read_i64(self.take(8)?))
    }

    /// Reads an `f32` from its raw IEEE 754 bit pattern.
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.expect_tag(Tag::F32)?;
        Ok(f32::from_bits(NetworkEndian::read_u32(self.take(4)?)))
    }

    /// Reads an `f64` from its raw IEEE 754 bit pattern.
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        self.expect_tag(Tag::F64)?;
        Ok(f64::from_bits(NetworkEndian::read_u64(self.take(8)?)))
    }

    /// Reads an unsigned LEB128 varint.
    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        self.expect_tag(Tag::Varint)?;
        let remaining: &[u8] = &self.buf[self.pos..self.payload_end];
        match varint::decode_unsigned(remaining) {
            Ok((v, len)) => {
                self.pos += len;
                Ok(v)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Reads a ZigZag-mapped signed varint.
    pub fn read_varint_signed(&mut self) -> Result<i64, CodecError> {
        Ok(varint::zigzag_decode(self.read_varint()?))
    }

    // -- length-prefixed reads ---------------------------------------------

    /// Reads a UTF-8 string, borrowing directly from the input buffer.
    /// Fails [`CodecError::Malformed`] on invalid UTF-8.
    pub fn read_string(&mut self) -> Result<&'a str, CodecError> {
        self.expect_tag(Tag::String)?;
        let len = self.read_len_prefix()?;
        let bytes = self.take(len)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s),
            Err(_) => self.fail(CodecError::Malformed("invalid utf-8 in string")),
        }
    }

    /// Reads an opaque byte blob, borrowing directly from the input buffer.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        self.expect_tag(Tag::Bytes)?;
        let len = self.read_len_prefix()?;
        self.take(len)
    }

    /// Reads a UTF-8 string by copying it into `out` instead of borrowing,
    /// for callers that need an owned destination buffer. Returns the
    /// number of bytes copied. Fails [`CodecError::Overflow`] if `out` is
    /// too small.
    pub fn read_string_into(&mut self, out: &mut [u8]) -> Result<usize, CodecError> {
        self.expect_tag(Tag::String)?;
        let len = self.read_len_prefix()?;
        if len > out.len() {
            return self.fail(CodecError::Overflow("destination buffer too small for string value"));
        }
        let bytes = self.take(len)?;
        if std::str::from_utf8(bytes).is_err() {
            return self.fail(CodecError::Malformed("invalid utf-8 in string"));
        }
        out[..len].copy_from_slice(bytes);
        Ok(len)
    }

    /// Reads an opaque byte blob by copying it into `out` instead of
    /// borrowing. Returns the number of bytes copied. Fails
    /// [`CodecError::Overflow`] if `out` is too small.
    pub fn read_bytes_into(&mut self, out: &mut [u8]) -> Result<usize, CodecError> {
        self.expect_tag(Tag::Bytes)?;
        let len = self.read_len_prefix()?;
        if len > out.len() {
            return self.fail(CodecError::Overflow("destination buffer too small for bytes value"));
        }
        let bytes = self.take(len)?;
        out[..len].copy_from_slice(bytes);
        Ok(len)
    }

    /// Reads a 16-byte UUID.
    pub fn read_uuid(&mut self) -> Result<[u8; 16], CodecError> {
        self.expect_tag(Tag::Uuid)?;
        let bytes = self.take(16)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads a timestamp (microseconds since the Unix epoch).
    pub fn read_timestamp(&mut self) -> Result<u64, CodecError> {
        self.expect_tag(Tag::Timestamp)?;
        Ok(NetworkEndian::read_u64(self.take(8)?))
    }

    /// Reads a duration in nanoseconds.
    pub fn read_duration(&mut self) -> Result<u64, CodecError> {
        self.expect_tag(Tag::Duration)?;
        Ok(NetworkEndian::read_u64(self.take(8)?))
    }

    // -- containers ---------------------------------------------------------

    /// Opens an `ARRAY`, returning its declared element type and count.
    /// The count is trusted from the wire, not re-verified against the
    /// number of elements actually read.
    pub fn array_begin(&mut self) -> Result<(Tag, u32), CodecError> {
        self.expect_tag(Tag::Array)?;
        let elem_byte = self.take(1)?[0];
        let elem_type = match Tag::from_byte(elem_byte) {
            Ok(t) => t,
            Err(e) => return self.fail(e),
        };
        let count = NetworkEndian::read_u32(self.take(4)?);
        self.check_depth()?;
        self.stack.push(ContainerKind::Array);
        Ok((elem_type, count))
    }

    /// Closes the innermost open array.
    pub fn array_end(&mut self) -> Result<(), CodecError> {
        self.close_container(ContainerKind::Array, "array_end without matching array_begin")
    }

    /// Opens a `MAP`, returning its declared key type, value type, and pair count.
    pub fn map_begin(&mut self) -> Result<(Tag, Tag, u32), CodecError> {
        self.expect_tag(Tag::Map)?;
        let key_byte = self.take(1)?[0];
        let key_type = match Tag::from_byte(key_byte) {
            Ok(t) => t,
            Err(e) => return self.fail(e),
        };
        let val_byte = self.take(1)?[0];
        let val_type = match Tag::from_byte(val_byte) {
            Ok(t) => t,
            Err(e) => return self.fail(e),
        };
        let count = NetworkEndian::read_u32(self.take(4)?);
        self.check_depth()?;
        self.stack.push(ContainerKind::Map);
        Ok((key_type, val_type, count))
    }

    /// Closes the innermost open map.
    pub fn map_end(&mut self) -> Result<(), CodecError> {
        self.close_container(ContainerKind::Map, "map_end without matching map_begin")
    }

    fn close_container(&mut self, kind: ContainerKind, msg: &'static str) -> Result<(), CodecError> {
        match self.stack.last() {
            Some(k) if *k == kind => {
                self.stack.pop();
                Ok(())
            }
            _ => self.fail(CodecError::Malformed(msg)),
        }
    }

    /// Opens a `STRUCT`, returning its wire type id.
    pub fn struct_begin(&mut self) -> Result<u16, CodecError> {
        self.expect_tag(Tag::Struct)?;
        let type_id = NetworkEndian::read_u16(self.take(2)?);
        self.check_depth()?;
        self.stack.push(ContainerKind::Struct);
        Ok(type_id)
    }

    /// Reads the next struct field header `(field_id, type_tag)`.
    ///
    /// Returns [`CodecError::NotFound`] (not latched as `last_error`) on
    /// reaching the sentinel `(0, NULL)`, the expected way to end a field
    /// loop rather than a fault. The caller must still call
    /// [`Decoder::struct_end`] afterwards to pop the container.
    pub fn read_field(&mut self) -> Result<(u16, Tag), CodecError> {
        let field_id = NetworkEndian::read_u16(self.take(2)?);
        let tag = self.read_tag()?;
        if field_id == 0 && tag == Tag::Null {
            return Err(CodecError::NotFound);
        }
        Ok((field_id, tag))
    }

    /// Closes the innermost open struct. The sentinel must already have
    /// been consumed by a [`Decoder::read_field`] call returning `NotFound`.
    pub fn struct_end(&mut self) -> Result<(), CodecError> {
        self.close_container(ContainerKind::Struct, "struct_end without matching struct_begin")
    }

    // -- skipping -------------------------------------------------------

    /// Skips the next tag-prefixed value, recursing into containers.
    /// Fails [`CodecError::Malformed`] on a reserved tag with no defined
    /// grammar.
    pub fn skip(&mut self) -> Result<(), CodecError> {
        let tag = self.read_tag()?;
        self.skip_value(tag)
    }

    /// Skips a value whose tag has already been consumed by the caller
    /// (e.g. [`Decoder::read_field`]'s `(field_id, tag)` pair). Used by the
    /// schema bridge's unknown-field tolerance.
    pub(crate) fn skip_value(&mut self, tag: Tag) -> Result<(), CodecError> {
        match tag {
            Tag::Array => {
                self.take(1)?; // elem_type
                let count = NetworkEndian::read_u32(self.take(4)?);
                for _ in 0..count {
                    let t = self.read_tag()?;
                    self.skip_value(t)?;
                }
                Ok(())
            }
            Tag::Map => {
                self.take(2)?; // key_type, val_type
                let count = NetworkEndian::read_u32(self.take(4)?);
                for _ in 0..(count as u64) * 2 {
                    let t = self.read_tag()?;
                    self.skip_value(t)?;
                }
                Ok(())
            }
            Tag::Struct => {
                self.take(2)?; // type_id
                loop {
                    let field_id = NetworkEndian::read_u16(self.take(2)?);
                    let t = self.read_tag()?;
                    if field_id == 0 && t == Tag::Null {
                        break;
                    }
                    self.skip_value(t)?;
                }
                Ok(())
            }
            Tag::Varint => {
                let remaining: &[u8] = &self.buf[self.pos..self.payload_end];
                match varint::decode_unsigned(remaining) {
                    Ok((_, len)) => {
                        self.pos += len;
                        Ok(())
                    }
                    Err(e) => self.fail(e),
                }
            }
            Tag::String | Tag::Bytes => {
                let len = self.read_len_prefix()?;
                self.take(len)?;
                Ok(())
            }
            _ => match tag.fixed_size() {
                Some(n) => {
                    self.take(n)?;
                    Ok(())
                }
                None => self.fail(CodecError::InvalidType(tag as u8)),
            },
        }
    }

    // -- raw escape hatches -----------------------------------------------

    /// Reads `len` raw bytes with no tag or length interpretation, for
    /// hand-coded sub-grammars the caller tracks itself.
    pub fn read_raw(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::header::Flags;
    use pretty_assertions::assert_eq;

    fn encode(f: impl FnOnce(&mut Encoder<'static>)) -> Vec<u8> {
        let mut enc = Encoder::new(1, Flags::empty());
        f(&mut enc);
        enc.finish().unwrap().to_vec()
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(|e| {
            e.write_u8(1).unwrap();
        });
        bytes[0] ^= 0xFF;

        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.validate(), Err(CodecError::InvalidMagic { .. })));
    }

    #[test]
    fn rejects_incompatible_major_version() {
        let mut bytes = encode(|e| {
            e.write_u8(1).unwrap();
        });
        bytes[4] = 0x06; // bump major version byte

        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.validate(), Err(CodecError::VersionMismatch { .. })));
    }

    #[test]
    fn rejects_truncated_frame() {
        let bytes = encode(|e| {
            e.write_u32(0xDEAD_BEEF).unwrap();
        });
        let mut dec = Decoder::new(&bytes[..bytes.len() - 2]);
        assert!(matches!(dec.validate(), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn rejects_flipped_payload_bit() {
        let mut bytes = encode(|e| {
            e.write_string("hello").unwrap();
        });
        let flip_at = HEADER_SIZE + 3;
        bytes[flip_at] ^= 0x01;

        let mut dec = Decoder::new(&bytes);
        assert!(matches!(dec.validate(), Err(CodecError::CrcMismatch { .. })));
    }

    #[test]
    fn no_crc_message_validates_without_trailer_bytes() -> anyhow::Result<()> {
        let with_crc = encode(|e| {
            e.write_u32(1).unwrap();
        });
        let without_crc = encode_with_flags(Flags::NO_CRC, |e| {
            e.write_u32(1).unwrap();
        });
        assert_eq!(without_crc.len(), with_crc.len() - 4);

        let mut dec = Decoder::new(&without_crc);
        dec.validate()?;
        assert_eq!(dec.read_u32()?, 1);
        Ok(())
    }

    fn encode_with_flags(flags: Flags, f: impl FnOnce(&mut Encoder<'static>)) -> Vec<u8> {
        let mut enc = Encoder::new(1, flags);
        f(&mut enc);
        enc.finish().unwrap().to_vec()
    }

    #[test]
    fn empty_string_round_trips() -> anyhow::Result<()> {
        let bytes = encode(|e| {
            e.write_string("").unwrap();
        });
        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        assert_eq!(dec.read_string()?, "");
        assert!(dec.at_end());
        Ok(())
    }

    #[test]
    fn type_mismatch_on_wrong_typed_read() -> anyhow::Result<()> {
        let bytes = encode(|e| {
            e.write_u32(7).unwrap();
        });
        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        assert!(matches!(
            dec.read_bool(),
            Err(CodecError::TypeMismatch {
                expected: Mismatched::Tag(Tag::Bool),
                actual: Mismatched::Tag(Tag::U32),
            })
        ));
        assert!(matches!(dec.last_error(), Some(CodecError::TypeMismatch { .. })));
        Ok(())
    }

    #[test_log::test]
    fn zero_copy_string_points_into_input_buffer() -> anyhow::Result<()> {
        let bytes = encode(|e| {
            e.write_string("zero-copy").unwrap();
        });
        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        let s = dec.read_string()?;
        assert_eq!(s, "zero-copy");

        let buf_range = bytes.as_ptr_range();
        let s_ptr = s.as_ptr();
        assert!(buf_range.contains(&s_ptr));
        Ok(())
    }

    #[test]
    fn rejects_invalid_utf8_string() -> anyhow::Result<()> {
        // Hand-assemble a STRING value with invalid UTF-8 payload bytes;
        // write_string can't produce this since its input is already a &str.
        let mut enc = Encoder::new(1, Flags::empty());
        enc.write_raw(&[Tag::String as u8])?;
        enc.write_raw(&2u32.to_be_bytes())?;
        enc.write_raw(&[0xFF, 0xFE])?;
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        assert!(matches!(dec.read_string(), Err(CodecError::Malformed(_))));
        Ok(())
    }

    #[test]
    fn array_round_trip_with_skip() -> anyhow::Result<()> {
        let bytes = encode(|e| {
            e.array_begin(Tag::U32, 3).unwrap();
            e.write_u32(1).unwrap();
            e.write_u32(2).unwrap();
            e.write_u32(3).unwrap();
            e.array_end().unwrap();
        });

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        let (elem_type, count) = dec.array_begin()?;
        assert_eq!(elem_type, Tag::U32);
        assert_eq!(count, 3);
        for _ in 0..count {
            dec.skip()?;
        }
        dec.array_end()?;
        assert!(dec.at_end());
        Ok(())
    }

    #[test]
    fn struct_field_loop_hits_not_found_at_sentinel() -> anyhow::Result<()> {
        let bytes = encode(|e| {
            e.struct_begin(7).unwrap();
            e.write_field_header(1, Tag::U32).unwrap();
            e.write_u32(42).unwrap();
            e.struct_end().unwrap();
        });

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        dec.struct_begin()?;

        let (field_id, tag) = dec.read_field()?;
        assert_eq!(field_id, 1);
        assert_eq!(tag, Tag::U32);
        assert_eq!(dec.read_u32()?, 42);

        assert!(matches!(dec.read_field(), Err(CodecError::NotFound)));
        dec.struct_end()?;
        assert!(dec.at_end());
        Ok(())
    }

    #[test]
    fn copying_string_read_rejects_undersized_buffer() -> anyhow::Result<()> {
        let bytes = encode(|e| {
            e.write_string("hello world").unwrap();
        });
        let mut dec = Decoder::new(&bytes);
        dec.validate()?;

        let mut small = [0u8; 4];
        assert!(matches!(
            dec.read_string_into(&mut small),
            Err(CodecError::Overflow(_))
        ));
        Ok(())
    }

    #[test]
    fn copying_bytes_read_round_trips() -> anyhow::Result<()> {
        let bytes = encode(|e| {
            e.write_bytes(&[1, 2, 3, 4]).unwrap();
        });
        let mut dec = Decoder::new(&bytes);
        dec.validate()?;

        let mut out = [0u8; 4];
        let n = dec.read_bytes_into(&mut out)?;
        assert_eq!(&out[..n], &[1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn skip_rejects_reserved_tag() -> anyhow::Result<()> {
        let mut enc = Encoder::new(1, Flags::empty());
        enc.write_raw(&[Tag::Enum as u8])?;
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        assert!(matches!(dec.skip(), Err(CodecError::InvalidType(_))));
        Ok(())
    }

    #[test]
    fn depth_exceeded_on_decode() -> anyhow::Result<()> {
        // Hand-assemble MAX_DEPTH + 1 nested, never-closed arrays: only
        // possible via raw writes, since Encoder::array_begin itself
        // enforces the same limit.
        let mut enc = Encoder::new(1, Flags::empty());
        for _ in 0..=MAX_DEPTH {
            enc.write_raw(&[Tag::Array as u8, Tag::Array as u8])?;
            enc.write_raw(&1u32.to_be_bytes())?;
        }
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        for _ in 0..MAX_DEPTH {
            dec.array_begin()?;
        }
        assert!(matches!(dec.array_begin(), Err(CodecError::DepthExceeded { .. })));
        Ok(())
    }
}
