//! The streaming writer half of the codec.
//!
//! Grounded on `TagStructWriter` (tag-then-payload write methods dispatched
//! through a small generic `write<T>`) and on the owning/borrowed buffer
//! split between `write_command_message` and `encode_command_message` in
//! the teacher crate's `protocol.rs`.

use crate::crc32;
use crate::error::CodecError;
use crate::header::{
    write_header, Flags, Header, CRC_SIZE, HEADER_SIZE, MAGIC, MAX_ARRAY, MAX_DEPTH, MAX_MESSAGE,
    MAX_STRING, VERSION,
};
use crate::tag::Tag;
use crate::varint;

enum EncoderBuf<'a> {
    Owned(Vec<u8>),
    Borrowed(&'a mut [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Writing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContainerKind {
    Array,
    Map,
    Struct,
}

struct ContainerFrame {
    kind: ContainerKind,
    /// Declared element count for `Array`/`Map` (pairs counted twice for
    /// `Map`); unused for `Struct`, which is sentinel-terminated.
    expected: u64,
    written: u64,
}

/// A streaming writer that produces one framed message.
///
/// Construct with [`Encoder::new`] (owning, growable buffer) or
/// [`Encoder::new_in`] (borrowed, fixed buffer), issue a sequence of typed
/// writes, then call [`Encoder::finish`] exactly once.
pub struct Encoder<'a> {
    buf: EncoderBuf<'a>,
    pos: usize,
    msg_type: u16,
    flags: Flags,
    sequence: u32,
    stack: Vec<ContainerFrame>,
    state: EncoderState,
    last_error: Option<CodecError>,
}

impl<'a> Encoder<'a> {
    /// Creates an owning encoder with a growable buffer, starting at
    /// [`crate::header::INITIAL_CAPACITY`] bytes and doubling as needed.
    pub fn new(msg_type: u16, flags: Flags) -> Encoder<'static> {
        Encoder {
            buf: EncoderBuf::Owned(vec![0u8; crate::header::INITIAL_CAPACITY]),
            pos: HEADER_SIZE,
            msg_type,
            flags,
            sequence: 0,
            stack: Vec::new(),
            state: EncoderState::Writing,
            last_error: None,
        }
    }

    /// Creates a borrowed encoder writing into `buffer`, a fixed-size
    /// caller-supplied buffer. Growth is never attempted; exhausting the
    /// buffer fails [`CodecError::BufferFull`].
    pub fn new_in(buffer: &'a mut [u8], msg_type: u16, flags: Flags) -> Result<Encoder<'a>, CodecError> {
        if buffer.len() < HEADER_SIZE {
            return Err(CodecError::BufferFull {
                needed: HEADER_SIZE,
                available: buffer.len(),
            });
        }

        Ok(Encoder {
            buf: EncoderBuf::Borrowed(buffer),
            pos: HEADER_SIZE,
            msg_type,
            flags,
            sequence: 0,
            stack: Vec::new(),
            state: EncoderState::Writing,
            last_error: None,
        })
    }

    /// Rewinds the cursor and clears writer state, retaining the
    /// underlying buffer. Must be called before reusing a finished or
    /// faulted encoder.
    pub fn reset(&mut self, msg_type: u16, flags: Flags) {
        self.pos = HEADER_SIZE;
        self.msg_type = msg_type;
        self.flags = flags;
        self.sequence = 0;
        self.stack.clear();
        self.state = EncoderState::Writing;
        self.last_error = None;
    }

    /// Overrides the header's sequence number (default 0).
    pub fn set_sequence(&mut self, sequence: u32) {
        self.sequence = sequence;
    }

    /// Bytes written to the payload region so far.
    pub fn payload_size(&self) -> usize {
        self.pos - HEADER_SIZE
    }

    /// The error latched by the last failing operation, if any.
    ///
    /// A pure diagnostic convenience: every fallible method already
    /// returns its error by value.
    pub fn last_error(&self) -> Option<&CodecError> {
        self.last_error.as_ref()
    }

    fn fail<T>(&mut self, err: CodecError) -> Result<T, CodecError> {
        self.last_error = Some(err.clone());
        Err(err)
    }

    fn ensure_capacity(&mut self, additional: usize) -> Result<(), CodecError> {
        let needed = self.pos + additional;
        match &mut self.buf {
            EncoderBuf::Owned(v) => {
                if needed > MAX_MESSAGE {
                    return Err(CodecError::TooLarge {
                        limit: MAX_MESSAGE,
                        actual: needed,
                    });
                }
                if needed > v.len() {
                    let mut new_cap = v.len().max(crate::header::INITIAL_CAPACITY);
                    while new_cap < needed {
                        new_cap = new_cap
                            .checked_mul(2)
                            .ok_or(CodecError::AllocFail { requested: needed })?;
                    }
                    v.resize(new_cap.min(MAX_MESSAGE).max(needed), 0);
                }
                Ok(())
            }
            EncoderBuf::Borrowed(b) => {
                if needed > b.len() {
                    Err(CodecError::BufferFull {
                        needed,
                        available: b.len(),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    fn write_slice(&mut self, data: &[u8]) -> Result<(), CodecError> {
        if let Err(e) = self.ensure_capacity(data.len()) {
            return self.fail(e);
        }

        match &mut self.buf {
            EncoderBuf::Owned(v) => v[self.pos..self.pos + data.len()].copy_from_slice(data),
            EncoderBuf::Borrowed(b) => b[self.pos..self.pos + data.len()].copy_from_slice(data),
        }
        self.pos += data.len();
        Ok(())
    }

    fn write_tag(&mut self, tag: Tag) -> Result<(), CodecError> {
        self.write_slice(&[tag as u8])
    }

    fn bump_parent(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.written += 1;
        }
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

    // -- primitive writes -----------------------------------------------

    /// Writes a `bool`.
    pub fn write_bool(&mut self, v: bool) -> Result<(), CodecError> {
        self.write_tag(Tag::Bool)?;
        self.write_slice(&[v as u8])?;
        self.bump_parent();
        Ok(())
    }

    /// Writes a `u8`.
    pub fn write_u8(&mut self, v: u8) -> Result<(), CodecError> {
        self.write_tag(Tag::U8)?;
        self.write_slice(&[v])?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an `i8`.
    pub fn write_i8(&mut self, v: i8) -> Result<(), CodecError> {
        self.write_tag(Tag::I8)?;
        self.write_slice(&v.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes a `u16`, big-endian.
    pub fn write_u16(&mut self, v: u16) -> Result<(), CodecError> {
        self.write_tag(Tag::U16)?;
        self.write_slice(&v.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an `i16`, big-endian.
    pub fn write_i16(&mut self, v: i16) -> Result<(), CodecError> {
        self.write_tag(Tag::I16)?;
        self.write_slice(&v.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes a `u32`, big-endian.
    pub fn write_u32(&mut self, v: u32) -> Result<(), CodecError> {
        self.write_tag(Tag::U32)?;
        self.write_slice(&v.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an `i32`, big-endian.
    pub fn write_i32(&mut self, v: i32) -> Result<(), CodecError> {
        self.write_tag(Tag::I32)?;
        self.write_slice(&v.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes a `u64`, big-endian.
    pub fn write_u64(&mut self, v: u64) -> Result<(), CodecError> {
        self.write_tag(Tag::U64)?;
        self.write_slice(&v.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an `i64`, big-endian.
    pub fn write_i64(&mut self, v: i64) -> Result<(), CodecError> {
        self.write_tag(Tag::I64)?;
        self.write_slice(&v.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an `f32` as its raw IEEE 754 bit pattern.
    pub fn write_f32(&mut self, v: f32) -> Result<(), CodecError> {
        self.write_tag(Tag::F32)?;
        self.write_slice(&v.to_bits().to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an `f64` as its raw IEEE 754 bit pattern.
    pub fn write_f64(&mut self, v: f64) -> Result<(), CodecError> {
        self.write_tag(Tag::F64)?;
        self.write_slice(&v.to_bits().to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an unsigned LEB128 varint.
    pub fn write_varint(&mut self, v: u64) -> Result<(), CodecError> {
        self.write_tag(Tag::Varint)?;
        let mut tmp = Vec::with_capacity(10);
        varint::encode_unsigned(v, &mut tmp);
        self.write_slice(&tmp)?;
        self.bump_parent();
        Ok(())
    }

    /// Writes a signed integer as a ZigZag-mapped LEB128 varint.
    pub fn write_varint_signed(&mut self, v: i64) -> Result<(), CodecError> {
        self.write_tag(Tag::Varint)?;
        let mut tmp = Vec::with_capacity(10);
        varint::encode_unsigned(varint::zigzag_encode(v), &mut tmp);
        self.write_slice(&tmp)?;
        self.bump_parent();
        Ok(())
    }

    // -- length-prefixed writes ------------------------------------------

    /// Writes a UTF-8 string. Fails [`CodecError::TooLarge`] if it exceeds
    /// [`crate::header::MAX_STRING`] bytes.
    pub fn write_string(&mut self, s: &str) -> Result<(), CodecError> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_STRING {
            return self.fail(CodecError::TooLarge {
                limit: MAX_STRING,
                actual: bytes.len(),
            });
        }

        self.write_tag(Tag::String)?;
        self.write_slice(&(bytes.len() as u32).to_be_bytes())?;
        self.write_slice(bytes)?;
        self.bump_parent();
        Ok(())
    }

    /// Writes an opaque byte blob. Fails [`CodecError::TooLarge`] if it
    /// exceeds [`crate::header::MAX_MESSAGE`] bytes.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), CodecError> {
        if data.len() > MAX_MESSAGE {
            return self.fail(CodecError::TooLarge {
                limit: MAX_MESSAGE,
                actual: data.len(),
            });
        }

        self.write_tag(Tag::Bytes)?;
        self.write_slice(&(data.len() as u32).to_be_bytes())?;
        self.write_slice(data)?;
        self.bump_parent();
        Ok(())
    }

    /// Writes 16 raw, uninterpreted bytes as a UUID.
    pub fn write_uuid(&mut self, bytes: &[u8; 16]) -> Result<(), CodecError> {
        self.write_tag(Tag::Uuid)?;
        self.write_slice(bytes)?;
        self.bump_parent();
        Ok(())
    }

    /// Writes a timestamp as microseconds since the Unix epoch.
    pub fn write_timestamp(&mut self, micros: u64) -> Result<(), CodecError> {
        self.write_tag(Tag::Timestamp)?;
        self.write_slice(&micros.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    /// Writes a duration in nanoseconds.
    pub fn write_duration(&mut self, nanos: u64) -> Result<(), CodecError> {
        self.write_tag(Tag::Duration)?;
        self.write_slice(&nanos.to_be_bytes())?;
        self.bump_parent();
        Ok(())
    }

    // -- containers --------------------------------------------------------

    /// Opens an `ARRAY` of `count` elements, each expected to carry tag
    /// `elem_type`. Fails [`CodecError::DepthExceeded`] past
    /// [`crate::header::MAX_DEPTH`] or [`CodecError::TooLarge`] past
    /// [`crate::header::MAX_ARRAY`].
    pub fn array_begin(&mut self, elem_type: Tag, count: u32) -> Result<(), CodecError> {
        if count as usize > MAX_ARRAY {
            return self.fail(CodecError::TooLarge {
                limit: MAX_ARRAY,
                actual: count as usize,
            });
        }
        self.check_depth()?;

        self.write_tag(Tag::Array)?;
        self.write_slice(&[elem_type as u8])?;
        self.write_slice(&count.to_be_bytes())?;
        self.bump_parent();

        self.stack.push(ContainerFrame {
            kind: ContainerKind::Array,
            expected: count as u64,
            written: 0,
        });
        Ok(())
    }

    /// Closes the innermost open array. Fails [`CodecError::Malformed`] if
    /// there is no open array, or if the number of values written does not
    /// match the count declared at `array_begin`.
    pub fn array_end(&mut self) -> Result<(), CodecError> {
        self.close_counted(ContainerKind::Array, "array_end without matching array_begin")
    }

    /// Opens a `MAP` of `count` (key, value) pairs with the given key and
    /// value tags.
    pub fn map_begin(&mut self, key_type: Tag, val_type: Tag, count: u32) -> Result<(), CodecError> {
        if count as usize > MAX_ARRAY {
            return self.fail(CodecError::TooLarge {
                limit: MAX_ARRAY,
                actual: count as usize,
            });
        }
        self.check_depth()?;

        self.write_tag(Tag::Map)?;
        self.write_slice(&[key_type as u8])?;
        self.write_slice(&[val_type as u8])?;
        self.write_slice(&count.to_be_bytes())?;
        self.bump_parent();

        self.stack.push(ContainerFrame {
            kind: ContainerKind::Map,
            expected: count as u64 * 2,
            written: 0,
        });
        Ok(())
    }

    /// Closes the innermost open map. Fails [`CodecError::Malformed`] if
    /// there is no open map, or if the number of key/value writes does not
    /// match twice the count declared at `map_begin`.
    pub fn map_end(&mut self) -> Result<(), CodecError> {
        self.close_counted(ContainerKind::Map, "map_end without matching map_begin")
    }

    fn close_counted(&mut self, kind: ContainerKind, mismatch_msg: &'static str) -> Result<(), CodecError> {
        let frame = match self.stack.last() {
            Some(f) if f.kind == kind => self.stack.pop().unwrap(),
            _ => return self.fail(CodecError::Malformed(mismatch_msg)),
        };

        if frame.written != frame.expected {
            return self.fail(CodecError::Malformed(
                "declared element count did not match values written",
            ));
        }
        Ok(())
    }

    /// Opens a `STRUCT` with the given wire type id.
    pub fn struct_begin(&mut self, type_id: u16) -> Result<(), CodecError> {
        self.check_depth()?;

        self.write_tag(Tag::Struct)?;
        self.write_slice(&type_id.to_be_bytes())?;
        self.bump_parent();

        self.stack.push(ContainerFrame {
            kind: ContainerKind::Struct,
            expected: 0,
            written: 0,
        });
        Ok(())
    }

    /// Writes a struct field header `(field_id, type_tag)`. The value
    /// itself must be written immediately afterwards with the typed write
    /// matching `type_tag`.
    pub fn write_field_header(&mut self, field_id: u16, type_tag: Tag) -> Result<(), CodecError> {
        self.write_slice(&field_id.to_be_bytes())?;
        self.write_slice(&[type_tag as u8])?;
        Ok(())
    }

    /// Closes the innermost open struct, writing the sentinel field
    /// `(field_id = 0, tag = NULL)`.
    pub fn struct_end(&mut self) -> Result<(), CodecError> {
        match self.stack.last() {
            Some(f) if f.kind == ContainerKind::Struct => {
                self.stack.pop();
            }
            _ => return self.fail(CodecError::Malformed("struct_end without matching struct_begin")),
        }

        self.write_slice(&0u16.to_be_bytes())?;
        self.write_slice(&[Tag::Null as u8])?;
        Ok(())
    }

    // -- raw escape hatches --------------------------------------------

    /// Appends `bytes` with no tag or length prefix, for hand-coded
    /// sub-grammars the producer tracks itself.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.write_slice(bytes)
    }

    /// Reserves `len` bytes and returns them as a mutable slice for direct
    /// population, for hand-coded sub-grammars the producer tracks itself.
    pub fn write_reserve(&mut self, len: usize) -> Result<&mut [u8], CodecError> {
        if let Err(e) = self.ensure_capacity(len) {
            self.last_error = Some(e.clone());
            return Err(e);
        }

        let start = self.pos;
        self.pos += len;
        Ok(match &mut self.buf {
            EncoderBuf::Owned(v) => &mut v[start..start + len],
            EncoderBuf::Borrowed(b) => &mut b[start..start + len],
        })
    }

    // -- finalization ------------------------------------------------------

    /// Finalizes the message: backfills the header, appends the CRC32
    /// trailer unless [`Flags::NO_CRC`] is set, and returns the complete
    /// framed message. May be called at most once before a [`reset`].
    ///
    /// [`reset`]: Encoder::reset
    pub fn finish(&mut self) -> Result<&[u8], CodecError> {
        if self.state == EncoderState::Finished {
            return self.fail(CodecError::InvalidArg("finish called twice without a reset"));
        }
        if !self.stack.is_empty() {
            return self.fail(CodecError::Malformed("finish called with unclosed containers"));
        }

        let payload_len = self.pos - HEADER_SIZE;
        let crc_enabled = !self.flags.contains(Flags::NO_CRC);

        if crc_enabled {
            if let Err(e) = self.ensure_capacity(CRC_SIZE) {
                return self.fail(e);
            }
        }

        let header = Header {
            magic: MAGIC,
            version: VERSION,
            msg_type: self.msg_type,
            flags: self.flags,
            payload_len: payload_len as u32,
            sequence: self.sequence,
        };

        match &mut self.buf {
            EncoderBuf::Owned(v) => write_header(&mut v[0..HEADER_SIZE], &header),
            EncoderBuf::Borrowed(b) => write_header(&mut b[0..HEADER_SIZE], &header),
        }

        if crc_enabled {
            let covered_end = self.pos;
            let crc = match &self.buf {
                EncoderBuf::Owned(v) => crc32::crc32(&v[0..covered_end]),
                EncoderBuf::Borrowed(b) => crc32::crc32(&b[0..covered_end]),
            };
            self.write_slice(&crc.to_be_bytes())?;
        }

        self.state = EncoderState::Finished;
        log::trace!(
            "dcfs encoder finished: {} bytes (msg_type={}, crc={})",
            self.pos,
            self.msg_type,
            crc_enabled
        );

        let total = self.pos;
        Ok(match &self.buf {
            EncoderBuf::Owned(v) => &v[0..total],
            EncoderBuf::Borrowed(b) => &b[0..total],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;

    #[test]
    fn primitive_round_trip() -> anyhow::Result<()> {
        let mut enc = Encoder::new(1, Flags::empty());
        enc.write_bool(true)?;
        enc.write_u8(0x42)?;
        enc.write_i8(-42)?;
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        assert_eq!(dec.read_bool()?, true);
        assert_eq!(dec.read_u8()?, 0x42);
        assert_eq!(dec.read_i8()?, -42);
        assert!(dec.at_end());
        Ok(())
    }

    #[test]
    fn borrowed_buffer_exact_fit_then_full() -> anyhow::Result<()> {
        // header(17) + tag+u8(2) + crc(4) = 23
        let mut buf = [0u8; 23];
        {
            let mut enc = Encoder::new_in(&mut buf, 1, Flags::empty())?;
            enc.write_u8(7)?;
            enc.finish()?;
        }

        let mut dec = Decoder::new(&buf);
        dec.validate()?;
        assert_eq!(dec.read_u8()?, 7);

        let mut too_small = [0u8; 22];
        let mut enc = Encoder::new_in(&mut too_small, 1, Flags::empty())?;
        let err = enc.write_u8(7).unwrap_err();
        assert!(matches!(err, CodecError::BufferFull { .. }));
        Ok(())
    }

    #[test]
    fn array_end_without_begin_is_malformed() {
        let mut enc = Encoder::new(1, Flags::empty());
        assert!(matches!(enc.array_end(), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn array_count_mismatch_is_malformed() {
        let mut enc = Encoder::new(1, Flags::empty());
        enc.array_begin(Tag::U32, 3).unwrap();
        enc.write_u32(1).unwrap();
        enc.write_u32(2).unwrap();
        assert!(matches!(enc.array_end(), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn max_depth_then_one_more_fails() {
        let mut enc = Encoder::new(1, Flags::empty());
        for _ in 0..MAX_DEPTH {
            enc.array_begin(Tag::Array, 1).unwrap();
        }
        assert!(matches!(
            enc.array_begin(Tag::Array, 1),
            Err(CodecError::DepthExceeded { .. })
        ));
    }

    #[test]
    fn bytes_over_max_message_is_too_large() {
        let mut enc = Encoder::new(1, Flags::empty());
        let data = vec![0u8; MAX_MESSAGE + 1];
        assert!(matches!(
            enc.write_bytes(&data),
            Err(CodecError::TooLarge { .. })
        ));
    }

    #[test]
    fn finish_twice_without_reset_fails() -> anyhow::Result<()> {
        let mut enc = Encoder::new(1, Flags::empty());
        enc.write_u8(1)?;
        enc.finish()?;
        assert!(enc.finish().is_err());
        Ok(())
    }

    #[test]
    fn reset_allows_reuse() -> anyhow::Result<()> {
        let mut enc = Encoder::new(1, Flags::empty());
        enc.write_u8(1)?;
        enc.finish()?;
        enc.reset(2, Flags::NO_CRC);
        enc.write_u8(2)?;
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        assert_eq!(dec.msg_type(), 2);
        assert_eq!(dec.read_u8()?, 2);
        Ok(())
    }
}
