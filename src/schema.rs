//! A declarative field-table bridge for encoding/decoding a fixed-layout
//! record directly, instead of hand-writing a hundred repetitive typed
//! reads and writes per message.
//!
//! Grounded on the `CommandTag`-dispatched read/write pair in the teacher
//! crate's `protocol/command.rs` (match on a tag id, dispatch to a typed
//! reader/writer per field) generalized from a hand-written `match` arm
//! per command into a runtime field table.

use bitflags::bitflags;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{CodecError, Mismatched};
use crate::tag::Tag;

bitflags! {
    /// Per-field bits a schema can declare, mirroring `DescriptorFlags` in
    /// the teacher crate.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlags: u8 {
        /// Field must be present on decode; absence is the caller's concern,
        /// not something this bridge enforces on its own.
        const REQUIRED = 0x01;
        /// Field may be legitimately absent from the wire.
        const OPTIONAL = 0x02;
        /// Field semantically repeats (caller-defined meaning; the bridge
        /// itself only ever reads/writes one scalar per field entry).
        const REPEATED = 0x04;
        /// Field is part of a caller-defined packed encoding.
        const PACKED = 0x08;
    }
}

/// One entry in a [`Schema`]'s field table.
#[derive(Debug, Clone)]
pub struct SchemaField {
    /// Field name, for diagnostics only.
    pub name: &'static str,
    /// Wire field id, matched against `read_field`'s output during decode.
    pub field_id: u16,
    /// The tag this field encodes/decodes as.
    pub type_tag: Tag,
    /// Caller-defined metadata bits.
    pub flags: FieldFlags,
    /// Byte offset of this field within the record.
    pub byte_offset: usize,
    /// Byte size of this field within the record; must equal
    /// `type_tag.fixed_size()`.
    pub byte_size: usize,
}

impl SchemaField {
    /// Builds a field entry, rejecting tags with no fixed in-memory
    /// representation (`STRING`, `BYTES`, and the container tags) with
    /// [`CodecError::InvalidType`]. The bridge operates on scalar,
    /// fixed-offset record fields, not variable-length or nested data.
    pub fn new(
        name: &'static str,
        field_id: u16,
        type_tag: Tag,
        flags: FieldFlags,
        byte_offset: usize,
        byte_size: usize,
    ) -> Result<SchemaField, CodecError> {
        let expected_size = type_tag
            .fixed_size()
            .ok_or(CodecError::InvalidType(type_tag as u8))?;

        if byte_size != expected_size {
            return Err(CodecError::InvalidArg(
                "schema field byte_size does not match its type tag's fixed size",
            ));
        }

        Ok(SchemaField {
            name,
            field_id,
            type_tag,
            flags,
            byte_offset,
            byte_size,
        })
    }
}

/// A declarative description of a fixed-layout record: a wire `type_id`
/// and a table of [`SchemaField`]s, each naming a byte range within the
/// record.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Schema name, for diagnostics only.
    pub name: &'static str,
    /// Wire struct type id this schema encodes/decodes.
    pub type_id: u16,
    /// The field table, in no particular order.
    pub fields: Vec<SchemaField>,
    /// Total byte size of the record this schema describes.
    pub struct_size: usize,
}

impl Schema {
    /// Builds a schema, failing [`CodecError::InvalidArg`] if any field's
    /// byte range extends past `struct_size`.
    pub fn new(
        name: &'static str,
        type_id: u16,
        fields: Vec<SchemaField>,
        struct_size: usize,
    ) -> Result<Schema, CodecError> {
        for field in &fields {
            if field.byte_offset.checked_add(field.byte_size).unwrap_or(usize::MAX) > struct_size {
                return Err(CodecError::InvalidArg(
                    "schema field byte range extends past struct_size",
                ));
            }
        }

        Ok(Schema {
            name,
            type_id,
            fields,
            struct_size,
        })
    }

    fn field_by_id(&self, field_id: u16) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    /// Encodes the record at `base` as a `STRUCT` with this schema's
    /// `type_id`, emitting each field in table order and closing with the
    /// sentinel.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads covering `struct_size` bytes, and
    /// every field's byte range must name a properly initialized value of
    /// its declared type. This is the caller's contract about the memory
    /// layout of their own record, the same contract a hand-written
    /// typed-write implementation makes implicitly.
    pub unsafe fn encode(&self, enc: &mut Encoder<'_>, base: *const u8) -> Result<(), CodecError> {
        enc.struct_begin(self.type_id)?;

        for field in &self.fields {
            enc.write_field_header(field.field_id, field.type_tag)?;
            let ptr = base.add(field.byte_offset);

            match field.type_tag {
                Tag::Null => {}
                Tag::Bool => enc.write_bool(ptr.read() != 0)?,
                Tag::U8 => enc.write_u8(ptr.read())?,
                Tag::I8 => enc.write_i8(ptr.cast::<i8>().read())?,
                Tag::U16 => enc.write_u16(ptr.cast::<u16>().read_unaligned())?,
                Tag::I16 => enc.write_i16(ptr.cast::<i16>().read_unaligned())?,
                Tag::U32 => enc.write_u32(ptr.cast::<u32>().read_unaligned())?,
                Tag::I32 => enc.write_i32(ptr.cast::<i32>().read_unaligned())?,
                Tag::U64 => enc.write_u64(ptr.cast::<u64>().read_unaligned())?,
                Tag::I64 => enc.write_i64(ptr.cast::<i64>().read_unaligned())?,
                Tag::F32 => enc.write_f32(ptr.cast::<f32>().read_unaligned())?,
                Tag::F64 => enc.write_f64(ptr.cast::<f64>().read_unaligned())?,
                Tag::Uuid => {
                    let mut bytes = [0u8; 16];
                    std::ptr::copy_nonoverlapping(ptr, bytes.as_mut_ptr(), 16);
                    enc.write_uuid(&bytes)?
                }
                Tag::Timestamp => enc.write_timestamp(ptr.cast::<u64>().read_unaligned())?,
                Tag::Duration => enc.write_duration(ptr.cast::<u64>().read_unaligned())?,
                // Unreachable: SchemaField::new rejects every other tag.
                other => return Err(CodecError::InvalidType(other as u8)),
            }
        }

        enc.struct_end()
    }

    /// Decodes a `STRUCT` into the zeroed record at `base`.
    ///
    /// Fails [`CodecError::TypeMismatch`] if the wire `type_id` does not
    /// match this schema's. Fields present on the wire but absent from the
    /// schema (or whose wire tag does not match the schema's declared tag
    /// for that field id) are skipped; this is the bridge's unknown-field
    /// tolerance, not an error.
    ///
    /// # Safety
    ///
    /// `base` must be valid for writes covering `struct_size` bytes.
    pub unsafe fn decode(&self, dec: &mut Decoder<'_>, base: *mut u8) -> Result<(), CodecError> {
        std::ptr::write_bytes(base, 0, self.struct_size);

        let type_id = dec.struct_begin()?;
        if type_id != self.type_id {
            return Err(CodecError::TypeMismatch {
                expected: Mismatched::StructId(self.type_id),
                actual: Mismatched::StructId(type_id),
            });
        }

        loop {
            let (field_id, tag) = match dec.read_field() {
                Ok(pair) => pair,
                Err(CodecError::NotFound) => break,
                Err(e) => return Err(e),
            };

            match self.field_by_id(field_id) {
                Some(field) if field.type_tag == tag => {
                    let ptr = base.add(field.byte_offset);
                    match tag {
                        Tag::Null => {}
                        Tag::Bool => ptr.write(dec.read_bool()? as u8),
                        Tag::U8 => ptr.write(dec.read_u8()?),
                        Tag::I8 => ptr.cast::<i8>().write_unaligned(dec.read_i8()?),
                        Tag::U16 => ptr.cast::<u16>().write_unaligned(dec.read_u16()?),
                        Tag::I16 => ptr.cast::<i16>().write_unaligned(dec.read_i16()?),
                        Tag::U32 => ptr.cast::<u32>().write_unaligned(dec.read_u32()?),
                        Tag::I32 => ptr.cast::<i32>().write_unaligned(dec.read_i32()?),
                        Tag::U64 => ptr.cast::<u64>().write_unaligned(dec.read_u64()?),
                        Tag::I64 => ptr.cast::<i64>().write_unaligned(dec.read_i64()?),
                        Tag::F32 => ptr.cast::<f32>().write_unaligned(dec.read_f32()?),
                        Tag::F64 => ptr.cast::<f64>().write_unaligned(dec.read_f64()?),
                        Tag::Uuid => {
                            let bytes = dec.read_uuid()?;
                            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, 16);
                        }
                        Tag::Timestamp => ptr.cast::<u64>().write_unaligned(dec.read_timestamp()?),
                        Tag::Duration => ptr.cast::<u64>().write_unaligned(dec.read_duration()?),
                        other => return Err(CodecError::InvalidType(other as u8)),
                    }
                }
                Some(field) => {
                    return Err(CodecError::TypeMismatch {
                        expected: Mismatched::Tag(field.type_tag),
                        actual: Mismatched::Tag(tag),
                    });
                }
                None => dec.skip_value(tag)?,
            }
        }

        dec.struct_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Flags;
    use pretty_assertions::assert_eq;

    #[test]
    fn schema_field_rejects_variable_length_tag() {
        assert!(matches!(
            SchemaField::new("s", 1, Tag::String, FieldFlags::REQUIRED, 0, 4),
            Err(CodecError::InvalidType(_))
        ));
    }

    #[test]
    fn schema_field_rejects_size_mismatch() {
        assert!(matches!(
            SchemaField::new("n", 1, Tag::U32, FieldFlags::REQUIRED, 0, 8),
            Err(CodecError::InvalidArg(_))
        ));
    }

    #[test]
    fn schema_rejects_field_past_struct_size() {
        let field = SchemaField::new("n", 1, Tag::U32, FieldFlags::REQUIRED, 4, 4).unwrap();
        assert!(matches!(
            Schema::new("S", 1, vec![field], 6),
            Err(CodecError::InvalidArg(_))
        ));
    }

    #[test_log::test]
    fn schema_round_trip() -> anyhow::Result<()> {
        let fields = vec![
            SchemaField::new("id", 1, Tag::U32, FieldFlags::REQUIRED, 0, 4)?,
            SchemaField::new("flag", 2, Tag::Bool, FieldFlags::REQUIRED, 4, 1)?,
            SchemaField::new("value", 3, Tag::F64, FieldFlags::REQUIRED, 8, 8)?,
        ];
        let schema = Schema::new("Sample", 42, fields, 16)?;

        let mut src = [0u8; 16];
        src[0..4].copy_from_slice(&77u32.to_ne_bytes());
        src[4] = 1;
        src[8..16].copy_from_slice(&3.5f64.to_ne_bytes());

        let mut enc = Encoder::new(1, Flags::empty());
        unsafe {
            schema.encode(&mut enc, src.as_ptr())?;
        }
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        let mut dst = [0u8; 16];
        unsafe {
            schema.decode(&mut dec, dst.as_mut_ptr())?;
        }

        assert_eq!(dst, src);
        Ok(())
    }

    #[test]
    fn decode_tolerates_unknown_fields() -> anyhow::Result<()> {
        let fields = vec![SchemaField::new("id", 1, Tag::U32, FieldFlags::REQUIRED, 0, 4)?];
        let schema = Schema::new("Sample", 7, fields, 4)?;

        let mut enc = Encoder::new(1, Flags::empty());
        enc.struct_begin(7)?;
        enc.write_field_header(99, Tag::String)?;
        enc.write_string("ignored")?;
        enc.write_field_header(1, Tag::U32)?;
        enc.write_u32(123)?;
        enc.struct_end()?;
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        let mut dst = [0u8; 4];
        unsafe {
            schema.decode(&mut dec, dst.as_mut_ptr())?;
        }
        assert_eq!(u32::from_ne_bytes(dst), 123);
        Ok(())
    }

    #[test]
    fn decode_rejects_type_id_mismatch() -> anyhow::Result<()> {
        let fields = vec![SchemaField::new("id", 1, Tag::U32, FieldFlags::REQUIRED, 0, 4)?];
        let schema = Schema::new("Sample", 7, fields, 4)?;

        let mut enc = Encoder::new(1, Flags::empty());
        enc.struct_begin(8)?;
        enc.write_field_header(1, Tag::U32)?;
        enc.write_u32(5)?;
        enc.struct_end()?;
        let bytes = enc.finish()?.to_vec();

        let mut dec = Decoder::new(&bytes);
        dec.validate()?;
        let mut dst = [0u8; 4];
        let result = unsafe { schema.decode(&mut dec, dst.as_mut_ptr()) };
        assert!(matches!(
            result,
            Err(CodecError::TypeMismatch {
                expected: Mismatched::StructId(7),
                actual: Mismatched::StructId(8),
            })
        ));
        Ok(())
    }
}
