//! The fixed 17-byte frame header and its flag bits.

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

use crate::error::CodecError;

/// Magic number identifying a DCF frame (ASCII "DCFS").
pub const MAGIC: u32 = 0x4443_4653;

/// Protocol version implemented by this crate: major 0x05, minor 0x20.
///
/// Compatibility is decided by the major byte only (see [`major_version`]).
pub const VERSION: u16 = 0x0520;

/// Maximum total framed message size.
pub const MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Maximum byte length of a `STRING` value.
pub const MAX_STRING: usize = 64 * 1024;

/// Maximum element count of an `ARRAY`.
pub const MAX_ARRAY: usize = 1_048_576;

/// Maximum container nesting depth.
pub const MAX_DEPTH: usize = 32;

/// Initial capacity an owning encoder allocates.
pub const INITIAL_CAPACITY: usize = 256;

/// The on-wire header size in bytes.
pub const HEADER_SIZE: usize = 17;

/// The on-wire CRC trailer size in bytes.
pub const CRC_SIZE: usize = 4;

bitflags! {
    /// Bits of the header's `flags` byte.
    ///
    /// Only [`Flags::NO_CRC`] has core semantics (it disables the trailer);
    /// the rest are preserved byte-for-byte and interpreted by the caller.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        /// Payload is compressed by some caller-defined algorithm.
        const COMPRESSED = 0x01;
        /// Payload is encrypted by some caller-defined algorithm.
        const ENCRYPTED = 0x02;
        /// Part of a caller-defined streaming sequence.
        const STREAMING = 0x04;
        /// Final message of a caller-defined streaming sequence.
        const FINAL = 0x08;
        /// Caller-defined priority hint.
        const PRIORITY = 0x10;
        /// Disables the trailing CRC32.
        const NO_CRC = 0x20;
        /// Caller-defined extension marker.
        const EXTENDED = 0x80;
    }
}

/// The parsed 17-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Must equal [`MAGIC`].
    pub magic: u32,
    /// Wire version; only the major (high) byte is checked for compatibility.
    pub version: u16,
    /// Application-defined message type.
    pub msg_type: u16,
    /// Header flag bits.
    pub flags: Flags,
    /// Exact byte length of the payload region.
    pub payload_len: u32,
    /// Application-defined sequence number.
    pub sequence: u32,
}

impl Header {
    /// The high byte of [`VERSION`], used for major-version compatibility checks.
    pub fn major_version() -> u8 {
        (VERSION >> 8) as u8
    }

    /// Whether `version`'s major byte is compatible with this crate's.
    pub fn is_compatible_version(version: u16) -> bool {
        (version >> 8) as u8 == Self::major_version()
    }

    /// Whether this header's flags request no CRC trailer.
    pub fn has_crc(&self) -> bool {
        !self.flags.contains(Flags::NO_CRC)
    }

    /// The full framed message length this header implies: header, payload,
    /// and the CRC trailer if present.
    pub fn message_length(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize + if self.has_crc() { CRC_SIZE } else { 0 }
    }
}

/// Writes a [`Header`] to the first [`HEADER_SIZE`] bytes of `buf`.
///
/// # Panics
///
/// Panics if `buf` is shorter than [`HEADER_SIZE`]. Callers must reserve
/// the header region before calling this, exactly as `Encoder` does.
pub fn write_header(buf: &mut [u8], header: &Header) {
    assert!(buf.len() >= HEADER_SIZE, "header buffer too small");

    NetworkEndian::write_u32(&mut buf[0..4], header.magic);
    NetworkEndian::write_u16(&mut buf[4..6], header.version);
    NetworkEndian::write_u16(&mut buf[6..8], header.msg_type);
    buf[8] = header.flags.bits();
    NetworkEndian::write_u32(&mut buf[9..13], header.payload_len);
    NetworkEndian::write_u32(&mut buf[13..17], header.sequence);
}

/// Parses a [`Header`] from the first [`HEADER_SIZE`] bytes of `buf`.
///
/// Performs no validation beyond what's needed to construct the struct
/// (magic/version/length checks are [`crate::decoder::Decoder::validate`]'s
/// job); `buf` must already be known to hold at least [`HEADER_SIZE`]
/// bytes.
pub fn read_header(buf: &[u8]) -> Header {
    debug_assert!(buf.len() >= HEADER_SIZE);

    Header {
        magic: NetworkEndian::read_u32(&buf[0..4]),
        version: NetworkEndian::read_u16(&buf[4..6]),
        msg_type: NetworkEndian::read_u16(&buf[6..8]),
        flags: Flags::from_bits_truncate(buf[8]),
        payload_len: NetworkEndian::read_u32(&buf[9..13]),
        sequence: NetworkEndian::read_u32(&buf[13..17]),
    }
}

/// Reads just enough of `header_bytes` to report the full framed message
/// length (header + payload + optional CRC), per the distilled spec's
/// `message_length` utility.
///
/// Fails [`CodecError::Truncated`] if fewer than [`HEADER_SIZE`] bytes are
/// available.
pub fn message_length(header_bytes: &[u8]) -> Result<usize, CodecError> {
    if header_bytes.len() < HEADER_SIZE {
        return Err(CodecError::Truncated {
            needed: HEADER_SIZE,
            available: header_bytes.len(),
        });
    }

    Ok(read_header(header_bytes).message_length())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = Header {
            magic: MAGIC,
            version: VERSION,
            msg_type: 7,
            flags: Flags::PRIORITY | Flags::STREAMING,
            payload_len: 42,
            sequence: 99,
        };

        let mut buf = [0u8; HEADER_SIZE];
        write_header(&mut buf, &header);
        assert_eq!(read_header(&buf), header);
    }

    #[test]
    fn version_compatibility_is_major_only() {
        assert!(Header::is_compatible_version(0x0599));
        assert!(Header::is_compatible_version(0x0520));
        assert!(!Header::is_compatible_version(0x0620));
    }

    #[test]
    fn message_length_accounts_for_crc_flag() {
        let with_crc = Header {
            magic: MAGIC,
            version: VERSION,
            msg_type: 0,
            flags: Flags::empty(),
            payload_len: 10,
            sequence: 0,
        };
        assert_eq!(with_crc.message_length(), HEADER_SIZE + 10 + CRC_SIZE);

        let without_crc = Header {
            flags: Flags::NO_CRC,
            ..with_crc
        };
        assert_eq!(without_crc.message_length(), HEADER_SIZE + 10);
    }

    #[test]
    fn message_length_util_reports_truncated() {
        let buf = [0u8; 10];
        assert!(matches!(
            message_length(&buf),
            Err(CodecError::Truncated { .. })
        ));
    }
}
