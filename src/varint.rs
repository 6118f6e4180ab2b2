//! Base-128 unsigned varint codec.
//!
//! Every field in every control message starts with one of these, so the
//! decode path works over a borrowed cursor and never allocates.

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

/// Append `value` to `buf` as a minimal-length unsigned varint.
pub fn encode_varint(buf: &mut impl BufMut, mut value: u64) {
    loop {
        if value < 0x80 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8(((value & 0x7f) | 0x80) as u8);
        value >>= 7;
    }
}

/// Decode one unsigned varint from the front of `buf`, advancing past it.
pub fn decode_varint(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    let mut shift = 0u32;

    loop {
        if !buf.has_remaining() {
            return Err(DecodeError::Truncated);
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & 0x7f) << shift;
        if byte < 0x80 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(DecodeError::Malformed("varint too long"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: u64) -> u64 {
        let mut buf = Vec::new();
        encode_varint(&mut buf, value);
        let mut cursor = buf.as_slice();
        let decoded = decode_varint(&mut cursor).expect("decode should succeed");
        assert!(cursor.is_empty(), "decode should consume the whole encoding");
        decoded
    }

    #[test]
    fn roundtrips_boundary_values() {
        for value in [
            0,
            1,
            0x7f,
            0x80,
            300,
            0x3fff,
            0x4000,
            u64::from(u32::MAX),
            u64::MAX,
        ] {
            assert_eq!(roundtrip(value), value);
        }
    }

    #[test]
    fn encodings_are_minimal() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 0);
        assert_eq!(buf, [0x00]);

        buf.clear();
        encode_varint(&mut buf, 0x7f);
        assert_eq!(buf, [0x7f]);

        buf.clear();
        encode_varint(&mut buf, 0x80);
        assert_eq!(buf, [0x80, 0x01]);

        buf.clear();
        encode_varint(&mut buf, 300);
        assert_eq!(buf, [0xac, 0x02]);

        buf.clear();
        encode_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn truncated_input_is_an_error() {
        // Continuation bit set on the final byte.
        let mut cursor: &[u8] = &[0x80];
        assert_eq!(decode_varint(&mut cursor), Err(DecodeError::Truncated));

        let mut cursor: &[u8] = &[];
        assert_eq!(decode_varint(&mut cursor), Err(DecodeError::Truncated));
    }

    #[test]
    fn overlong_encoding_is_an_error() {
        let mut cursor: &[u8] = &[0x80; 11];
        assert_eq!(
            decode_varint(&mut cursor),
            Err(DecodeError::Malformed("varint too long"))
        );
    }

    #[test]
    fn decode_stops_at_terminating_byte() {
        let mut cursor: &[u8] = &[0xac, 0x02, 0xff, 0xff];
        assert_eq!(decode_varint(&mut cursor).unwrap(), 300);
        assert_eq!(cursor, [0xff, 0xff]);
    }
}
