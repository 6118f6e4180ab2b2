//! Protobuf wire-format primitives: tags, length-delimited values, and the
//! skip logic that keeps the cursor aligned across fields this client does
//! not interpret.

use std::fmt::Write as _;

use bytes::BufMut;

use crate::error::DecodeError;
use crate::varint::{decode_varint, encode_varint};

/// Wire type 0: unsigned varint.
pub const WIRE_VARINT: u32 = 0;
/// Wire type 1: fixed 8 bytes.
pub const WIRE_FIXED64: u32 = 1;
/// Wire type 2: varint length followed by that many bytes.
pub const WIRE_LENGTH_DELIMITED: u32 = 2;
/// Wire type 5: fixed 4 bytes.
pub const WIRE_FIXED32: u32 = 5;

/// A decoded field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldKey {
    pub field_number: u32,
    pub wire_type: u32,
}

/// Decode the next field key from the front of `buf`.
pub fn decode_tag(buf: &mut &[u8]) -> Result<FieldKey, DecodeError> {
    let key = decode_varint(buf)?;
    Ok(FieldKey {
        field_number: (key >> 3) as u32,
        wire_type: (key & 7) as u32,
    })
}

/// Decode a length-delimited value, borrowing it out of `buf`.
///
/// Fails if the declared length exceeds the bytes that remain.
pub fn decode_bytes<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let length = decode_varint(buf)? as usize;
    if buf.len() < length {
        return Err(DecodeError::Truncated);
    }
    let (value, rest) = buf.split_at(length);
    *buf = rest;
    Ok(value)
}

/// Decode a length-delimited value as text.
///
/// No charset validation is applied on the wire; invalid sequences are
/// carried over with replacement characters rather than failing the field.
pub fn decode_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    let raw = decode_bytes(buf)?;
    Ok(String::from_utf8_lossy(raw).into_owned())
}

/// Consume one value of the given wire type without interpreting it.
pub fn skip_value(buf: &mut &[u8], wire_type: u32) -> Result<(), DecodeError> {
    match wire_type {
        WIRE_VARINT => {
            decode_varint(buf)?;
        }
        WIRE_FIXED64 => advance(buf, 8)?,
        WIRE_LENGTH_DELIMITED => {
            decode_bytes(buf)?;
        }
        WIRE_FIXED32 => advance(buf, 4)?,
        other => return Err(DecodeError::UnsupportedWireType(other)),
    }
    Ok(())
}

fn advance(buf: &mut &[u8], count: usize) -> Result<(), DecodeError> {
    if buf.len() < count {
        return Err(DecodeError::Truncated);
    }
    *buf = &buf[count..];
    Ok(())
}

/// Append a field key for `field_number` with the given wire type.
pub fn encode_tag(buf: &mut impl BufMut, field_number: u32, wire_type: u32) {
    encode_varint(buf, u64::from((field_number << 3) | wire_type));
}

/// Append an unsigned varint field.
pub fn encode_uint(buf: &mut impl BufMut, field_number: u32, value: u64) {
    encode_tag(buf, field_number, WIRE_VARINT);
    encode_varint(buf, value);
}

/// Append a length-delimited byte field.
pub fn encode_bytes(buf: &mut impl BufMut, field_number: u32, value: &[u8]) {
    encode_tag(buf, field_number, WIRE_LENGTH_DELIMITED);
    encode_varint(buf, value.len() as u64);
    buf.put_slice(value);
}

/// Append a string field.
pub fn encode_string(buf: &mut impl BufMut, field_number: u32, value: &str) {
    encode_bytes(buf, field_number, value.as_bytes());
}

/// Render a raw payload as `(field:hexbytes)` groups for trace logging.
///
/// Rendering stops at the first undecodable field rather than failing.
pub fn render_fields(payload: &[u8]) -> String {
    let mut out = String::new();
    let mut buf = payload;
    while !buf.is_empty() {
        let Ok(key) = decode_tag(&mut buf) else {
            break;
        };
        let value_start = buf;
        if skip_value(&mut buf, key.wire_type).is_err() {
            break;
        }
        let consumed = value_start.len() - buf.len();
        let _ = write!(out, "({}:", key.field_number);
        for byte in &value_start[..consumed] {
            let _ = write!(out, "{byte:02X}");
        }
        out.push(')');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_splits_field_number_and_wire_type() {
        let mut buf = Vec::new();
        encode_tag(&mut buf, 7, WIRE_VARINT);
        let mut cursor = buf.as_slice();
        let key = decode_tag(&mut cursor).unwrap();
        assert_eq!(key.field_number, 7);
        assert_eq!(key.wire_type, WIRE_VARINT);

        // 0x2a = field 5, wire type 2.
        let mut cursor: &[u8] = &[0x2a];
        let key = decode_tag(&mut cursor).unwrap();
        assert_eq!(key.field_number, 5);
        assert_eq!(key.wire_type, WIRE_LENGTH_DELIMITED);
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = Vec::new();
        encode_string(&mut buf, 3, "Lobby");
        let mut cursor = buf.as_slice();
        let key = decode_tag(&mut cursor).unwrap();
        assert_eq!(key.field_number, 3);
        assert_eq!(decode_string(&mut cursor).unwrap(), "Lobby");
        assert!(cursor.is_empty());
    }

    #[test]
    fn length_delimited_overrun_is_truncated() {
        // Declares 5 bytes but only 2 remain.
        let mut cursor: &[u8] = &[0x05, 0x61, 0x62];
        assert_eq!(decode_bytes(&mut cursor), Err(DecodeError::Truncated));
    }

    #[test]
    fn skip_covers_every_supported_wire_type() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 1, 300);
        encode_tag(&mut buf, 2, WIRE_FIXED64);
        buf.extend_from_slice(&[0u8; 8]);
        encode_bytes(&mut buf, 3, b"abc");
        encode_tag(&mut buf, 4, WIRE_FIXED32);
        buf.extend_from_slice(&[0u8; 4]);
        encode_uint(&mut buf, 5, 9);

        let mut cursor = buf.as_slice();
        for _ in 0..4 {
            let key = decode_tag(&mut cursor).unwrap();
            skip_value(&mut cursor, key.wire_type).unwrap();
        }
        let key = decode_tag(&mut cursor).unwrap();
        assert_eq!(key.field_number, 5);
        assert_eq!(crate::varint::decode_varint(&mut cursor).unwrap(), 9);
        assert!(cursor.is_empty());
    }

    #[test]
    fn unsupported_wire_type_is_rejected() {
        let mut cursor: &[u8] = &[0xff];
        assert_eq!(
            skip_value(&mut cursor, 3),
            Err(DecodeError::UnsupportedWireType(3))
        );
        assert_eq!(
            skip_value(&mut cursor, 4),
            Err(DecodeError::UnsupportedWireType(4))
        );
    }

    #[test]
    fn render_fields_formats_field_and_hex() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 1, 1);
        encode_string(&mut buf, 3, "ab");
        assert_eq!(render_fields(&buf), "(1:01)(3:026162)");
    }
}
