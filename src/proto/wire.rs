//! Protobuf-style field keys and length-delimited value helpers shared
//! by every message's encode/decode table.

use crate::error::Error;
use crate::proto::varint::{decode_varint, encode_varint};

/// Wire type for a varint-encoded field (bool, int, enum).
pub const WIRE_VARINT: u64 = 0;
/// Wire type for a length-delimited field (string, bytes, message).
pub const WIRE_LEN: u64 = 2;

/// Encode a field key `(field_number << 3) | wire_type`.
pub fn encode_key(field_number: u32, wire_type: u64, out: &mut Vec<u8>) {
    encode_varint((u64::from(field_number) << 3) | wire_type, out);
}

/// Encode a varint-typed field, emitting nothing if `value == 0`
/// (default-value omission, per the wire contract).
pub fn encode_varint_field(field_number: u32, value: u64, out: &mut Vec<u8>) {
    if value != 0 {
        encode_key(field_number, WIRE_VARINT, out);
        encode_varint(value, out);
    }
}

/// Encode a bool-typed field as a one-byte varint, omitted if `false`.
pub fn encode_bool_field(field_number: u32, value: bool, out: &mut Vec<u8>) {
    if value {
        encode_key(field_number, WIRE_VARINT, out);
        encode_varint(1, out);
    }
}

/// Encode a length-delimited field, omitted if `value` is empty.
pub fn encode_bytes_field(field_number: u32, value: &[u8], out: &mut Vec<u8>) {
    if !value.is_empty() {
        encode_key(field_number, WIRE_LEN, out);
        encode_varint(value.len() as u64, out);
        out.extend_from_slice(value);
    }
}

/// Encode a string field, omitted if `value` is empty.
pub fn encode_string_field(field_number: u32, value: &str, out: &mut Vec<u8>) {
    encode_bytes_field(field_number, value.as_bytes(), out);
}

/// A decoded field key.
pub struct FieldKey {
    pub field_number: u32,
    pub wire_type: u64,
}

/// One step of a field-by-field payload walk: the current key plus a
/// cursor pointing past it, ready for the caller to read the value.
pub struct FieldCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FieldCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Read the next field key, or `None` at end of payload.
    pub fn next_key(&mut self) -> Result<Option<FieldKey>, Error> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        let (key, consumed) = decode_varint(&self.data[self.offset..])?
            .ok_or_else(|| Error::MalformedFrame("truncated field key".into()))?;
        self.offset += consumed;
        Ok(Some(FieldKey {
            field_number: (key >> 3) as u32,
            wire_type: key & 0x7,
        }))
    }

    /// Read a varint-typed value at the cursor.
    pub fn read_varint(&mut self) -> Result<u64, Error> {
        let (value, consumed) = decode_varint(&self.data[self.offset..])?
            .ok_or_else(|| Error::MalformedFrame("truncated varint field".into()))?;
        self.offset += consumed;
        Ok(value)
    }

    /// Read a bool-typed (varint) value at the cursor.
    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_varint()? != 0)
    }

    /// Read a length-delimited byte slice at the cursor.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], Error> {
        let (len, consumed) = decode_varint(&self.data[self.offset..])?
            .ok_or_else(|| Error::MalformedFrame("truncated length prefix".into()))?;
        self.offset += consumed;
        let len = len as usize;
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::MalformedFrame("length-delimited value extends past payload".into()))?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    /// Read a length-delimited UTF-8 string at the cursor.
    pub fn read_string(&mut self) -> Result<String, Error> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::MalformedFrame(format!("invalid utf-8: {e}")))
    }

    /// Skip a value of the given wire type, for unknown fields.
    pub fn skip(&mut self, wire_type: u64) -> Result<(), Error> {
        match wire_type {
            WIRE_VARINT => {
                self.read_varint()?;
            }
            WIRE_LEN => {
                self.read_bytes()?;
            }
            other => {
                return Err(Error::MalformedFrame(format!(
                    "unknown wire type {other}"
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_omission() {
        let mut out = Vec::new();
        encode_varint_field(1, 0, &mut out);
        encode_bool_field(2, false, &mut out);
        encode_string_field(3, "", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn roundtrip_mixed_fields() {
        let mut out = Vec::new();
        encode_string_field(1, "hello", &mut out);
        encode_varint_field(2, 42, &mut out);
        encode_bool_field(3, true, &mut out);

        let mut cursor = FieldCursor::new(&out);

        let key = cursor.next_key().unwrap().unwrap();
        assert_eq!(key.field_number, 1);
        assert_eq!(cursor.read_string().unwrap(), "hello");

        let key = cursor.next_key().unwrap().unwrap();
        assert_eq!(key.field_number, 2);
        assert_eq!(cursor.read_varint().unwrap(), 42);

        let key = cursor.next_key().unwrap().unwrap();
        assert_eq!(key.field_number, 3);
        assert!(cursor.read_bool().unwrap());

        assert!(cursor.next_key().unwrap().is_none());
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut out = Vec::new();
        encode_varint_field(99, 7, &mut out);
        encode_string_field(1, "kept", &mut out);

        let mut cursor = FieldCursor::new(&out);
        let key = cursor.next_key().unwrap().unwrap();
        cursor.skip(key.wire_type).unwrap();
        let key = cursor.next_key().unwrap().unwrap();
        assert_eq!(key.field_number, 1);
        assert_eq!(cursor.read_string().unwrap(), "kept");
    }

    #[test]
    fn truncated_length_delimited_is_malformed() {
        let mut out = Vec::new();
        encode_key(1, WIRE_LEN, &mut out);
        encode_varint(10, &mut out); // claims 10 bytes but none follow
        let mut cursor = FieldCursor::new(&out);
        cursor.next_key().unwrap();
        assert!(cursor.read_bytes().is_err());
    }
}
