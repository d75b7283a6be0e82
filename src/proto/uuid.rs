//! Expansion of 16-bit and 32-bit BLE short UUIDs into full 128-bit
//! UUIDs, and the wire encoding of a UUID as 16 raw bytes.
//!
//! Grounded on the `BleUuid` extension trait of the BLE library this
//! daemon is built on top of; reused here unchanged since the
//! Bluetooth SIG base UUID is a protocol constant, not an
//! implementation detail.

use uuid::Uuid;

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit short UUID into its full 128-bit form.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Expand a 32-bit short UUID into its full 128-bit form.
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Encode a UUID as its 16 raw bytes, big-endian, as required on the
/// wire (field values here are always exactly 16 bytes; the codec
/// treats them as opaque length-delimited bytes).
pub fn uuid_to_wire_bytes(uuid: &Uuid) -> [u8; 16] {
    *uuid.as_bytes()
}

/// Decode a UUID from its 16 raw wire bytes.
pub fn uuid_from_wire_bytes(bytes: &[u8]) -> Option<Uuid> {
    let array: [u8; 16] = bytes.try_into().ok()?;
    Some(Uuid::from_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_from_u16_matches_base() {
        assert_eq!(
            uuid_from_u16(0x1122),
            Uuid::parse_str("00001122-0000-1000-8000-00805f9b34fb").unwrap()
        );
    }

    #[test]
    fn uuid_from_u32_matches_base() {
        assert_eq!(
            uuid_from_u32(0x1122_3344),
            Uuid::parse_str("11223344-0000-1000-8000-00805f9b34fb").unwrap()
        );
    }

    #[test]
    fn wire_bytes_roundtrip() {
        let uuid = uuid_from_u16(0x180d); // Heart Rate service
        let bytes = uuid_to_wire_bytes(&uuid);
        assert_eq!(bytes.len(), 16);
        assert_eq!(uuid_from_wire_bytes(&bytes).unwrap(), uuid);
    }
}
