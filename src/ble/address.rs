//! A Bluetooth hardware address, and the distinction between public
//! and random address types used throughout the GATT dispatch layer.
//!
//! Grounded on `api/bdaddr.rs`'s `BDAddr`: same 6-byte layout, same
//! `u64`/string conversions, trimmed to what the wire protocol needs
//! (no serde feature, since nothing here is persisted).

use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter, LowerHex, UpperHex};
use std::str::FromStr;

use thiserror::Error;

/// A 6-byte Bluetooth device address, MSB first.
#[derive(Copy, Clone, Default, Eq, Hash, Ord, PartialOrd, PartialEq)]
pub struct BtAddr {
    octets: [u8; 6],
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseBtAddrError {
    #[error("a Bluetooth address must be 6 bytes")]
    IncorrectByteCount,
    #[error("invalid hex digit in address: {0}")]
    InvalidDigit(String),
}

impl LowerHex for BtAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let o = &self.octets;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl UpperHex for BtAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let o = &self.octets;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Display for BtAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as UpperHex>::fmt(self, f)
    }
}

impl fmt::Debug for BtAddr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

impl From<[u8; 6]> for BtAddr {
    fn from(octets: [u8; 6]) -> Self {
        Self { octets }
    }
}

impl TryFrom<u64> for BtAddr {
    type Error = ParseBtAddrError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let bytes = value.to_be_bytes();
        if bytes[0..2] != [0, 0] {
            return Err(ParseBtAddrError::IncorrectByteCount);
        }
        Ok(Self {
            octets: bytes[2..].try_into().unwrap(),
        })
    }
}

impl From<BtAddr> for u64 {
    fn from(addr: BtAddr) -> Self {
        let mut bytes = [0u8; 8];
        bytes[2..].copy_from_slice(&addr.octets);
        u64::from_be_bytes(bytes)
    }
}

impl FromStr for BtAddr {
    type Err = ParseBtAddrError;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `aabbccddeeff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            let bytes = s
                .split(':')
                .map(|part| u8::from_str_radix(part, 16).map_err(|e| ParseBtAddrError::InvalidDigit(e.to_string())))
                .collect::<Result<Vec<u8>, _>>()?;
            let octets: [u8; 6] = bytes
                .try_into()
                .map_err(|_| ParseBtAddrError::IncorrectByteCount)?;
            Ok(Self { octets })
        } else {
            if s.len() != 12 {
                return Err(ParseBtAddrError::IncorrectByteCount);
            }
            let mut octets = [0u8; 6];
            for (i, octet) in octets.iter_mut().enumerate() {
                *octet = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                    .map_err(|e| ParseBtAddrError::InvalidDigit(e.to_string()))?;
            }
            Ok(Self { octets })
        }
    }
}

impl BtAddr {
    pub fn into_inner(self) -> [u8; 6] {
        self.octets
    }
}

/// Whether an advertised address is the device's fixed public address
/// or a (possibly rotating) random one.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AddressKind {
    Public,
    Random,
}

impl AddressKind {
    pub fn wire_value(self) -> u32 {
        match self {
            AddressKind::Public => 0,
            AddressKind::Random => 1,
        }
    }

    pub fn from_wire_value(value: u32) -> Self {
        match value {
            0 => AddressKind::Public,
            _ => AddressKind::Random,
        }
    }
}
