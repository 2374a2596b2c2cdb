use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{Result, TransportError};

/// Length of a Bluetooth / Ethernet hardware address.
pub const BD_ADDR_LEN: usize = 6;

/// A 6-byte hardware address in network (display) byte order.
///
/// Ordering is unsigned lexicographic over the bytes, which is the order
/// multicast filter ranges are evaluated in.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BdAddr([u8; BD_ADDR_LEN]);

impl BdAddr {
    /// The all-zero address.
    pub const ZERO: BdAddr = BdAddr([0; BD_ADDR_LEN]);

    /// The Ethernet broadcast address.
    pub const BROADCAST: BdAddr = BdAddr([0xFF; BD_ADDR_LEN]);

    pub const fn new(bytes: [u8; BD_ADDR_LEN]) -> Self {
        Self(bytes)
    }

    /// Copy an address out of the first six bytes of `src`.
    pub fn from_slice(src: &[u8]) -> Result<Self> {
        let bytes: [u8; BD_ADDR_LEN] = src
            .get(..BD_ADDR_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(TransportError::Truncated {
                what: "address",
                needed: BD_ADDR_LEN,
                available: src.len(),
            })?;
        Ok(Self(bytes))
    }

    /// Read an address stored little-endian (byte-reversed), as HCI and
    /// L2CAP event records carry it.
    pub fn from_reversed_slice(src: &[u8]) -> Result<Self> {
        Self::from_slice(src).map(|addr| addr.reversed())
    }

    pub const fn as_bytes(&self) -> &[u8; BD_ADDR_LEN] {
        &self.0
    }

    pub const fn to_bytes(self) -> [u8; BD_ADDR_LEN] {
        self.0
    }

    /// The same address with its byte order reversed.
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Self(bytes)
    }

    /// True when the group bit (bit 0 of the first byte) is set.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }
}

impl From<[u8; BD_ADDR_LEN]> for BdAddr {
    fn from(bytes: [u8; BD_ADDR_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for BdAddr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BdAddr({self})")
    }
}

impl FromStr for BdAddr {
    type Err = TransportError;

    /// Parses `AA:BB:CC:DD:EE:FF` (`-` is accepted as separator too).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TransportError::InvalidAddress(s.to_string());

        let mut bytes = [0u8; BD_ADDR_LEN];
        let mut parts = s.split([':', '-']);
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

impl Serialize for BdAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
